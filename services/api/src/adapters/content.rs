//! services/api/src/adapters/content.rs
//!
//! Loads the read-only learning content (sentences, stories, conversations and
//! the character table) from JSON files into a `MemoryContentStore`.
//!
//! Expected files under the content directory:
//! - `sentences.json`: object of id -> `{ chinese, difficulty, english?, pinyin? }` (required)
//! - `stories.json`: object of id -> `{ title, level?, parts: [{ id, chinese, ... }] }`
//! - `conversations.json`: list of `{ conversation_id, topic, hsk_level, sentences: [...] }`
//! - `characters.json`: list of `{ hanzi, hsk_level }`
//!
//! Levels may be written as numbers (`3`) or strings (`"HSK3"`).

use std::collections::BTreeMap;
use std::path::Path;

use dictation_core::domain::{ItemSet, Level, ReferenceItem, SessionKind};
use dictation_core::memory::MemoryContentStore;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;

//=========================================================================================
// "Impure" File Record Structs
//=========================================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRecord {
    Number(u8),
    Text(String),
}

impl LevelRecord {
    fn to_domain(&self) -> Result<Level, ApiError> {
        match self {
            LevelRecord::Number(n) => Ok(Level(*n)),
            LevelRecord::Text(raw) => Level::parse(raw)
                .ok_or_else(|| ApiError::Internal(format!("Invalid level '{}' in content", raw))),
        }
    }
}

#[derive(Deserialize)]
struct SentenceRecord {
    chinese: String,
    #[serde(alias = "difficulty", alias = "hsk_level")]
    level: Option<LevelRecord>,
    #[serde(alias = "english")]
    translation: Option<String>,
    pinyin: Option<String>,
}

impl SentenceRecord {
    fn to_domain(self, id: String, fallback: Level) -> Result<ReferenceItem, ApiError> {
        let level = match &self.level {
            Some(level) => level.to_domain()?,
            None => fallback,
        };
        Ok(ReferenceItem {
            id,
            text: self.chinese,
            level,
            translation: self.translation,
            pronunciation_hint: self.pinyin,
        })
    }
}

#[derive(Deserialize)]
struct PartRecord {
    id: String,
    #[serde(flatten)]
    sentence: SentenceRecord,
}

#[derive(Deserialize)]
struct StoryRecord {
    title: String,
    #[serde(alias = "hsk_level")]
    level: Option<LevelRecord>,
    parts: Vec<PartRecord>,
}

#[derive(Deserialize)]
struct ConversationRecord {
    #[serde(alias = "conversation_id")]
    id: String,
    #[serde(alias = "topic")]
    title: String,
    #[serde(alias = "hsk_level")]
    level: Option<LevelRecord>,
    #[serde(alias = "turns")]
    sentences: Vec<PartRecord>,
}

#[derive(Deserialize)]
struct CharacterRecord {
    hanzi: String,
    #[serde(alias = "hsk_level")]
    level: LevelRecord,
}

fn to_item_set(
    kind: SessionKind,
    id: String,
    title: String,
    level: Option<LevelRecord>,
    parts: Vec<PartRecord>,
) -> Result<ItemSet, ApiError> {
    let level = match &level {
        Some(level) => level.to_domain()?,
        None => Level(1),
    };
    let items = parts
        .into_iter()
        .map(|part| part.sentence.to_domain(part.id, level))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ItemSet {
        id,
        kind,
        title,
        level,
        items,
    })
}

//=========================================================================================
// Loader
//=========================================================================================

/// Reads every content file under `dir`. Only `sentences.json` is mandatory.
pub fn load_content(dir: &Path) -> Result<MemoryContentStore, ApiError> {
    let sentences: BTreeMap<String, SentenceRecord> = read_json(&dir.join("sentences.json"))?;
    let sentence_count = sentences.len();
    let items = sentences
        .into_iter()
        .map(|(id, record)| record.to_domain(id, Level(1)))
        .collect::<Result<Vec<_>, _>>()?;
    let mut store = MemoryContentStore::new().with_items(items);

    let stories: BTreeMap<String, StoryRecord> =
        read_optional_json(&dir.join("stories.json"))?.unwrap_or_default();
    let story_count = stories.len();
    for (id, story) in stories {
        let set = to_item_set(SessionKind::Story, id, story.title, story.level, story.parts)?;
        store = store.with_set(set);
    }

    let conversations: Vec<ConversationRecord> =
        read_optional_json(&dir.join("conversations.json"))?.unwrap_or_default();
    let conversation_count = conversations.len();
    for conversation in conversations {
        let set = to_item_set(
            SessionKind::Conversation,
            conversation.id,
            conversation.title,
            conversation.level,
            conversation.sentences,
        )?;
        store = store.with_set(set);
    }

    let characters: Vec<CharacterRecord> =
        read_optional_json(&dir.join("characters.json"))?.unwrap_or_default();
    let character_count = characters.len();
    let mut table = Vec::with_capacity(characters.len());
    for record in characters {
        let level = record.level.to_domain()?;
        // Multi-character entries are words; only single characters are tracked.
        let mut chars = record.hanzi.chars();
        if let (Some(character), None) = (chars.next(), chars.next()) {
            table.push((character, level));
        }
    }
    store = store.with_characters(table);

    info!(
        sentences = sentence_count,
        stories = story_count,
        conversations = conversation_count,
        characters = character_count,
        "Content loaded from {}",
        dir.display()
    );
    Ok(store)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ApiError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn read_optional_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, ApiError> {
    if !path.exists() {
        warn!("{} not found; continuing without it", path.display());
        return Ok(None);
    }
    read_json(path).map(Some)
}
