//! crates/dictation_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies an authenticated learner.
pub type UserId = Uuid;

/// Accuracy at or above this value counts an item as correct.
pub const PASS_THRESHOLD: u8 = 70;

//=========================================================================================
// Content
//=========================================================================================

/// Ordinal difficulty tier (HSK level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(pub u8);

impl Level {
    /// Accepts either a bare number (`"3"`) or the prefixed form (`"HSK3"`).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("HSK")
            .or_else(|| trimmed.strip_prefix("hsk"))
            .unwrap_or(trimmed);
        digits.trim().parse::<u8>().ok().map(Level)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HSK{}", self.0)
    }
}

/// A single sentence, story part or conversation turn the learner transcribes.
/// Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceItem {
    pub id: String,
    pub text: String,
    pub level: Level,
    pub translation: Option<String>,
    pub pronunciation_hint: Option<String>,
}

/// An ordered collection of items practised together (a story or a conversation).
#[derive(Debug, Clone)]
pub struct ItemSet {
    pub id: String,
    pub kind: SessionKind,
    pub title: String,
    pub level: Level,
    pub items: Vec<ReferenceItem>,
}

//=========================================================================================
// Sessions
//=========================================================================================

/// The learning modes. Each learner has at most one live session per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Practice,
    Story,
    Conversation,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Practice => "practice",
            SessionKind::Story => "story",
            SessionKind::Conversation => "conversation",
        }
    }

    /// Whether sessions of this kind can be saved and resumed later.
    pub fn is_resumable(&self) -> bool {
        !matches!(self, SessionKind::Practice)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "practice" | "hsk" => Ok(SessionKind::Practice),
            "story" => Ok(SessionKind::Story),
            "conversation" => Ok(SessionKind::Conversation),
            other => Err(format!("unknown session kind '{}'", other)),
        }
    }
}

/// Who is practising. Only authenticated learners get durable side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Learner {
    Anonymous,
    Authenticated(UserId),
}

impl Learner {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Learner::Anonymous => None,
            Learner::Authenticated(id) => Some(*id),
        }
    }
}

/// Durable resume point of a story or conversation session.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub user_id: UserId,
    pub item_set_id: String,
    pub kind: SessionKind,
    pub current_index: usize,
    pub score: usize,
    pub last_updated: DateTime<Utc>,
}

//=========================================================================================
// Character mastery
//=========================================================================================

/// Bounded learning grade of one character, in `-1..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Grade(i8);

impl Grade {
    pub const FAILED: Grade = Grade(-1);
    pub const KNOWN: Grade = Grade(3);

    /// Clamps an arbitrary stored value into the valid range.
    pub fn new(value: i32) -> Self {
        Grade(value.clamp(Self::FAILED.0 as i32, Self::KNOWN.0 as i32) as i8)
    }

    pub fn value(&self) -> i8 {
        self.0
    }

    /// Moves one step up on a correct observation and one step down otherwise,
    /// saturating at both ends.
    pub fn step(self, correct: bool) -> Self {
        if correct {
            Grade((self.0 + 1).min(Self::KNOWN.0))
        } else {
            Grade((self.0 - 1).max(Self::FAILED.0))
        }
    }

    pub fn status(&self) -> MasteryStatus {
        match self.0 {
            i8::MIN..=-1 => MasteryStatus::Failed,
            3..=i8::MAX => MasteryStatus::Known,
            _ => MasteryStatus::Learning,
        }
    }
}

impl Default for Grade {
    /// Unseen characters start out failed.
    fn default() -> Self {
        Self::FAILED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasteryStatus {
    Failed,
    Learning,
    Known,
}

/// Whether a character was transcribed correctly in one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterObservation {
    pub character: char,
    pub level: Level,
    pub correct: bool,
}

/// The stored grade of one character for one learner.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterProgress {
    pub character: char,
    pub level: Level,
    pub grade: Grade,
}

/// Raw per-level grade counts as reported by a progress store.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelCounts {
    pub level: Level,
    pub known: usize,
    pub learning: usize,
    pub failed: usize,
}

/// Per-level mastery overview including characters never observed.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSummary {
    pub level: Level,
    pub known: usize,
    pub learning: usize,
    pub failed: usize,
    pub unseen: usize,
    pub total: usize,
}

//=========================================================================================
// Daily work
//=========================================================================================

/// One accumulated row of daily work, keyed by (user, date, kind, set).
#[derive(Debug, Clone, PartialEq)]
pub struct DailyWorkRow {
    pub date: NaiveDate,
    pub kind: SessionKind,
    pub item_set_id: Option<String>,
    pub sentences_above_threshold: u32,
    pub total_sentences: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayStats {
    pub date: NaiveDate,
    pub weekday: String,
    pub sentences_above_threshold: u32,
    pub total_sentences: u32,
    pub completed: bool,
}

/// Streak and recent activity overview for one learner.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailyStats {
    pub today_above_threshold: u32,
    pub today_total_sentences: u32,
    pub today_sessions: usize,
    pub streak_days: u32,
    pub last_7_days: Vec<DayStats>,
}
