//! crates/dictation_core/src/memory.rs
//!
//! In-process implementations of every port. They back the test suites and
//! let the service run without a database. Each store can be switched into an
//! "unavailable" mode to exercise degraded persistence.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::domain::{
    CharacterProgress, Checkpoint, DailyStats, DailyWorkRow, ItemSet, Level, LevelCounts,
    MasteryStatus, ReferenceItem, SessionKind, UserId, Grade,
};
use crate::ports::{
    CheckpointStore, ContentStore, DailySummaryStore, PortError, PortResult, ProgressStore,
};
use crate::stats;

#[derive(Default)]
struct Outage(AtomicBool);

impl Outage {
    fn set(&self, down: bool) {
        self.0.store(down, Ordering::SeqCst);
    }

    fn check(&self, store: &str) -> PortResult<()> {
        if self.0.load(Ordering::SeqCst) {
            Err(PortError::Unavailable(format!("{} is unavailable", store)))
        } else {
            Ok(())
        }
    }
}

fn guard<T>(mutex: &Mutex<T>) -> PortResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| PortError::Unexpected("in-memory store lock poisoned".to_string()))
}

//=========================================================================================
// Content
//=========================================================================================

#[derive(Default)]
pub struct MemoryContentStore {
    items: HashMap<String, ReferenceItem>,
    sets: HashMap<(SessionKind, String), ItemSet>,
    characters: HashMap<char, Level>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = ReferenceItem>) -> Self {
        for item in items {
            self.items.insert(item.id.clone(), item);
        }
        self
    }

    pub fn with_set(mut self, set: ItemSet) -> Self {
        self.sets.insert((set.kind, set.id.clone()), set);
        self
    }

    pub fn with_characters(mut self, characters: impl IntoIterator<Item = (char, Level)>) -> Self {
        self.characters.extend(characters);
        self
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get_item(&self, id: &str) -> PortResult<ReferenceItem> {
        self.items
            .get(id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Sentence {} not found", id)))
    }

    async fn list_items_by_level(&self, level: Level) -> PortResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .items
            .values()
            .filter(|item| item.level == level)
            .map(|item| item.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_all_items(&self) -> PortResult<Vec<String>> {
        let mut ids: Vec<String> = self.items.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_item_set(&self, kind: SessionKind, set_id: &str) -> PortResult<ItemSet> {
        self.sets
            .get(&(kind, set_id.to_string()))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("{} {} not found", kind, set_id)))
    }

    async fn character_level(&self, character: char) -> PortResult<Option<Level>> {
        Ok(self.characters.get(&character).copied())
    }

    async fn character_totals_by_level(&self) -> PortResult<BTreeMap<Level, usize>> {
        let mut totals = BTreeMap::new();
        for level in self.characters.values() {
            *totals.entry(*level).or_insert(0) += 1;
        }
        Ok(totals)
    }
}

//=========================================================================================
// Checkpoints
//=========================================================================================

#[derive(Default)]
pub struct MemoryCheckpointStore {
    rows: Mutex<HashMap<(UserId, SessionKind, String), Checkpoint>>,
    outage: Outage,
}

impl MemoryCheckpointStore {
    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(
        &self,
        user_id: UserId,
        kind: SessionKind,
        set_id: &str,
    ) -> PortResult<Option<Checkpoint>> {
        self.outage.check("checkpoint store")?;
        Ok(guard(&self.rows)?
            .get(&(user_id, kind, set_id.to_string()))
            .cloned())
    }

    async fn save(
        &self,
        user_id: UserId,
        kind: SessionKind,
        set_id: &str,
        current_index: usize,
        score: usize,
    ) -> PortResult<Checkpoint> {
        self.outage.check("checkpoint store")?;
        let checkpoint = Checkpoint {
            user_id,
            item_set_id: set_id.to_string(),
            kind,
            current_index,
            score,
            last_updated: Utc::now(),
        };
        guard(&self.rows)?.insert((user_id, kind, set_id.to_string()), checkpoint.clone());
        Ok(checkpoint)
    }

    async fn delete(&self, user_id: UserId, kind: SessionKind, set_id: &str) -> PortResult<()> {
        self.outage.check("checkpoint store")?;
        guard(&self.rows)?.remove(&(user_id, kind, set_id.to_string()));
        Ok(())
    }
}

//=========================================================================================
// Character progress
//=========================================================================================

#[derive(Default)]
pub struct MemoryProgressStore {
    rows: Mutex<HashMap<(UserId, char), CharacterProgress>>,
    outage: Outage,
}

impl MemoryProgressStore {
    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }

    pub fn grade_of(&self, user_id: UserId, character: char) -> Option<Grade> {
        self.rows
            .lock()
            .ok()
            .and_then(|rows| rows.get(&(user_id, character)).map(|row| row.grade))
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn grades(
        &self,
        user_id: UserId,
        characters: &[char],
    ) -> PortResult<Vec<CharacterProgress>> {
        self.outage.check("progress store")?;
        let rows = guard(&self.rows)?;
        Ok(characters
            .iter()
            .filter_map(|c| rows.get(&(user_id, *c)).cloned())
            .collect())
    }

    async fn batch_upsert(&self, user_id: UserId, batch: &[CharacterProgress]) -> PortResult<()> {
        self.outage.check("progress store")?;
        let mut rows = guard(&self.rows)?;
        for row in batch {
            rows.insert((user_id, row.character), row.clone());
        }
        Ok(())
    }

    async fn summary_by_level(&self, user_id: UserId) -> PortResult<Vec<LevelCounts>> {
        self.outage.check("progress store")?;
        let rows = guard(&self.rows)?;
        let mut by_level: BTreeMap<Level, LevelCounts> = BTreeMap::new();
        for ((owner, _), row) in rows.iter() {
            if *owner != user_id {
                continue;
            }
            let counts = by_level.entry(row.level).or_insert_with(|| LevelCounts {
                level: row.level,
                known: 0,
                learning: 0,
                failed: 0,
            });
            match row.grade.status() {
                MasteryStatus::Known => counts.known += 1,
                MasteryStatus::Learning => counts.learning += 1,
                MasteryStatus::Failed => counts.failed += 1,
            }
        }
        Ok(by_level.into_values().collect())
    }
}

//=========================================================================================
// Daily work
//=========================================================================================

#[derive(Default)]
pub struct MemoryDailySummaryStore {
    rows: Mutex<Vec<(UserId, DailyWorkRow)>>,
    today: Option<NaiveDate>,
    outage: Outage,
}

impl MemoryDailySummaryStore {
    /// Pins "today" instead of reading the clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }

    /// Inserts a historical row directly.
    pub fn seed(&self, user_id: UserId, row: DailyWorkRow) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push((user_id, row));
        }
    }

    pub fn rows_for(&self, user_id: UserId) -> Vec<DailyWorkRow> {
        self.rows
            .lock()
            .map(|rows| {
                rows.iter()
                    .filter(|(owner, _)| *owner == user_id)
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[async_trait]
impl DailySummaryStore for MemoryDailySummaryStore {
    async fn record(
        &self,
        user_id: UserId,
        kind: SessionKind,
        average_accuracy: f64,
        item_count: usize,
        set_id: Option<&str>,
    ) -> PortResult<()> {
        self.outage.check("daily summary store")?;
        let today = self.today();
        let above = stats::above_threshold_increment(average_accuracy);
        let mut rows = guard(&self.rows)?;
        let existing = rows.iter_mut().find(|(owner, row)| {
            *owner == user_id
                && row.date == today
                && row.kind == kind
                && row.item_set_id.as_deref() == set_id
        });
        match existing {
            Some((_, row)) => {
                row.sentences_above_threshold += above;
                row.total_sentences += item_count as u32;
            }
            None => rows.push((
                user_id,
                DailyWorkRow {
                    date: today,
                    kind,
                    item_set_id: set_id.map(str::to_string),
                    sentences_above_threshold: above,
                    total_sentences: item_count as u32,
                },
            )),
        }
        Ok(())
    }

    async fn streak_and_stats(&self, user_id: UserId) -> PortResult<DailyStats> {
        self.outage.check("daily summary store")?;
        let rows: Vec<DailyWorkRow> = guard(&self.rows)?
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, row)| row.clone())
            .collect();
        Ok(stats::summarize(&rows, self.today()))
    }
}
