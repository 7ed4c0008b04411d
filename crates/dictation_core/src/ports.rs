//! crates/dictation_core/src/ports.rs
//!
//! Defines the collaborator contracts (traits) the core calls into.
//! These traits form the boundary of the hexagonal architecture: content
//! loading and every durable store live behind them so the correction and
//! session logic stays independent of files, databases or network services.

use async_trait::async_trait;
use std::collections::BTreeMap;
use crate::domain::{
    Checkpoint, CharacterProgress, DailyStats, ItemSet, Level, LevelCounts, ReferenceItem,
    SessionKind, UserId,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, files).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Read-only access to the static content collections.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Looks up a practice sentence by id.
    async fn get_item(&self, id: &str) -> PortResult<ReferenceItem>;

    /// Ids of every practice sentence at the given level.
    async fn list_items_by_level(&self, level: Level) -> PortResult<Vec<String>>;

    /// Ids of every practice sentence regardless of level.
    async fn list_all_items(&self) -> PortResult<Vec<String>>;

    /// Loads a story or conversation with its items in order.
    async fn get_item_set(&self, kind: SessionKind, set_id: &str) -> PortResult<ItemSet>;

    /// The level of a tracked character, if it is in the character table.
    async fn character_level(&self, character: char) -> PortResult<Option<Level>>;

    /// How many tracked characters exist per level.
    async fn character_totals_by_level(&self) -> PortResult<BTreeMap<Level, usize>>;
}

/// Durable story/conversation resume points. At most one per (user, set, kind).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(
        &self,
        user_id: UserId,
        kind: SessionKind,
        set_id: &str,
    ) -> PortResult<Option<Checkpoint>>;

    /// Inserts or replaces the checkpoint for (user, set, kind).
    async fn save(
        &self,
        user_id: UserId,
        kind: SessionKind,
        set_id: &str,
        current_index: usize,
        score: usize,
    ) -> PortResult<Checkpoint>;

    /// Removes the checkpoint. Deleting a missing checkpoint is not an error.
    async fn delete(&self, user_id: UserId, kind: SessionKind, set_id: &str) -> PortResult<()>;
}

/// Durable per-character grades.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Current grades of the requested characters. Unseen characters are absent.
    async fn grades(
        &self,
        user_id: UserId,
        characters: &[char],
    ) -> PortResult<Vec<CharacterProgress>>;

    /// Writes every row in a single atomic multi-row upsert.
    async fn batch_upsert(&self, user_id: UserId, rows: &[CharacterProgress]) -> PortResult<()>;

    /// Known/learning/failed counts per level for one learner.
    async fn summary_by_level(&self, user_id: UserId) -> PortResult<Vec<LevelCounts>>;
}

/// Daily work accounting used for streaks.
#[async_trait]
pub trait DailySummaryStore: Send + Sync {
    async fn record(
        &self,
        user_id: UserId,
        kind: SessionKind,
        average_accuracy: f64,
        item_count: usize,
        set_id: Option<&str>,
    ) -> PortResult<()>;

    async fn streak_and_stats(&self, user_id: UserId) -> PortResult<DailyStats>;
}
