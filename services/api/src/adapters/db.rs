//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the PostgreSQL implementation of
//! the `CheckpointStore`, `ProgressStore` and `DailySummaryStore` ports from the
//! core crate. It handles all interactions with the database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dictation_core::domain::{
    CharacterProgress, Checkpoint, DailyStats, DailyWorkRow, Grade, Level, LevelCounts,
    SessionKind,
};
use dictation_core::ports::{
    CheckpointStore, DailySummaryStore, PortError, PortResult, ProgressStore,
};
use dictation_core::stats;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every durable port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Connection-level failures are transient; everything else is unexpected.
fn port_error(err: sqlx::Error) -> PortError {
    match err {
        sqlx::Error::RowNotFound => PortError::NotFound(err.to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(err.to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

fn parse_kind(raw: &str) -> PortResult<SessionKind> {
    raw.parse::<SessionKind>().map_err(PortError::Unexpected)
}

fn to_i32(value: usize, column: &str) -> PortResult<i32> {
    i32::try_from(value).map_err(|_| PortError::Unexpected(format!("{} out of range", column)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CheckpointRecord {
    user_id: Uuid,
    item_set_id: String,
    kind: String,
    current_index: i32,
    score: i32,
    last_updated: DateTime<Utc>,
}
impl CheckpointRecord {
    fn to_domain(self) -> PortResult<Checkpoint> {
        Ok(Checkpoint {
            user_id: self.user_id,
            item_set_id: self.item_set_id,
            kind: parse_kind(&self.kind)?,
            current_index: self.current_index.max(0) as usize,
            score: self.score.max(0) as usize,
            last_updated: self.last_updated,
        })
    }
}

#[derive(FromRow)]
struct CharacterProgressRecord {
    character: String,
    level: i16,
    grade: i16,
}
impl CharacterProgressRecord {
    fn to_domain(self) -> Option<CharacterProgress> {
        let character = self.character.chars().next()?;
        Some(CharacterProgress {
            character,
            level: Level(self.level.clamp(0, u8::MAX as i16) as u8),
            grade: Grade::new(i32::from(self.grade)),
        })
    }
}

#[derive(FromRow)]
struct LevelCountsRecord {
    level: i16,
    known: i64,
    learning: i64,
    failed: i64,
}
impl LevelCountsRecord {
    fn to_domain(self) -> LevelCounts {
        LevelCounts {
            level: Level(self.level.clamp(0, u8::MAX as i16) as u8),
            known: self.known.max(0) as usize,
            learning: self.learning.max(0) as usize,
            failed: self.failed.max(0) as usize,
        }
    }
}

#[derive(FromRow)]
struct DailyWorkRecord {
    session_date: NaiveDate,
    session_kind: String,
    item_set_id: String,
    sentences_above_threshold: i32,
    total_sentences: i32,
}
impl DailyWorkRecord {
    fn to_domain(self) -> PortResult<DailyWorkRow> {
        Ok(DailyWorkRow {
            date: self.session_date,
            kind: parse_kind(&self.session_kind)?,
            item_set_id: Some(self.item_set_id).filter(|id| !id.is_empty()),
            sentences_above_threshold: self.sentences_above_threshold.max(0) as u32,
            total_sentences: self.total_sentences.max(0) as u32,
        })
    }
}

//=========================================================================================
// `CheckpointStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CheckpointStore for DbAdapter {
    async fn load(
        &self,
        user_id: Uuid,
        kind: SessionKind,
        set_id: &str,
    ) -> PortResult<Option<Checkpoint>> {
        let record = sqlx::query_as::<_, CheckpointRecord>(
            "SELECT user_id, item_set_id, kind, current_index, score, last_updated \
             FROM checkpoints WHERE user_id = $1 AND kind = $2 AND item_set_id = $3",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(set_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        record.map(CheckpointRecord::to_domain).transpose()
    }

    async fn save(
        &self,
        user_id: Uuid,
        kind: SessionKind,
        set_id: &str,
        current_index: usize,
        score: usize,
    ) -> PortResult<Checkpoint> {
        let record = sqlx::query_as::<_, CheckpointRecord>(
            "INSERT INTO checkpoints (user_id, item_set_id, kind, current_index, score, last_updated) \
             VALUES ($1, $2, $3, $4, $5, NOW()) \
             ON CONFLICT (user_id, item_set_id, kind) DO UPDATE \
             SET current_index = EXCLUDED.current_index, score = EXCLUDED.score, last_updated = NOW() \
             RETURNING user_id, item_set_id, kind, current_index, score, last_updated",
        )
        .bind(user_id)
        .bind(set_id)
        .bind(kind.as_str())
        .bind(to_i32(current_index, "current_index")?)
        .bind(to_i32(score, "score")?)
        .fetch_one(&self.pool)
        .await
        .map_err(port_error)?;

        record.to_domain()
    }

    async fn delete(&self, user_id: Uuid, kind: SessionKind, set_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM checkpoints WHERE user_id = $1 AND kind = $2 AND item_set_id = $3")
            .bind(user_id)
            .bind(kind.as_str())
            .bind(set_id)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }
}

//=========================================================================================
// `ProgressStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgressStore for DbAdapter {
    async fn grades(
        &self,
        user_id: Uuid,
        characters: &[char],
    ) -> PortResult<Vec<CharacterProgress>> {
        let keys: Vec<String> = characters.iter().map(|c| c.to_string()).collect();
        let records = sqlx::query_as::<_, CharacterProgressRecord>(
            "SELECT character, level, grade FROM character_progress \
             WHERE user_id = $1 AND character = ANY($2)",
        )
        .bind(user_id)
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(records
            .into_iter()
            .filter_map(CharacterProgressRecord::to_domain)
            .collect())
    }

    async fn batch_upsert(&self, user_id: Uuid, batch: &[CharacterProgress]) -> PortResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let characters: Vec<String> = batch.iter().map(|row| row.character.to_string()).collect();
        let levels: Vec<i16> = batch.iter().map(|row| i16::from(row.level.0)).collect();
        let grades: Vec<i16> = batch.iter().map(|row| i16::from(row.grade.value())).collect();

        // A single statement, so the whole batch lands or none of it does.
        sqlx::query(
            "INSERT INTO character_progress (user_id, character, level, grade, last_seen) \
             SELECT $1, t.character, t.level, t.grade, NOW() \
             FROM UNNEST($2::text[], $3::smallint[], $4::smallint[]) AS t(character, level, grade) \
             ON CONFLICT (user_id, character) DO UPDATE \
             SET level = EXCLUDED.level, grade = EXCLUDED.grade, last_seen = EXCLUDED.last_seen",
        )
        .bind(user_id)
        .bind(characters)
        .bind(levels)
        .bind(grades)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn summary_by_level(&self, user_id: Uuid) -> PortResult<Vec<LevelCounts>> {
        let records = sqlx::query_as::<_, LevelCountsRecord>(
            "SELECT level, \
                    COUNT(*) FILTER (WHERE grade >= 3) AS known, \
                    COUNT(*) FILTER (WHERE grade BETWEEN 0 AND 2) AS learning, \
                    COUNT(*) FILTER (WHERE grade < 0) AS failed \
             FROM character_progress WHERE user_id = $1 \
             GROUP BY level ORDER BY level",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(records.into_iter().map(LevelCountsRecord::to_domain).collect())
    }
}

//=========================================================================================
// `DailySummaryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DailySummaryStore for DbAdapter {
    async fn record(
        &self,
        user_id: Uuid,
        kind: SessionKind,
        average_accuracy: f64,
        item_count: usize,
        set_id: Option<&str>,
    ) -> PortResult<()> {
        let today = Utc::now().date_naive();
        let above = stats::above_threshold_increment(average_accuracy) as i32;
        sqlx::query(
            "INSERT INTO daily_work \
                (user_id, session_date, session_kind, item_set_id, sentences_above_threshold, total_sentences) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, session_date, session_kind, item_set_id) DO UPDATE \
             SET sentences_above_threshold = daily_work.sentences_above_threshold + EXCLUDED.sentences_above_threshold, \
                 total_sentences = daily_work.total_sentences + EXCLUDED.total_sentences",
        )
        .bind(user_id)
        .bind(today)
        .bind(kind.as_str())
        .bind(set_id.unwrap_or(""))
        .bind(above)
        .bind(to_i32(item_count, "total_sentences")?)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn streak_and_stats(&self, user_id: Uuid) -> PortResult<DailyStats> {
        let records = sqlx::query_as::<_, DailyWorkRecord>(
            "SELECT session_date, session_kind, item_set_id, sentences_above_threshold, total_sentences \
             FROM daily_work WHERE user_id = $1 ORDER BY session_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        let rows = records
            .into_iter()
            .map(DailyWorkRecord::to_domain)
            .collect::<PortResult<Vec<_>>>()?;
        Ok(stats::summarize(&rows, Utc::now().date_naive()))
    }
}
