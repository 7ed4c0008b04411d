//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-learner session registry.

use crate::adapters::{content::load_content, DbAdapter};
use crate::config::Config;
use crate::error::ApiError;
use dictation_core::domain::{Learner, SessionKind};
use dictation_core::memory::{MemoryCheckpointStore, MemoryDailySummaryStore, MemoryProgressStore};
use dictation_core::ports::{CheckpointStore, ContentStore, DailySummaryStore, ProgressStore};
use dictation_core::{ProgressTracker, Session, SessionEngine};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

//=========================================================================================
// Identity
//=========================================================================================

/// Who is calling. Authenticated users are identified by the external auth
/// provider; guests by an opaque id the client keeps for its browser session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    User(Uuid),
    Guest(String),
}

impl Identity {
    pub fn learner(&self) -> Learner {
        match self {
            Identity::User(id) => Learner::Authenticated(*id),
            Identity::Guest(_) => Learner::Anonymous,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.learner().user_id()
    }
}

//=========================================================================================
// SessionRegistry (One Session per Identity and Kind)
//=========================================================================================

pub type SessionHandle = Arc<Mutex<Session>>;

/// Live sessions keyed by (identity, kind). Each session sits behind its own
/// mutex, so requests for the same learner and kind run one at a time while
/// different learners never wait on each other.
///
/// Only `start` creates entries. Completing, saving or restarting a session
/// releases its entry, so the map holds sessions that are actually running.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<(Identity, SessionKind), SessionHandle>>,
}

impl SessionRegistry {
    /// Returns the learner's session of this kind, creating an empty one if
    /// none is live.
    pub async fn open(&self, identity: &Identity, kind: SessionKind) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry((identity.clone(), kind))
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(identity.learner(), kind))))
            .clone()
    }

    /// The learner's live session of this kind, if any.
    pub async fn find(&self, identity: &Identity, kind: SessionKind) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .await
            .get(&(identity.clone(), kind))
            .cloned()
    }

    /// Drops the entry, unless it has meanwhile been replaced by another session.
    pub async fn release(&self, identity: &Identity, kind: SessionKind, handle: &SessionHandle) {
        let mut sessions = self.sessions.lock().await;
        let key = (identity.clone(), kind);
        if sessions
            .get(&key)
            .is_some_and(|live| Arc::ptr_eq(live, handle))
        {
            sessions.remove(&key);
            debug!(?identity, %kind, "Session released");
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub engine: Arc<SessionEngine>,
    pub sessions: SessionRegistry,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(engine: SessionEngine, config: Arc<Config>) -> Self {
        Self {
            engine: Arc::new(engine),
            sessions: SessionRegistry::default(),
            config,
        }
    }

    /// Loads content, connects the durable stores and wires the engine.
    ///
    /// Without `DATABASE_URL` every store lives in memory and progress is lost
    /// on restart.
    pub async fn from_config(config: Arc<Config>) -> Result<Self, ApiError> {
        info!("Loading content from {}", config.content_path.display());
        let content: Arc<dyn ContentStore> = Arc::new(load_content(&config.content_path)?);

        let (checkpoints, progress, daily): (
            Arc<dyn CheckpointStore>,
            Arc<dyn ProgressStore>,
            Arc<dyn DailySummaryStore>,
        ) = match &config.database_url {
            Some(url) => {
                info!("Connecting to database...");
                let pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .connect(url)
                    .await?;
                let db = Arc::new(DbAdapter::new(pool));
                info!("Running database migrations...");
                db.run_migrations().await?;
                info!("Database migrations complete.");
                let checkpoints: Arc<dyn CheckpointStore> = db.clone();
                let progress: Arc<dyn ProgressStore> = db.clone();
                let daily: Arc<dyn DailySummaryStore> = db;
                (checkpoints, progress, daily)
            }
            None => {
                warn!("DATABASE_URL is not set; learner progress is kept in memory only");
                let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::default());
                let progress: Arc<dyn ProgressStore> = Arc::new(MemoryProgressStore::default());
                let daily: Arc<dyn DailySummaryStore> = Arc::new(MemoryDailySummaryStore::default());
                (checkpoints, progress, daily)
            }
        };

        let tracker = Arc::new(ProgressTracker::new(progress, content.clone()));
        let engine = SessionEngine::new(content, checkpoints, daily, tracker)
            .with_practice_size(config.practice_session_size);
        Ok(Self::new(engine, config))
    }
}
