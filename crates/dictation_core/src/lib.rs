pub mod align;
pub mod correction;
pub mod domain;
pub mod error;
pub mod memory;
pub mod ports;
pub mod progress;
pub mod session;
pub mod stats;
pub mod text;

pub use correction::{check, render, validate_submission, CorrectionResult, Feedback, Segment};
pub use domain::{
    CharacterProgress, Checkpoint, DailyStats, DayStats, Grade, ItemSet, Learner, Level,
    LevelSummary, MasteryStatus, ReferenceItem, SessionKind, UserId,
};
pub use error::{CoreError, CoreResult};
pub use ports::{
    CheckpointStore, ContentStore, DailySummaryStore, PortError, PortResult, ProgressStore,
};
pub use progress::ProgressTracker;
pub use session::{
    AdvanceOutcome, AnswerOutcome, CompletionSummary, Persistence, Session, SaveOutcome,
    SessionEngine, SessionPhase, SessionScope, SessionState, StartOutcome,
};
