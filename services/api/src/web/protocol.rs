//! services/api/src/web/protocol.rs
//!
//! Defines the JSON message protocol between the browser client and the API
//! server. Core outcomes are converted here so handlers stay thin.

use chrono::{DateTime, NaiveDate, Utc};
use dictation_core::domain::{DailyStats, DayStats, LevelSummary, ReferenceItem};
use dictation_core::session::{
    AdvanceOutcome, AnswerOutcome, CompletionSummary, Persistence, SaveOutcome, SessionState,
    StartOutcome,
};
use dictation_core::{CorrectionResult, Segment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Starts (or resumes) a session.
#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct StartRequest {
    /// Practice only: `"HSK3"` or `"3"`. Omit for a mix of all levels.
    pub level: Option<String>,
    /// Story or conversation id. Required for those kinds.
    pub set_id: Option<String>,
}

/// A transcription of the current item.
#[derive(Deserialize, Debug, ToSchema)]
pub struct AnswerRequest {
    pub user_input: String,
}

/// Transcriptions for every remaining conversation turn, keyed by item id.
#[derive(Deserialize, Debug, ToSchema)]
pub struct SubmitAllRequest {
    pub inputs: HashMap<String, String>,
}

/// A one-off correction outside of any session.
#[derive(Deserialize, Debug, ToSchema)]
pub struct CheckRequest {
    pub item_id: String,
    pub user_input: String,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RestartParams {
    /// Story or conversation whose checkpoint should be forgotten when no
    /// session is running.
    pub set_id: Option<String>,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Whether the durable side effects of an operation went through.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct PersistenceResponse {
    /// `saved`, `skipped` or `not_applicable`.
    pub status: String,
    pub reason: Option<String>,
}

impl From<&Persistence> for PersistenceResponse {
    fn from(persistence: &Persistence) -> Self {
        let (status, reason) = match persistence {
            Persistence::Saved => ("saved", None),
            Persistence::Skipped { reason } => ("skipped", Some(reason.clone())),
            Persistence::NotApplicable => ("not_applicable", None),
        };
        Self {
            status: status.to_string(),
            reason,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct StartResponse {
    pub kind: String,
    pub resumed: bool,
    pub index: usize,
    pub total: usize,
    pub title: Option<String>,
    pub persistence: PersistenceResponse,
}

impl StartResponse {
    pub fn new(kind: &str, outcome: StartOutcome) -> Self {
        Self {
            kind: kind.to_string(),
            resumed: outcome.resumed,
            index: outcome.index,
            total: outcome.total,
            title: outcome.title,
            persistence: PersistenceResponse::from(&outcome.persistence),
        }
    }
}

/// The item the learner should transcribe next. The reference text itself is
/// withheld until an answer is submitted.
#[derive(Serialize, Debug, ToSchema)]
pub struct CurrentItemResponse {
    pub item_id: String,
    pub index: usize,
    pub total: usize,
    pub score: usize,
    pub level: String,
    pub title: Option<String>,
    pub translation: Option<String>,
    pub pronunciation_hint: Option<String>,
    pub answered: bool,
    /// Texts of the items already behind the learner (story context).
    pub previous_items: Vec<String>,
    pub group_scores: Vec<u8>,
}

impl CurrentItemResponse {
    pub fn from_state(state: &SessionState, item: &ReferenceItem) -> Self {
        Self {
            item_id: item.id.clone(),
            index: state.current_index(),
            total: state.len(),
            score: state.score(),
            level: item.level.to_string(),
            title: state.title().map(str::to_string),
            translation: item.translation.clone(),
            pronunciation_hint: item.pronunciation_hint.clone(),
            answered: state.current_answered(),
            previous_items: state.previous_items().iter().map(|i| i.text.clone()).collect(),
            group_scores: state.group_scores().to_vec(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SegmentResponse {
    /// `plain`, `deleted` or `inserted`.
    pub kind: String,
    pub text: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct CorrectionResponse {
    pub reference: String,
    /// The correction rendered with `diff-del` / `diff-ins` spans.
    pub html: String,
    pub segments: Vec<SegmentResponse>,
    pub accuracy: u8,
    pub passed: bool,
    pub is_exact_match: bool,
    pub correct_text: String,
    pub feedback: String,
    pub feedback_color: String,
}

impl CorrectionResponse {
    pub fn new(reference: &str, correction: &CorrectionResult) -> Self {
        let feedback = correction.feedback();
        Self {
            reference: reference.to_string(),
            html: correction.to_html(),
            segments: correction
                .markup
                .iter()
                .map(|segment| {
                    let kind = match segment {
                        Segment::Plain(_) => "plain",
                        Segment::Deleted(_) => "deleted",
                        Segment::Inserted(_) => "inserted",
                    };
                    SegmentResponse {
                        kind: kind.to_string(),
                        text: segment.text().to_string(),
                    }
                })
                .collect(),
            accuracy: correction.accuracy,
            passed: correction.passed(),
            is_exact_match: correction.is_exact_match,
            correct_text: correction.correct_text.clone(),
            feedback: feedback.label().to_string(),
            feedback_color: feedback.color().to_string(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AnswerResponse {
    pub item_id: String,
    pub correction: CorrectionResponse,
    /// False when the item had already been answered.
    pub recorded: bool,
    pub score: usize,
    pub average_accuracy: f64,
    pub index: usize,
    pub total: usize,
    pub persistence: PersistenceResponse,
}

impl From<AnswerOutcome> for AnswerResponse {
    fn from(outcome: AnswerOutcome) -> Self {
        Self {
            correction: CorrectionResponse::new(&outcome.item.text, &outcome.correction),
            item_id: outcome.item.id,
            recorded: outcome.recorded,
            score: outcome.score,
            average_accuracy: outcome.average_accuracy,
            index: outcome.index,
            total: outcome.total,
            persistence: PersistenceResponse::from(&outcome.persistence),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DayStatsResponse {
    pub date: NaiveDate,
    pub weekday: String,
    pub sentences_above_threshold: u32,
    pub total_sentences: u32,
    pub completed: bool,
}

impl From<DayStats> for DayStatsResponse {
    fn from(day: DayStats) -> Self {
        Self {
            date: day.date,
            weekday: day.weekday,
            sentences_above_threshold: day.sentences_above_threshold,
            total_sentences: day.total_sentences,
            completed: day.completed,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DailyStatsResponse {
    pub today_above_threshold: u32,
    pub today_total_sentences: u32,
    pub today_sessions: usize,
    pub streak_days: u32,
    /// Oldest day first, today last.
    pub last_7_days: Vec<DayStatsResponse>,
}

impl From<DailyStats> for DailyStatsResponse {
    fn from(stats: DailyStats) -> Self {
        Self {
            today_above_threshold: stats.today_above_threshold,
            today_total_sentences: stats.today_total_sentences,
            today_sessions: stats.today_sessions,
            streak_days: stats.streak_days,
            last_7_days: stats.last_7_days.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct CompletionResponse {
    pub kind: String,
    pub set_id: Option<String>,
    pub title: Option<String>,
    pub score: usize,
    pub total: usize,
    pub average_accuracy: f64,
    pub accuracy_history: Vec<u8>,
    pub group_scores: Vec<u8>,
    pub daily_stats: Option<DailyStatsResponse>,
    pub persistence: PersistenceResponse,
}

impl From<CompletionSummary> for CompletionResponse {
    fn from(summary: CompletionSummary) -> Self {
        Self {
            kind: summary.kind.to_string(),
            set_id: summary.set_id,
            title: summary.title,
            score: summary.score,
            total: summary.total,
            average_accuracy: summary.average_accuracy,
            accuracy_history: summary.accuracy_history,
            group_scores: summary.group_scores,
            daily_stats: summary.daily_stats.map(Into::into),
            persistence: PersistenceResponse::from(&summary.persistence),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct NextResponse {
    pub completed: bool,
    /// Index of the new current item; absent once completed.
    pub index: Option<usize>,
    pub total: usize,
    pub group_scores: Vec<u8>,
    pub summary: Option<CompletionResponse>,
}

impl From<AdvanceOutcome> for NextResponse {
    fn from(outcome: AdvanceOutcome) -> Self {
        match outcome {
            AdvanceOutcome::Next {
                index,
                total,
                group_scores,
            } => Self {
                completed: false,
                index: Some(index),
                total,
                group_scores,
                summary: None,
            },
            AdvanceOutcome::Completed(summary) => Self {
                completed: true,
                index: None,
                total: summary.total,
                group_scores: summary.group_scores.clone(),
                summary: Some(summary.into()),
            },
        }
    }
}

/// Either the written checkpoint or, when the last item was already
/// answered, the completion summary.
#[derive(Serialize, Debug, ToSchema)]
pub struct SaveResponse {
    pub completed: bool,
    pub set_id: Option<String>,
    pub current_index: Option<usize>,
    pub score: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub summary: Option<CompletionResponse>,
}

impl From<SaveOutcome> for SaveResponse {
    fn from(outcome: SaveOutcome) -> Self {
        match outcome {
            SaveOutcome::Saved(checkpoint) => Self {
                completed: false,
                set_id: Some(checkpoint.item_set_id),
                current_index: Some(checkpoint.current_index),
                score: checkpoint.score,
                last_updated: Some(checkpoint.last_updated),
                summary: None,
            },
            SaveOutcome::Completed(summary) => Self {
                completed: true,
                set_id: summary.set_id.clone(),
                current_index: None,
                score: summary.score,
                last_updated: None,
                summary: Some(summary.into()),
            },
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct RestartResponse {
    pub persistence: PersistenceResponse,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SubmitAllResponse {
    pub answers: Vec<AnswerResponse>,
    pub summary: CompletionResponse,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct LevelSummaryResponse {
    pub level: String,
    pub known: usize,
    pub learning: usize,
    pub failed: usize,
    pub unseen: usize,
    pub total: usize,
}

impl From<LevelSummary> for LevelSummaryResponse {
    fn from(summary: LevelSummary) -> Self {
        Self {
            level: summary.level.to_string(),
            known: summary.known,
            learning: summary.learning,
            failed: summary.failed,
            unseen: summary.unseen,
            total: summary.total,
        }
    }
}
