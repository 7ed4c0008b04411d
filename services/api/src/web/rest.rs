//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every session handler resolves the learner's session from the registry and
//! holds its lock for the whole operation, so two requests for the same
//! learner and kind never interleave. Only `start` registers a session; the
//! handlers that end one release it again.

use crate::error::ApiError;
use crate::web::protocol::*;
use crate::web::state::{AppState, Identity, SessionHandle};
use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use dictation_core::domain::{Level, SessionKind};
use dictation_core::{check, AdvanceOutcome, CoreError, Session, SessionScope};
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        start_session_handler,
        current_item_handler,
        answer_handler,
        next_handler,
        save_handler,
        restart_handler,
        submit_all_handler,
        check_handler,
        progress_summary_handler,
        daily_stats_handler,
    ),
    components(
        schemas(
            StartRequest, StartResponse, CurrentItemResponse, AnswerRequest, AnswerResponse,
            CorrectionResponse, SegmentResponse, NextResponse, CompletionResponse, SaveResponse,
            RestartResponse, SubmitAllRequest, SubmitAllResponse, CheckRequest,
            LevelSummaryResponse, DailyStatsResponse, DayStatsResponse, PersistenceResponse
        )
    ),
    tags(
        (name = "Dictation Trainer API", description = "Chinese dictation sessions, corrections and progress.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Helpers
//=========================================================================================

fn parse_kind(raw: &str) -> Result<SessionKind, ApiError> {
    raw.parse::<SessionKind>().map_err(ApiError::BadRequest)
}

fn scope_for(kind: SessionKind, request: StartRequest) -> Result<SessionScope, ApiError> {
    let set_id = || {
        request
            .set_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest(format!("set_id is required to start a {}", kind)))
    };
    match kind {
        SessionKind::Practice => {
            let level = match request.level.as_deref() {
                Some(raw) => Some(
                    Level::parse(raw)
                        .ok_or_else(|| ApiError::BadRequest(format!("Invalid level '{}'", raw)))?,
                ),
                None => None,
            };
            Ok(SessionScope::Practice { level })
        }
        SessionKind::Story => Ok(SessionScope::Story { story_id: set_id()? }),
        SessionKind::Conversation => Ok(SessionScope::Conversation {
            conversation_id: set_id()?,
        }),
    }
}

fn no_session(kind: SessionKind) -> ApiError {
    ApiError::Core(CoreError::InvalidState(format!(
        "no {} session in progress",
        kind
    )))
}

async fn live_session(
    state: &AppState,
    identity: &Identity,
    kind: SessionKind,
) -> Result<SessionHandle, ApiError> {
    state
        .sessions
        .find(identity, kind)
        .await
        .ok_or_else(|| no_session(kind))
}

fn require_user(identity: &Identity) -> Result<uuid::Uuid, ApiError> {
    identity
        .user_id()
        .ok_or_else(|| ApiError::Unauthorized("progress is only kept for signed-in users".to_string()))
}

//=========================================================================================
// Session Handlers
//=========================================================================================

/// Start a session, or resume a saved story/conversation.
#[utoipa::path(
    post,
    path = "/sessions/{kind}/start",
    request_body = StartRequest,
    responses(
        (status = 200, description = "Session started or resumed", body = StartResponse),
        (status = 400, description = "Unknown kind, bad level or missing set_id"),
        (status = 401, description = "No identity header"),
        (status = 404, description = "Story, conversation or sentences not found")
    ),
    params(
        ("kind" = String, Path, description = "practice, story or conversation"),
        ("x-user-id" = Option<String>, Header, description = "Authenticated user id."),
        ("x-guest-id" = Option<String>, Header, description = "Anonymous browser id.")
    )
)]
pub async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(kind): Path<String>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let scope = scope_for(kind, request)?;
    let handle = state.sessions.open(&identity, kind).await;
    let mut session = handle.lock().await;
    let outcome = state.engine.start(&mut session, scope).await;
    if outcome.is_err() && session.state().is_none() {
        state.sessions.release(&identity, kind, &handle).await;
    }
    Ok(Json(StartResponse::new(kind.as_str(), outcome?)))
}

/// The item to transcribe next.
#[utoipa::path(
    get,
    path = "/sessions/{kind}/current",
    responses(
        (status = 200, description = "Current item", body = CurrentItemResponse),
        (status = 409, description = "No session in progress")
    ),
    params(("kind" = String, Path, description = "practice, story or conversation"))
)]
pub async fn current_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(kind): Path<String>,
) -> Result<Json<CurrentItemResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let handle = live_session(&state, &identity, kind).await?;
    let session = handle.lock().await;
    let current = session
        .state()
        .and_then(|s| s.current_item().map(|item| CurrentItemResponse::from_state(s, item)));
    current.map(Json).ok_or_else(|| no_session(kind))
}

/// Submit a transcription of the current item.
#[utoipa::path(
    post,
    path = "/sessions/{kind}/answer",
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Correction and updated score", body = AnswerResponse),
        (status = 400, description = "Submission too long or malformed"),
        (status = 409, description = "No session in progress")
    ),
    params(("kind" = String, Path, description = "practice, story or conversation"))
)]
pub async fn answer_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(kind): Path<String>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let handle = live_session(&state, &identity, kind).await?;
    let mut session = handle.lock().await;
    let outcome = state
        .engine
        .record_answer(&mut session, &request.user_input)
        .await?;
    Ok(Json(outcome.into()))
}

/// Move to the next item, completing the session after the last one.
#[utoipa::path(
    post,
    path = "/sessions/{kind}/next",
    responses(
        (status = 200, description = "Next position or completion summary", body = NextResponse),
        (status = 409, description = "No session in progress")
    ),
    params(("kind" = String, Path, description = "practice, story or conversation"))
)]
pub async fn next_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(kind): Path<String>,
) -> Result<Json<NextResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let handle = live_session(&state, &identity, kind).await?;
    let mut session = handle.lock().await;
    let outcome = state.engine.advance(&mut session).await?;
    if matches!(outcome, AdvanceOutcome::Completed(_)) {
        state.sessions.release(&identity, kind, &handle).await;
    }
    Ok(Json(outcome.into()))
}

/// Save the current position and leave the session.
#[utoipa::path(
    post,
    path = "/sessions/{kind}/save",
    responses(
        (status = 200, description = "Checkpoint written, or the session completed when its last item was already answered", body = SaveResponse),
        (status = 409, description = "Nothing to save, or the caller is a guest"),
        (status = 503, description = "Checkpoint store unavailable; the session is kept")
    ),
    params(("kind" = String, Path, description = "story or conversation"))
)]
pub async fn save_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(kind): Path<String>,
) -> Result<Json<SaveResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let handle = live_session(&state, &identity, kind).await?;
    let mut session = handle.lock().await;
    let outcome = state.engine.save_for_later(&mut session).await?;
    state.sessions.release(&identity, kind, &handle).await;
    Ok(Json(outcome.into()))
}

/// Drop the session and its saved checkpoint.
#[utoipa::path(
    post,
    path = "/sessions/{kind}/restart",
    responses(
        (status = 200, description = "Session cleared", body = RestartResponse)
    ),
    params(
        ("kind" = String, Path, description = "practice, story or conversation"),
        RestartParams
    )
)]
pub async fn restart_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(kind): Path<String>,
    Query(params): Query<RestartParams>,
) -> Result<Json<RestartResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let set_id = params.set_id.as_deref();
    let persistence = match state.sessions.find(&identity, kind).await {
        Some(handle) => {
            let mut session = handle.lock().await;
            let persistence = state.engine.restart(&mut session, set_id).await;
            state.sessions.release(&identity, kind, &handle).await;
            persistence
        }
        // Nothing live; still forget a saved checkpoint.
        None => {
            let mut session = Session::new(identity.learner(), kind);
            state.engine.restart(&mut session, set_id).await
        }
    };
    Ok(Json(RestartResponse {
        persistence: PersistenceResponse::from(&persistence),
    }))
}

/// Submit every remaining conversation turn at once.
#[utoipa::path(
    post,
    path = "/sessions/{kind}/submit-all",
    request_body = SubmitAllRequest,
    responses(
        (status = 200, description = "Per-turn corrections and the completion summary", body = SubmitAllResponse),
        (status = 400, description = "A submission is malformed"),
        (status = 409, description = "Not a conversation, or no session in progress")
    ),
    params(("kind" = String, Path, description = "conversation"))
)]
pub async fn submit_all_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(kind): Path<String>,
    Json(request): Json<SubmitAllRequest>,
) -> Result<Json<SubmitAllResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let handle = live_session(&state, &identity, kind).await?;
    let mut session = handle.lock().await;
    let (answers, summary) = state.engine.submit_all(&mut session, &request.inputs).await?;
    state.sessions.release(&identity, kind, &handle).await;
    info!(answers = answers.len(), "Conversation submitted");
    Ok(Json(SubmitAllResponse {
        answers: answers.into_iter().map(Into::into).collect(),
        summary: summary.into(),
    }))
}

//=========================================================================================
// Stateless Handlers
//=========================================================================================

/// Correct a transcription of any sentence without touching a session.
#[utoipa::path(
    post,
    path = "/check",
    request_body = CheckRequest,
    responses(
        (status = 200, description = "Correction", body = CorrectionResponse),
        (status = 400, description = "Submission too long or malformed"),
        (status = 404, description = "Unknown sentence id")
    )
)]
pub async fn check_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CorrectionResponse>, ApiError> {
    let item = state.engine.content().get_item(&request.item_id).await?;
    let correction = check(&request.user_input, &item.text)?;
    Ok(Json(CorrectionResponse::new(&item.text, &correction)))
}

/// Character mastery per level for the signed-in user.
#[utoipa::path(
    get,
    path = "/progress/summary",
    responses(
        (status = 200, description = "Known/learning/failed/unseen counts per level", body = [LevelSummaryResponse]),
        (status = 401, description = "Only available to signed-in users"),
        (status = 503, description = "Progress store unavailable")
    )
)]
pub async fn progress_summary_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<LevelSummaryResponse>>, ApiError> {
    let user_id = require_user(&identity)?;
    let summary = state.engine.progress().summary_by_level(user_id).await?;
    Ok(Json(summary.into_iter().map(Into::into).collect()))
}

/// Today's work, the current streak and the last seven days.
#[utoipa::path(
    get,
    path = "/stats/daily",
    responses(
        (status = 200, description = "Daily statistics", body = DailyStatsResponse),
        (status = 401, description = "Only available to signed-in users"),
        (status = 503, description = "Stats store unavailable")
    )
)]
pub async fn daily_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DailyStatsResponse>, ApiError> {
    let user_id = require_user(&identity)?;
    let stats = state.engine.daily().streak_and_stats(user_id).await?;
    Ok(Json(stats.into()))
}
