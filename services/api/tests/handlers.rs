use std::collections::HashMap;
use std::sync::Arc;

use api_lib::config::Config;
use api_lib::error::ApiError;
use api_lib::web::protocol::{
    AnswerRequest, CheckRequest, RestartParams, StartRequest, SubmitAllRequest,
};
use api_lib::web::rest::{
    answer_handler, check_handler, current_item_handler, daily_stats_handler, next_handler,
    progress_summary_handler, restart_handler, save_handler, start_session_handler,
    submit_all_handler,
};
use api_lib::web::state::{AppState, Identity};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use dictation_core::domain::{ItemSet, Level, ReferenceItem, SessionKind};
use dictation_core::memory::{
    MemoryCheckpointStore, MemoryContentStore, MemoryDailySummaryStore, MemoryProgressStore,
};
use dictation_core::{ProgressTracker, SessionEngine};
use uuid::Uuid;

const STORY: [&str; 3] = ["很久以前，有一个皇帝。", "他很喜欢新衣服。", "每天都穿新衣服。"];

fn item(id: &str, text: &str) -> ReferenceItem {
    ReferenceItem {
        id: id.to_string(),
        text: text.to_string(),
        level: Level(1),
        translation: Some("...".to_string()),
        pronunciation_hint: None,
    }
}

fn item_set(kind: SessionKind, id: &str) -> ItemSet {
    ItemSet {
        id: id.to_string(),
        kind,
        title: "皇帝的新衣".to_string(),
        level: Level(4),
        items: STORY
            .iter()
            .enumerate()
            .map(|(i, text)| item(&format!("{}", i + 1), text))
            .collect(),
    }
}

fn app() -> (Arc<AppState>, Arc<MemoryCheckpointStore>) {
    let content = Arc::new(
        MemoryContentStore::new()
            .with_items([item("1", "你好。"), item("2", "谢谢你。")])
            .with_set(item_set(SessionKind::Story, "emperor"))
            .with_set(item_set(SessionKind::Conversation, "chat"))
            .with_characters([('你', Level(1)), ('好', Level(1)), ('皇', Level(4))]),
    );
    let checkpoints = Arc::new(MemoryCheckpointStore::default());
    let progress = Arc::new(MemoryProgressStore::default());
    let daily = Arc::new(MemoryDailySummaryStore::default());
    let tracker = Arc::new(ProgressTracker::new(progress, content.clone()));
    let engine = SessionEngine::new(content, checkpoints.clone(), daily, tracker);
    let config = Arc::new(Config::from_lookup(|_| None).unwrap());
    (Arc::new(AppState::new(engine, config)), checkpoints)
}

fn story_start() -> Json<StartRequest> {
    Json(StartRequest {
        level: None,
        set_id: Some("emperor".to_string()),
    })
}

fn answer(text: &str) -> Json<AnswerRequest> {
    Json(AnswerRequest {
        user_input: text.to_string(),
    })
}

fn path(kind: &str) -> Path<String> {
    Path(kind.to_string())
}

#[tokio::test]
async fn story_round_trip_over_handlers() {
    let (state, checkpoints) = app();
    let user = Identity::User(Uuid::new_v4());

    let Json(started) = start_session_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("story"),
        story_start(),
    )
    .await
    .unwrap();
    assert_eq!((started.index, started.total, started.resumed), (0, 3, false));
    assert_eq!(started.title.as_deref(), Some("皇帝的新衣"));

    let Json(current) = current_item_handler(State(state.clone()), Extension(user.clone()), path("story"))
        .await
        .unwrap();
    assert_eq!(current.item_id, "1");
    assert!(!current.answered);

    let Json(answered) = answer_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("story"),
        answer("很久以前有一个狗"),
    )
    .await
    .unwrap();
    assert!(answered.recorded);
    assert_eq!(answered.correction.accuracy, 78);
    assert_eq!(answered.correction.feedback, "Good!");
    assert!(answered.correction.html.contains("<span class='diff-del'>狗</span>"));
    assert_eq!(answered.score, 1);
    assert_eq!(answered.persistence.status, "saved");

    let Json(saved) = save_handler(State(state.clone()), Extension(user.clone()), path("story"))
        .await
        .unwrap();
    assert!(!saved.completed);
    assert_eq!((saved.current_index, saved.score), (Some(1), 1));
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(state.sessions.len().await, 0);

    // Saving clears the live session; starting again resumes from the checkpoint.
    let Json(resumed) = start_session_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("story"),
        story_start(),
    )
    .await
    .unwrap();
    assert!(resumed.resumed);
    assert_eq!(resumed.index, 1);

    for text in &STORY[1..] {
        answer_handler(State(state.clone()), Extension(user.clone()), path("story"), answer(text))
            .await
            .unwrap();
        next_handler(State(state.clone()), Extension(user.clone()), path("story"))
            .await
            .unwrap();
    }

    let Json(stats) = daily_stats_handler(State(state.clone()), Extension(user.clone()))
        .await
        .unwrap();
    assert_eq!(stats.today_sessions, 1);
    assert_eq!(stats.today_total_sentences, 3);
    assert_eq!(stats.last_7_days.len(), 7);
    assert!(checkpoints.is_empty());
}

#[tokio::test]
async fn completion_is_reported_by_next() {
    let (state, _) = app();
    let guest = Identity::Guest("tab-1".to_string());
    start_session_handler(
        State(state.clone()),
        Extension(guest.clone()),
        path("story"),
        story_start(),
    )
    .await
    .unwrap();

    let mut last = None;
    for text in STORY {
        answer_handler(State(state.clone()), Extension(guest.clone()), path("story"), answer(text))
            .await
            .unwrap();
        let Json(next) = next_handler(State(state.clone()), Extension(guest.clone()), path("story"))
            .await
            .unwrap();
        last = Some(next);
    }

    let next = last.unwrap();
    assert!(next.completed);
    assert!(next.index.is_none());
    let summary = next.summary.unwrap();
    assert_eq!(summary.score, 3);
    assert_eq!(summary.group_scores, vec![10]);
    assert!(summary.daily_stats.is_none());
    assert_eq!(summary.persistence.status, "not_applicable");
}

#[tokio::test]
async fn guests_cannot_save_or_read_progress() {
    let (state, _) = app();
    let guest = Identity::Guest("tab-2".to_string());
    start_session_handler(
        State(state.clone()),
        Extension(guest.clone()),
        path("story"),
        story_start(),
    )
    .await
    .unwrap();

    let err = save_handler(State(state.clone()), Extension(guest.clone()), path("story"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);

    let err = progress_summary_handler(State(state.clone()), Extension(guest.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn errors_map_to_client_statuses() {
    let (state, _) = app();
    let guest = Identity::Guest("tab-3".to_string());

    let err = current_item_handler(State(state.clone()), Extension(guest.clone()), path("story"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);

    let err = start_session_handler(
        State(state.clone()),
        Extension(guest.clone()),
        path("story"),
        Json(StartRequest {
            level: None,
            set_id: Some("missing".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    let err = start_session_handler(
        State(state.clone()),
        Extension(guest.clone()),
        path("karaoke"),
        Json(StartRequest::default()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    start_session_handler(
        State(state.clone()),
        Extension(guest.clone()),
        path("practice"),
        Json(StartRequest::default()),
    )
    .await
    .unwrap();
    let err = answer_handler(
        State(state.clone()),
        Extension(guest.clone()),
        path("practice"),
        answer(&"你".repeat(1001)),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn conversation_can_be_submitted_at_once() {
    let (state, _) = app();
    let user = Identity::User(Uuid::new_v4());
    start_session_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("conversation"),
        Json(StartRequest {
            level: None,
            set_id: Some("chat".to_string()),
        }),
    )
    .await
    .unwrap();

    let inputs: HashMap<String, String> = [
        ("1".to_string(), STORY[0].to_string()),
        ("2".to_string(), STORY[1].to_string()),
    ]
    .into_iter()
    .collect();
    let Json(submitted) = submit_all_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("conversation"),
        Json(SubmitAllRequest { inputs }),
    )
    .await
    .unwrap();

    assert_eq!(submitted.answers.len(), 3);
    assert_eq!(submitted.summary.score, 2);
    assert_eq!(submitted.summary.accuracy_history, vec![100, 100, 0]);
    assert!(submitted.summary.daily_stats.is_some());
}

#[tokio::test]
async fn restart_clears_a_saved_story() {
    let (state, checkpoints) = app();
    let user = Identity::User(Uuid::new_v4());
    start_session_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("story"),
        story_start(),
    )
    .await
    .unwrap();
    save_handler(State(state.clone()), Extension(user.clone()), path("story"))
        .await
        .unwrap();
    assert_eq!(checkpoints.len(), 1);

    let Json(restarted) = restart_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("story"),
        Query(RestartParams {
            set_id: Some("emperor".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(restarted.persistence.status, "saved");
    assert!(checkpoints.is_empty());
}

#[tokio::test]
async fn check_corrects_without_a_session() {
    let (state, _) = app();
    let Json(correction) = check_handler(
        State(state.clone()),
        Json(CheckRequest {
            item_id: "1".to_string(),
            user_input: "你好".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(correction.accuracy, 100);
    assert!(correction.is_exact_match);
    assert_eq!(correction.html, "你好。");
    assert_eq!(correction.feedback, "Perfect!");

    let err = check_handler(
        State(state),
        Json(CheckRequest {
            item_id: "404".to_string(),
            user_input: "你好".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn progress_summary_reports_unseen_characters() {
    let (state, _) = app();
    let user = Identity::User(Uuid::new_v4());
    start_session_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("practice"),
        Json(StartRequest::default()),
    )
    .await
    .unwrap();

    let Json(summary) = progress_summary_handler(State(state), Extension(user))
        .await
        .unwrap();
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].level, "HSK1");
    assert_eq!((summary[0].unseen, summary[0].total), (2, 2));
    assert_eq!(summary[1].level, "HSK4");
}

#[tokio::test]
async fn lookups_do_not_register_sessions() {
    let (state, _) = app();
    for i in 0..1000 {
        let guest = Identity::Guest(format!("g{}", i));
        let err = current_item_handler(State(state.clone()), Extension(guest.clone()), path("story"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        let err = answer_handler(State(state.clone()), Extension(guest), path("story"), answer("你"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
    assert_eq!(state.sessions.len().await, 0);
}

#[tokio::test]
async fn ended_sessions_leave_the_registry() {
    let (state, _) = app();
    let user = Identity::User(Uuid::new_v4());

    // Failed start.
    start_session_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("story"),
        Json(StartRequest {
            level: None,
            set_id: Some("missing".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(state.sessions.len().await, 0);

    // Completion through next.
    start_session_handler(State(state.clone()), Extension(user.clone()), path("story"), story_start())
        .await
        .unwrap();
    assert_eq!(state.sessions.len().await, 1);
    for text in STORY {
        answer_handler(State(state.clone()), Extension(user.clone()), path("story"), answer(text))
            .await
            .unwrap();
        next_handler(State(state.clone()), Extension(user.clone()), path("story"))
            .await
            .unwrap();
    }
    assert_eq!(state.sessions.len().await, 0);

    // Restart.
    start_session_handler(State(state.clone()), Extension(user.clone()), path("story"), story_start())
        .await
        .unwrap();
    restart_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("story"),
        Query(RestartParams { set_id: None }),
    )
    .await
    .unwrap();
    assert_eq!(state.sessions.len().await, 0);

    // Conversation submitted at once.
    start_session_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("conversation"),
        Json(StartRequest {
            level: None,
            set_id: Some("chat".to_string()),
        }),
    )
    .await
    .unwrap();
    submit_all_handler(
        State(state.clone()),
        Extension(user.clone()),
        path("conversation"),
        Json(SubmitAllRequest {
            inputs: HashMap::new(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(state.sessions.len().await, 0);
}

#[tokio::test]
async fn saving_after_the_last_answer_completes() {
    let (state, checkpoints) = app();
    let user = Identity::User(Uuid::new_v4());
    start_session_handler(State(state.clone()), Extension(user.clone()), path("story"), story_start())
        .await
        .unwrap();
    for (i, text) in STORY.iter().enumerate() {
        answer_handler(State(state.clone()), Extension(user.clone()), path("story"), answer(text))
            .await
            .unwrap();
        if i + 1 < STORY.len() {
            next_handler(State(state.clone()), Extension(user.clone()), path("story"))
                .await
                .unwrap();
        }
    }

    let Json(saved) = save_handler(State(state.clone()), Extension(user.clone()), path("story"))
        .await
        .unwrap();
    assert!(saved.completed);
    assert!(saved.current_index.is_none());
    let summary = saved.summary.unwrap();
    assert_eq!((summary.score, summary.total), (3, 3));
    assert!(summary.daily_stats.is_some());
    assert!(checkpoints.is_empty());
    assert_eq!(state.sessions.len().await, 0);
}
