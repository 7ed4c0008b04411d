//! crates/dictation_core/src/session.rs
//!
//! The practice/story/conversation state machine.
//!
//! A `Session` belongs to one learner and one `SessionKind` and moves through
//! `NotStarted -> InProgress -> Completed`. The `SessionEngine` owns the
//! collaborators (content, checkpoints, daily summaries, character progress)
//! and performs every transition. Failures of durable side effects never undo
//! a transition: they are logged and reported through `Persistence`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::correction::{check, CorrectionResult};
use crate::domain::{
    Checkpoint, DailyStats, Learner, Level, ReferenceItem, SessionKind, UserId,
};
use crate::error::{CoreError, CoreResult};
use crate::ports::{CheckpointStore, ContentStore, DailySummaryStore, PortError};
use crate::progress::ProgressTracker;

/// Story group scores are computed over this many consecutive items.
pub const GROUP_SIZE: usize = 5;

/// Number of sentences drawn for a practice session unless configured otherwise.
pub const DEFAULT_PRACTICE_SIZE: usize = 5;

//=========================================================================================
// Session State
//=========================================================================================

/// What a session is practising.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionScope {
    /// Randomly drawn sentences, optionally restricted to one level.
    Practice { level: Option<Level> },
    Story { story_id: String },
    Conversation { conversation_id: String },
}

impl SessionScope {
    pub fn kind(&self) -> SessionKind {
        match self {
            SessionScope::Practice { .. } => SessionKind::Practice,
            SessionScope::Story { .. } => SessionKind::Story,
            SessionScope::Conversation { .. } => SessionKind::Conversation,
        }
    }

    pub fn set_id(&self) -> Option<&str> {
        match self {
            SessionScope::Practice { .. } => None,
            SessionScope::Story { story_id } => Some(story_id),
            SessionScope::Conversation { conversation_id } => Some(conversation_id),
        }
    }
}

/// Progress through a fixed sequence of items.
///
/// Invariants: `current_index <= len()`, one accuracy entry per answered item,
/// and `score` never exceeds the number of answered items.
#[derive(Debug, Clone)]
pub struct SessionState {
    scope: SessionScope,
    title: Option<String>,
    items: Vec<ReferenceItem>,
    current_index: usize,
    score: usize,
    accuracy_history: Vec<u8>,
    per_item_correct: BTreeMap<usize, bool>,
    group_scores: Vec<u8>,
}

impl SessionState {
    fn new(scope: SessionScope, title: Option<String>, items: Vec<ReferenceItem>) -> Self {
        Self {
            scope,
            title,
            items,
            current_index: 0,
            score: 0,
            accuracy_history: Vec::new(),
            per_item_correct: BTreeMap::new(),
            group_scores: Vec::new(),
        }
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn item_ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn accuracy_history(&self) -> &[u8] {
        &self.accuracy_history
    }

    pub fn per_item_correct(&self) -> &BTreeMap<usize, bool> {
        &self.per_item_correct
    }

    pub fn group_scores(&self) -> &[u8] {
        &self.group_scores
    }

    pub fn current_item(&self) -> Option<&ReferenceItem> {
        self.items.get(self.current_index)
    }

    /// Items already behind the learner, for story context.
    pub fn previous_items(&self) -> &[ReferenceItem] {
        &self.items[..self.current_index.min(self.items.len())]
    }

    /// Whether the current item already has a recorded answer.
    pub fn current_answered(&self) -> bool {
        self.per_item_correct.contains_key(&self.current_index)
    }

    /// Mean of recorded accuracies, 0 when nothing was answered.
    pub fn average_accuracy(&self) -> f64 {
        if self.accuracy_history.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.accuracy_history.iter().map(|&a| u32::from(a)).sum();
        f64::from(sum) / self.accuracy_history.len() as f64
    }

    /// Where a saved checkpoint should resume: past the current item once it
    /// has been answered, so resuming never re-asks it.
    pub fn resume_index(&self) -> usize {
        if self.current_answered() {
            self.current_index + 1
        } else {
            self.current_index
        }
    }

    /// 0..=10 share of correct items in the group ending at `last`.
    fn group_score(&self, last: usize) -> u8 {
        let start = last - last % GROUP_SIZE;
        let correct = (start..=last)
            .filter(|i| self.per_item_correct.get(i).copied().unwrap_or(false))
            .count();
        (correct * 10 / (last + 1 - start)) as u8
    }
}

/// Lifecycle of a learner's session of one kind.
#[derive(Debug, Clone)]
pub enum SessionPhase {
    NotStarted,
    InProgress(SessionState),
    Completed(CompletionSummary),
}

/// One learner's session of one kind.
#[derive(Debug, Clone)]
pub struct Session {
    learner: Learner,
    kind: SessionKind,
    phase: SessionPhase,
}

impl Session {
    pub fn new(learner: Learner, kind: SessionKind) -> Self {
        Self {
            learner,
            kind,
            phase: SessionPhase::NotStarted,
        }
    }

    pub fn learner(&self) -> Learner {
        self.learner
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn state(&self) -> Option<&SessionState> {
        match &self.phase {
            SessionPhase::InProgress(state) => Some(state),
            _ => None,
        }
    }

    fn state_mut(&mut self) -> CoreResult<&mut SessionState> {
        match &mut self.phase {
            SessionPhase::InProgress(state) => Ok(state),
            _ => Err(CoreError::InvalidState(format!(
                "no {} session in progress",
                self.kind
            ))),
        }
    }
}

//=========================================================================================
// Outcomes
//=========================================================================================

/// What happened to the durable side effects of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Persistence {
    Saved,
    /// A store failed; the in-memory result stands but nothing was written.
    Skipped { reason: String },
    /// Nothing to persist (anonymous learner or no durable effect).
    NotApplicable,
}

impl Persistence {
    fn skipped(operation: &str, err: PortError) -> Self {
        warn!(error = %err, "{} skipped", operation);
        Persistence::Skipped {
            reason: err.to_string(),
        }
    }

    /// Combines two effects of the same operation, keeping the worst.
    fn and(self, other: Persistence) -> Persistence {
        match (self, other) {
            (skipped @ Persistence::Skipped { .. }, _) | (_, skipped @ Persistence::Skipped { .. }) => {
                skipped
            }
            (Persistence::Saved, _) | (_, Persistence::Saved) => Persistence::Saved,
            _ => Persistence::NotApplicable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub resumed: bool,
    pub index: usize,
    pub total: usize,
    pub title: Option<String>,
    pub persistence: Persistence,
}

#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub item: ReferenceItem,
    pub correction: CorrectionResult,
    /// False when the item had already been answered; the correction is
    /// returned but history and score are unchanged.
    pub recorded: bool,
    pub score: usize,
    /// Running mean of the session, rounded to one decimal.
    pub average_accuracy: f64,
    pub index: usize,
    pub total: usize,
    pub persistence: Persistence,
}

#[derive(Debug, Clone)]
pub struct CompletionSummary {
    pub kind: SessionKind,
    pub set_id: Option<String>,
    pub title: Option<String>,
    pub score: usize,
    pub total: usize,
    pub average_accuracy: f64,
    pub accuracy_history: Vec<u8>,
    pub group_scores: Vec<u8>,
    pub daily_stats: Option<DailyStats>,
    pub persistence: Persistence,
}

#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    Next {
        index: usize,
        total: usize,
        group_scores: Vec<u8>,
    },
    Completed(CompletionSummary),
}

/// Result of leaving a session for later. Saving once the last item has been
/// answered completes the session instead.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    Saved(Checkpoint),
    Completed(CompletionSummary),
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

//=========================================================================================
// Session Engine
//=========================================================================================

/// Drives sessions against the injected collaborators.
pub struct SessionEngine {
    content: Arc<dyn ContentStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    daily: Arc<dyn DailySummaryStore>,
    progress: Arc<ProgressTracker>,
    practice_size: usize,
    seed: Option<u64>,
}

impl SessionEngine {
    pub fn new(
        content: Arc<dyn ContentStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        daily: Arc<dyn DailySummaryStore>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            content,
            checkpoints,
            daily,
            progress,
            practice_size: DEFAULT_PRACTICE_SIZE,
            seed: None,
        }
    }

    pub fn with_practice_size(mut self, size: usize) -> Self {
        self.practice_size = size.max(1);
        self
    }

    /// Makes practice sampling deterministic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub fn daily(&self) -> &Arc<dyn DailySummaryStore> {
        &self.daily
    }

    /// Starts a session, or resumes one.
    ///
    /// A running session with the same scope is kept as is (a practice start
    /// without a level keeps any running practice). Stories and conversations
    /// of authenticated learners resume from their checkpoint when one exists.
    pub async fn start(
        &self,
        session: &mut Session,
        scope: SessionScope,
    ) -> CoreResult<StartOutcome> {
        if scope.kind() != session.kind {
            return Err(CoreError::InvalidState(format!(
                "cannot start a {} in a {} session",
                scope.kind(),
                session.kind
            )));
        }

        if let Some(state) = session.state() {
            let same = match (&scope, &state.scope) {
                (SessionScope::Practice { level: None }, SessionScope::Practice { .. }) => true,
                (requested, running) => requested == running,
            };
            if same {
                return Ok(StartOutcome {
                    resumed: false,
                    index: state.current_index,
                    total: state.len(),
                    title: state.title.clone(),
                    persistence: Persistence::NotApplicable,
                });
            }
        }

        let (state, resumed, persistence) = match &scope {
            SessionScope::Practice { level } => {
                let items = self.draw_practice_items(*level).await?;
                let state = SessionState::new(scope.clone(), None, items);
                (state, false, Persistence::NotApplicable)
            }
            SessionScope::Story { story_id: set_id }
            | SessionScope::Conversation {
                conversation_id: set_id,
            } => {
                let set = self.content.get_item_set(scope.kind(), set_id).await?;
                if set.items.is_empty() {
                    return Err(CoreError::ItemNotFound(format!(
                        "{} {} has no items",
                        scope.kind(),
                        set_id
                    )));
                }
                let mut state = SessionState::new(scope.clone(), Some(set.title), set.items);
                let (checkpoint, persistence) = match session.learner.user_id() {
                    Some(user_id) => self.load_checkpoint(user_id, scope.kind(), set_id).await,
                    None => (None, Persistence::NotApplicable),
                };
                let (resumed, persistence) = match checkpoint {
                    Some(cp) if cp.current_index < state.len() => {
                        state.current_index = cp.current_index;
                        state.score = cp.score.min(cp.current_index);
                        (true, persistence)
                    }
                    Some(cp) => {
                        // Nothing left to resume; forget the stale checkpoint.
                        debug!(
                            index = cp.current_index,
                            total = state.len(),
                            "Discarding finished checkpoint"
                        );
                        let discarded = match self
                            .checkpoints
                            .delete(cp.user_id, scope.kind(), set_id)
                            .await
                        {
                            Ok(()) => Persistence::Saved,
                            Err(err) => Persistence::skipped("Checkpoint removal", err),
                        };
                        (false, persistence.and(discarded))
                    }
                    None => (false, persistence),
                };
                (state, resumed, persistence)
            }
        };

        info!(
            kind = %session.kind,
            set_id = scope.set_id().unwrap_or("-"),
            resumed,
            index = state.current_index,
            total = state.len(),
            "Session started"
        );
        let outcome = StartOutcome {
            resumed,
            index: state.current_index,
            total: state.len(),
            title: state.title.clone(),
            persistence,
        };
        session.phase = SessionPhase::InProgress(state);
        Ok(outcome)
    }

    /// Corrects a submission against the current item and records it.
    pub async fn record_answer(
        &self,
        session: &mut Session,
        user_input: &str,
    ) -> CoreResult<AnswerOutcome> {
        let learner = session.learner;
        let state = session.state_mut()?;
        let item = state
            .current_item()
            .cloned()
            .ok_or_else(|| CoreError::InvalidState("session has no current item".to_string()))?;
        let correction = check(user_input, &item.text)?;
        let index = state.current_index;

        if state.current_answered() {
            debug!(index, "Item already answered; correction not recorded");
            return Ok(AnswerOutcome {
                item,
                correction,
                recorded: false,
                score: state.score,
                average_accuracy: round1(state.average_accuracy()),
                index,
                total: state.len(),
                persistence: Persistence::NotApplicable,
            });
        }

        let passed = correction.passed();
        state.accuracy_history.push(correction.accuracy);
        state.per_item_correct.insert(index, passed);
        if passed {
            state.score += 1;
        }
        debug!(index, accuracy = correction.accuracy, passed, "Answer recorded");

        let score = state.score;
        let average_accuracy = round1(state.average_accuracy());
        let total = state.len();

        let persistence = match learner.user_id() {
            Some(user_id) => self.record_characters(user_id, &item, &correction).await,
            None => Persistence::NotApplicable,
        };

        Ok(AnswerOutcome {
            item,
            correction,
            recorded: true,
            score,
            average_accuracy,
            index,
            total,
            persistence,
        })
    }

    /// Moves to the next item, completing the session after the last one.
    pub async fn advance(&self, session: &mut Session) -> CoreResult<AdvanceOutcome> {
        let state = session.state_mut()?;
        let index = state.current_index;
        let total = state.len();

        if state.scope.kind() == SessionKind::Story
            && ((index + 1) % GROUP_SIZE == 0 || index + 1 == total)
        {
            let group = state.group_score(index);
            state.group_scores.push(group);
        }

        state.current_index += 1;
        if state.current_index < total {
            return Ok(AdvanceOutcome::Next {
                index: state.current_index,
                total,
                group_scores: state.group_scores.clone(),
            });
        }

        let state = match std::mem::replace(&mut session.phase, SessionPhase::NotStarted) {
            SessionPhase::InProgress(state) => state,
            other => {
                session.phase = other;
                return Err(CoreError::InvalidState("session is not in progress".to_string()));
            }
        };
        let summary = self.complete(session.learner, session.kind, state).await;
        session.phase = SessionPhase::Completed(summary.clone());
        Ok(AdvanceOutcome::Completed(summary))
    }

    /// Persists the resume point and clears the in-memory session.
    ///
    /// When the last item is already answered there is nothing to resume, so
    /// the session is completed as if the learner had pressed next.
    ///
    /// Fails with `StoreUnavailable` when the checkpoint cannot be written; the
    /// session is then left untouched.
    pub async fn save_for_later(&self, session: &mut Session) -> CoreResult<SaveOutcome> {
        let user_id = session.learner.user_id().ok_or_else(|| {
            CoreError::InvalidState("saving progress requires a signed-in learner".to_string())
        })?;
        let kind = session.kind;
        let state = session.state_mut()?;
        let set_id = state
            .scope
            .set_id()
            .ok_or_else(|| CoreError::InvalidState(format!("{} sessions cannot be saved", kind)))?
            .to_string();

        let index = state.resume_index();
        let score = state.score;
        if index >= state.len() {
            info!(%user_id, %kind, set_id = %set_id, "Last item answered; completing instead of saving");
            return match self.advance(session).await? {
                AdvanceOutcome::Completed(summary) => Ok(SaveOutcome::Completed(summary)),
                AdvanceOutcome::Next { .. } => Err(CoreError::InvalidState(
                    "session continued past its last item".to_string(),
                )),
            };
        }

        let checkpoint = self
            .checkpoints
            .save(user_id, kind, &set_id, index, score)
            .await?;
        info!(%user_id, %kind, set_id = %set_id, index, "Session saved for later");
        session.phase = SessionPhase::NotStarted;
        Ok(SaveOutcome::Saved(checkpoint))
    }

    /// Drops the session and its checkpoint. Valid in any state; `set_id`
    /// names the set to forget when no session is in progress.
    pub async fn restart(&self, session: &mut Session, set_id: Option<&str>) -> Persistence {
        let running = session
            .state()
            .and_then(|state| state.scope.set_id())
            .map(str::to_string);
        let target = running.or_else(|| set_id.map(str::to_string));

        let persistence = match (session.learner.user_id(), target) {
            (Some(user_id), Some(set_id)) if session.kind.is_resumable() => {
                match self.checkpoints.delete(user_id, session.kind, &set_id).await {
                    Ok(()) => Persistence::Saved,
                    Err(err) => Persistence::skipped("Checkpoint removal", err),
                }
            }
            _ => Persistence::NotApplicable,
        };

        info!(kind = %session.kind, "Session restarted");
        session.phase = SessionPhase::NotStarted;
        persistence
    }

    /// Answers every remaining conversation turn at once and completes the
    /// session. `inputs` maps item ids to submissions; missing ones count as
    /// empty.
    pub async fn submit_all(
        &self,
        session: &mut Session,
        inputs: &HashMap<String, String>,
    ) -> CoreResult<(Vec<AnswerOutcome>, CompletionSummary)> {
        if session.kind != SessionKind::Conversation {
            return Err(CoreError::InvalidState(
                "only conversations can be submitted at once".to_string(),
            ));
        }
        // Validate every submission before touching the session.
        {
            let state = session.state_mut()?;
            for item in &state.items[state.current_index..] {
                if let Some(input) = inputs.get(&item.id) {
                    crate::correction::validate_submission(input)?;
                }
            }
        }

        let mut answers = Vec::new();
        loop {
            let item_id = match session.state().and_then(|s| s.current_item()) {
                Some(item) => item.id.clone(),
                None => {
                    return Err(CoreError::InvalidState(
                        "conversation ended without completing".to_string(),
                    ))
                }
            };
            let input = inputs.get(&item_id).map(String::as_str).unwrap_or("");
            answers.push(self.record_answer(session, input).await?);
            if let AdvanceOutcome::Completed(summary) = self.advance(session).await? {
                return Ok((answers, summary));
            }
        }
    }

    async fn draw_practice_items(&self, level: Option<Level>) -> CoreResult<Vec<ReferenceItem>> {
        let mut ids = match level {
            Some(level) => self.content.list_items_by_level(level).await?,
            None => Vec::new(),
        };
        if ids.is_empty() {
            ids = self.content.list_all_items().await?;
        }
        if ids.is_empty() {
            return Err(CoreError::ItemNotFound("no practice sentences available".to_string()));
        }

        let mut rng = match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        rng.shuffle(&mut ids);
        ids.truncate(self.practice_size);

        let mut items = Vec::with_capacity(ids.len());
        for id in &ids {
            items.push(self.content.get_item(id).await?);
        }
        Ok(items)
    }

    async fn load_checkpoint(
        &self,
        user_id: UserId,
        kind: SessionKind,
        set_id: &str,
    ) -> (Option<Checkpoint>, Persistence) {
        match self.checkpoints.load(user_id, kind, set_id).await {
            Ok(checkpoint) => (checkpoint, Persistence::NotApplicable),
            Err(err) => (None, Persistence::skipped("Checkpoint lookup", err)),
        }
    }

    async fn record_characters(
        &self,
        user_id: UserId,
        item: &ReferenceItem,
        correction: &CorrectionResult,
    ) -> Persistence {
        let observations = match self.progress.observations(&item.text, correction).await {
            Ok(observations) => observations,
            Err(err) => return Persistence::skipped("Character progress update", err),
        };
        if observations.is_empty() {
            return Persistence::NotApplicable;
        }
        match self.progress.apply_observations(user_id, &observations).await {
            Ok(_) => Persistence::Saved,
            Err(err) => Persistence::skipped("Character progress update", err),
        }
    }

    /// Finishes the in-progress session: reports the day's work, forgets the
    /// checkpoint and clears the state.
    async fn complete(
        &self,
        learner: Learner,
        kind: SessionKind,
        state: SessionState,
    ) -> CompletionSummary {
        let set_id = state.scope.set_id().map(str::to_string);
        let average_accuracy = state.average_accuracy();
        let total = state.len();

        let (persistence, daily_stats) = match learner.user_id() {
            Some(user_id) => {
                let recorded = match self
                    .daily
                    .record(user_id, kind, average_accuracy, total, set_id.as_deref())
                    .await
                {
                    Ok(()) => Persistence::Saved,
                    Err(err) => Persistence::skipped("Daily summary update", err),
                };
                let cleared = match (&set_id, kind.is_resumable()) {
                    (Some(set_id), true) => match self.checkpoints.delete(user_id, kind, set_id).await {
                        Ok(()) => Persistence::Saved,
                        Err(err) => Persistence::skipped("Checkpoint removal", err),
                    },
                    _ => Persistence::NotApplicable,
                };
                let stats = match self.daily.streak_and_stats(user_id).await {
                    Ok(stats) => Some(stats),
                    Err(err) => {
                        warn!(error = %err, "Daily stats unavailable for summary");
                        None
                    }
                };
                (recorded.and(cleared), stats)
            }
            None => (Persistence::NotApplicable, None),
        };

        info!(
            %kind,
            score = state.score,
            total,
            average_accuracy,
            "Session completed"
        );

        CompletionSummary {
            kind,
            set_id,
            title: state.title,
            score: state.score,
            total,
            average_accuracy: round1(average_accuracy),
            accuracy_history: state.accuracy_history,
            group_scores: state.group_scores,
            daily_stats,
            persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, text: &str) -> ReferenceItem {
        ReferenceItem {
            id: id.to_string(),
            text: text.to_string(),
            level: Level(1),
            translation: None,
            pronunciation_hint: None,
        }
    }

    fn state_with(n: usize) -> SessionState {
        let items = (0..n).map(|i| item(&i.to_string(), "你好")).collect();
        SessionState::new(SessionScope::Story { story_id: "s".into() }, None, items)
    }

    #[test]
    fn group_score_scales_to_ten() {
        let mut state = state_with(7);
        for (i, ok) in [true, false, true, true, false, true, true].into_iter().enumerate() {
            state.per_item_correct.insert(i, ok);
        }
        assert_eq!(state.group_score(4), 6);
        // Trailing partial group of two, both correct.
        assert_eq!(state.group_score(6), 10);
    }

    #[test]
    fn resume_index_skips_answered_item() {
        let mut state = state_with(3);
        state.current_index = 1;
        assert_eq!(state.resume_index(), 1);
        state.per_item_correct.insert(1, false);
        assert_eq!(state.resume_index(), 2);
    }

    #[test]
    fn persistence_keeps_the_worst_outcome() {
        let skipped = Persistence::Skipped { reason: "down".into() };
        assert_eq!(Persistence::Saved.and(skipped.clone()), skipped);
        assert_eq!(Persistence::Saved.and(Persistence::NotApplicable), Persistence::Saved);
        assert_eq!(
            Persistence::NotApplicable.and(Persistence::NotApplicable),
            Persistence::NotApplicable
        );
    }

    #[test]
    fn average_of_empty_history_is_zero() {
        let state = state_with(2);
        assert_eq!(state.average_accuracy(), 0.0);
        assert!(state.previous_items().is_empty());
    }
}
