//! crates/dictation_core/src/progress.rs
//!
//! Per-character mastery tracking on top of a `ProgressStore`.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::correction::CorrectionResult;
use crate::domain::{CharacterObservation, CharacterProgress, LevelSummary, UserId};
use crate::ports::{ContentStore, PortResult, ProgressStore};
use crate::text::is_ignorable;

/// Applies grade observations for learners.
///
/// Updates for the same learner are serialised inside the process so two
/// submissions racing on the same characters cannot read the same old grade;
/// each batch is then written with one atomic upsert. A learner's lock only
/// stays in the map while a batch for them is in flight.
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    content: Arc<dyn ContentStore>,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>, content: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            content,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// One observation per tracked character of the reference. Characters
    /// outside the character table are ignored.
    pub async fn observations(
        &self,
        reference: &str,
        correction: &CorrectionResult,
    ) -> PortResult<Vec<CharacterObservation>> {
        let mut observations = Vec::new();
        for (character, correct) in net_results(reference, correction) {
            if let Some(level) = self.content.character_level(character).await? {
                observations.push(CharacterObservation {
                    character,
                    level,
                    correct,
                });
            }
        }
        Ok(observations)
    }

    /// Moves every observed character one step along its grade ladder and
    /// returns the new rows.
    pub async fn apply_observations(
        &self,
        user_id: UserId,
        observations: &[CharacterObservation],
    ) -> PortResult<Vec<CharacterProgress>> {
        if observations.is_empty() {
            return Ok(Vec::new());
        }

        let user_lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(user_id).or_default().clone()
        };
        let result = {
            let _guard = user_lock.lock().await;
            self.step_grades(user_id, observations).await
        };
        drop(user_lock);
        self.release_lock(user_id).await;
        result
    }

    async fn step_grades(
        &self,
        user_id: UserId,
        observations: &[CharacterObservation],
    ) -> PortResult<Vec<CharacterProgress>> {
        let characters: Vec<char> = observations.iter().map(|o| o.character).collect();
        let current: HashMap<char, CharacterProgress> = self
            .store
            .grades(user_id, &characters)
            .await?
            .into_iter()
            .map(|row| (row.character, row))
            .collect();

        let rows: Vec<CharacterProgress> = observations
            .iter()
            .map(|obs| {
                let grade = current
                    .get(&obs.character)
                    .map(|row| row.grade)
                    .unwrap_or_default();
                CharacterProgress {
                    character: obs.character,
                    level: obs.level,
                    grade: grade.step(obs.correct),
                }
            })
            .collect();

        self.store.batch_upsert(user_id, &rows).await?;
        debug!(%user_id, characters = rows.len(), "Character grades updated");
        Ok(rows)
    }

    /// Forgets the learner's lock once no other batch holds or waits on it.
    async fn release_lock(&self, user_id: UserId) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(&user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&user_id);
        }
    }

    /// Known/learning/failed/unseen counts for every level of the character table.
    pub async fn summary_by_level(&self, user_id: UserId) -> PortResult<Vec<LevelSummary>> {
        let totals = self.content.character_totals_by_level().await?;
        let counts: HashMap<_, _> = self
            .store
            .summary_by_level(user_id)
            .await?
            .into_iter()
            .map(|c| (c.level, c))
            .collect();

        Ok(totals
            .into_iter()
            .map(|(level, total)| {
                let (known, learning, failed) = counts
                    .get(&level)
                    .map(|c| (c.known, c.learning, c.failed))
                    .unwrap_or((0, 0, 0));
                LevelSummary {
                    level,
                    known,
                    learning,
                    failed,
                    unseen: total.saturating_sub(known + learning + failed),
                    total,
                }
            })
            .collect())
    }
}

/// Distinct characters of the reference in first-seen order, each paired with
/// whether any of its occurrences was matched.
pub fn net_results(reference: &str, correction: &CorrectionResult) -> Vec<(char, bool)> {
    let matched: Vec<bool> = {
        let mut flags = vec![false; reference.chars().count()];
        for &idx in &correction.correct_codepoints {
            if let Some(flag) = flags.get_mut(idx) {
                *flag = true;
            }
        }
        flags
    };

    let mut order: Vec<(char, bool)> = Vec::new();
    let mut seen: HashMap<char, usize> = HashMap::new();
    for (idx, ch) in reference.chars().enumerate() {
        if is_ignorable(ch) {
            continue;
        }
        match seen.get(&ch) {
            Some(&slot) => order[slot].1 |= matched[idx],
            None => {
                seen.insert(ch, order.len());
                order.push((ch, matched[idx]));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::render;
    use crate::domain::{Grade, Level};
    use crate::memory::{MemoryContentStore, MemoryProgressStore};
    use uuid::Uuid;

    fn tracker() -> (ProgressTracker, Arc<MemoryProgressStore>) {
        let content = MemoryContentStore::new()
            .with_characters([('你', Level(1)), ('好', Level(1)), ('皇', Level(4)), ('帝', Level(4))]);
        let store = Arc::new(MemoryProgressStore::default());
        (ProgressTracker::new(store.clone(), Arc::new(content)), store)
    }

    fn obs(character: char, correct: bool) -> CharacterObservation {
        CharacterObservation {
            character,
            level: Level(1),
            correct,
        }
    }

    #[test]
    fn repeated_characters_are_observed_once() {
        let correction = render("好你", "你好你好");
        let results = net_results("你好你好", &correction);
        assert_eq!(results, vec![('你', true), ('好', true)]);

        let correction = render("", "你好，你");
        assert_eq!(net_results("你好，你", &correction), vec![('你', false), ('好', false)]);
    }

    #[tokio::test]
    async fn untracked_characters_are_skipped() {
        let (tracker, _) = tracker();
        let correction = render("皇狗", "皇帝们");
        let observations = tracker.observations("皇帝们", &correction).await.unwrap();
        assert_eq!(observations.len(), 2);
        assert!(observations[0].correct);
        assert!(!observations[1].correct);
        assert_eq!(observations[1].level, Level(4));
    }

    #[tokio::test]
    async fn first_observation_starts_from_failed() {
        let (tracker, store) = tracker();
        let user = Uuid::new_v4();
        let rows = tracker
            .apply_observations(user, &[obs('你', true), obs('好', false)])
            .await
            .unwrap();
        assert_eq!(rows[0].grade, Grade::new(0));
        assert_eq!(rows[1].grade, Grade::FAILED);
        assert_eq!(store.grade_of(user, '你'), Some(Grade::new(0)));
    }

    #[tokio::test]
    async fn grades_saturate() {
        let (tracker, store) = tracker();
        let user = Uuid::new_v4();
        for _ in 0..8 {
            tracker.apply_observations(user, &[obs('你', true)]).await.unwrap();
        }
        assert_eq!(store.grade_of(user, '你'), Some(Grade::KNOWN));
        for _ in 0..8 {
            tracker.apply_observations(user, &[obs('你', false)]).await.unwrap();
        }
        assert_eq!(store.grade_of(user, '你'), Some(Grade::FAILED));
    }

    #[tokio::test]
    async fn concurrent_batches_do_not_lose_updates() {
        let (tracker, store) = tracker();
        let tracker = Arc::new(tracker);
        let user = Uuid::new_v4();
        // Start from grade 0 so three increments land exactly on KNOWN.
        tracker.apply_observations(user, &[obs('好', true)]).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.apply_observations(user, &[obs('好', true)]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.grade_of(user, '好'), Some(Grade::KNOWN));
        assert!(tracker.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn learner_locks_are_not_kept_after_a_batch() {
        let (tracker, store) = tracker();
        for _ in 0..50 {
            tracker
                .apply_observations(Uuid::new_v4(), &[obs('你', true)])
                .await
                .unwrap();
        }
        assert!(tracker.locks.lock().await.is_empty());

        let user = Uuid::new_v4();
        store.set_unavailable(true);
        assert!(tracker.apply_observations(user, &[obs('你', true)]).await.is_err());
        assert!(tracker.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn summary_counts_unseen_characters() {
        let (tracker, _) = tracker();
        let user = Uuid::new_v4();
        for _ in 0..4 {
            tracker.apply_observations(user, &[obs('你', true)]).await.unwrap();
        }
        tracker.apply_observations(user, &[obs('好', false)]).await.unwrap();

        let summary = tracker.summary_by_level(user).await.unwrap();
        assert_eq!(summary.len(), 2);
        let hsk1 = &summary[0];
        assert_eq!(hsk1.level, Level(1));
        assert_eq!((hsk1.known, hsk1.learning, hsk1.failed, hsk1.unseen), (1, 0, 1, 0));
        let hsk4 = &summary[1];
        assert_eq!((hsk4.unseen, hsk4.total), (2, 2));
    }
}
