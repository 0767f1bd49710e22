use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use prep_core::model::{ExamMode, ExamSnapshot};
use storage::repository::{KeyValueStore, StorageError};

use crate::error::ExamServiceError;

/// Storage key of the single in-progress exam.
pub const EXAM_SNAPSHOT_KEY: &str = "radio_prep.exam_snapshot.v2";

/// Summary of a saved exam, shown before the user decides to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSessionInfo {
    pub mode: ExamMode,
    pub subject_filter: Option<String>,
    pub answered: usize,
    pub total: usize,
    pub remaining_seconds: u32,
    pub saved_at: DateTime<Utc>,
}

impl From<&ExamSnapshot> for SavedSessionInfo {
    fn from(snapshot: &ExamSnapshot) -> Self {
        Self {
            mode: snapshot.mode,
            subject_filter: snapshot.subject_filter.clone(),
            answered: snapshot.answered_count(),
            total: snapshot.questions.len(),
            remaining_seconds: snapshot.remaining_seconds,
            saved_at: snapshot.saved_at,
        }
    }
}

/// Reads and writes the in-progress exam under [`EXAM_SNAPSHOT_KEY`].
///
/// Unreadable, invalid or stale snapshots are deleted on load and reported as
/// absent; callers never see a corrupt snapshot.
#[derive(Clone)]
pub struct SnapshotPersistence {
    store: Arc<dyn KeyValueStore>,
    max_age: Option<Duration>,
}

impl SnapshotPersistence {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            max_age: None,
        }
    }

    /// Treat snapshots saved longer ago than `max_age` as expired. `None` keeps them forever.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Overwrite the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError` when encoding or writing fails.
    pub fn save(&self, snapshot: &ExamSnapshot) -> Result<(), ExamServiceError> {
        let raw = snapshot.to_json()?;
        self.store.set(EXAM_SNAPSHOT_KEY, &raw)?;
        tracing::debug!(
            questions = snapshot.questions.len(),
            answered = snapshot.answered_count(),
            remaining = snapshot.remaining_seconds,
            "saved exam snapshot"
        );
        Ok(())
    }

    /// Load the stored snapshot, purging it when it cannot be used.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` only when the store itself fails.
    pub fn load(&self, now: DateTime<Utc>) -> Result<Option<ExamSnapshot>, ExamServiceError> {
        let raw = match self.store.get(EXAM_SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(StorageError::Serialization(reason)) => {
                tracing::warn!(%reason, "discarding unreadable exam snapshot");
                self.clear()?;
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let snapshot = match ExamSnapshot::from_json(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "discarding corrupt exam snapshot");
                self.clear()?;
                return Ok(None);
            }
        };

        if self.max_age.is_some_and(|max_age| snapshot.is_stale(now, max_age)) {
            tracing::info!(saved_at = %snapshot.saved_at, "discarding expired exam snapshot");
            self.clear()?;
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    /// Summary of the stored snapshot without activating it.
    ///
    /// # Errors
    ///
    /// See [`SnapshotPersistence::load`].
    pub fn peek(&self, now: DateTime<Utc>) -> Result<Option<SavedSessionInfo>, ExamServiceError> {
        Ok(self.load(now)?.as_ref().map(SavedSessionInfo::from))
    }

    /// Delete the stored snapshot. Clearing an empty slot is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` if the store cannot be updated.
    pub fn clear(&self) -> Result<(), ExamServiceError> {
        self.store.delete(EXAM_SNAPSHOT_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{ExamSession, QuestionDraft};
    use prep_core::time::fixed_now;
    use storage::repository::InMemoryKeyValueStore;

    fn active_snapshot(saved_at: DateTime<Utc>) -> ExamSnapshot {
        let mut session = ExamSession::new();
        let generation = session.begin(ExamMode::Random, None).unwrap();
        let question = QuestionDraft {
            id: Some("q1".into()),
            subject: "Português".into(),
            text: "Crase?".into(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: 0,
            explanation: "Regra.".into(),
        }
        .validate()
        .unwrap();
        session.activate(generation, vec![question], saved_at).unwrap();
        session.answer_current(2).unwrap();
        session.snapshot(saved_at).unwrap()
    }

    fn persistence() -> (Arc<InMemoryKeyValueStore>, SnapshotPersistence) {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let persistence = SnapshotPersistence::new(store.clone())
            .with_max_age(Some(Duration::days(7)));
        (store, persistence)
    }

    #[test]
    fn saved_snapshot_loads_back() {
        let (_, persistence) = persistence();
        let snapshot = active_snapshot(fixed_now());
        persistence.save(&snapshot).unwrap();

        assert_eq!(persistence.load(fixed_now()).unwrap(), Some(snapshot));
        let info = persistence.peek(fixed_now()).unwrap().unwrap();
        assert_eq!(info.answered, 1);
        assert_eq!(info.total, 1);
        assert_eq!(info.mode, ExamMode::Random);
    }

    #[test]
    fn missing_snapshot_is_none() {
        let (_, persistence) = persistence();
        assert_eq!(persistence.load(fixed_now()).unwrap(), None);
    }

    #[test]
    fn corrupt_snapshot_is_purged() {
        let (store, persistence) = persistence();
        store.set(EXAM_SNAPSHOT_KEY, "{not json").unwrap();

        assert_eq!(persistence.load(fixed_now()).unwrap(), None);
        assert_eq!(store.get(EXAM_SNAPSHOT_KEY).unwrap(), None);
    }

    #[test]
    fn invalid_snapshot_is_purged() {
        let (store, persistence) = persistence();
        let mut snapshot = active_snapshot(fixed_now());
        snapshot.current_index = 9;
        store
            .set(EXAM_SNAPSHOT_KEY, &serde_json::to_string(&snapshot).unwrap())
            .unwrap();

        assert_eq!(persistence.load(fixed_now()).unwrap(), None);
        assert_eq!(store.get(EXAM_SNAPSHOT_KEY).unwrap(), None);
    }

    #[test]
    fn stale_snapshot_is_purged() {
        let (store, persistence) = persistence();
        persistence.save(&active_snapshot(fixed_now())).unwrap();

        let later = fixed_now() + Duration::days(8);
        assert_eq!(persistence.load(later).unwrap(), None);
        assert_eq!(store.get(EXAM_SNAPSHOT_KEY).unwrap(), None);
    }

    #[test]
    fn no_max_age_keeps_old_snapshots() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let persistence = SnapshotPersistence::new(store);
        persistence.save(&active_snapshot(fixed_now())).unwrap();

        let later = fixed_now() + Duration::days(365);
        assert!(persistence.load(later).unwrap().is_some());
    }

    #[test]
    fn clear_is_idempotent() {
        let (store, persistence) = persistence();
        persistence.save(&active_snapshot(fixed_now())).unwrap();
        persistence.clear().unwrap();
        persistence.clear().unwrap();
        assert_eq!(store.get(EXAM_SNAPSHOT_KEY).unwrap(), None);
    }
}
