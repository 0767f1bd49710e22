use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prep_core::model::{ExamMode, ExamScore, SubjectScore};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

//
// ─── KEY-VALUE STORE ───────────────────────────────────────────────────────────
//

/// Durable, device-local key-value store.
///
/// Calls are synchronous; adapters must not go over the network.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be updated.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Simple in-memory key-value store for tests.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

//
// ─── EXAM RESULTS ──────────────────────────────────────────────────────────────
//

/// Persisted shape of a finished exam.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamResultRecord {
    pub mode: ExamMode,
    pub subject_filter: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub correct: u32,
    pub answered: u32,
    pub total: u32,
    pub remaining_seconds: u32,
    pub subjects: Vec<SubjectScore>,
}

impl ExamResultRecord {
    #[must_use]
    pub fn from_score(
        mode: ExamMode,
        subject_filter: Option<String>,
        started_at: DateTime<Utc>,
        remaining_seconds: u32,
        score: &ExamScore,
    ) -> Self {
        Self {
            mode,
            subject_filter,
            started_at,
            finished_at: score.finished_at(),
            correct: score.correct(),
            answered: score.answered(),
            total: score.total(),
            remaining_seconds,
            subjects: score.by_subject().to_vec(),
        }
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * f64::from(self.correct) / f64::from(self.total)
    }
}

/// A stored result with its row id.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamResultRow {
    pub id: i64,
    pub record: ExamResultRecord,
}

/// Accuracy for one subject across every stored result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAccuracy {
    pub subject: String,
    pub correct: u32,
    pub total: u32,
}

impl SubjectAccuracy {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * f64::from(self.correct) / f64::from(self.total)
    }
}

/// Repository contract for finished exams.
#[async_trait]
pub trait ExamResultRepository: Send + Sync {
    /// Persist a finished exam and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the result cannot be stored.
    async fn append_result(&self, record: &ExamResultRecord) -> Result<i64, StorageError>;

    /// Fetch a result by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, id: i64) -> Result<ExamResultRecord, StorageError>;

    /// Most recent results first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if results cannot be read.
    async fn list_results(&self, limit: u32) -> Result<Vec<ExamResultRow>, StorageError>;

    /// Per-subject totals over all stored results, ordered by subject.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if results cannot be read.
    async fn subject_accuracy(&self) -> Result<Vec<SubjectAccuracy>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    results: Arc<Mutex<Vec<ExamResultRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExamResultRepository for InMemoryRepository {
    async fn append_result(&self, record: &ExamResultRecord) -> Result<i64, StorageError> {
        let mut guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.push(record.clone());
        i64::try_from(guard.len()).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn get_result(&self, id: i64) -> Result<ExamResultRecord, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|idx| guard.get(idx))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_results(&self, limit: u32) -> Result<Vec<ExamResultRow>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut rows = Vec::with_capacity(limit.min(guard.len()));
        for (idx, record) in guard.iter().enumerate().rev().take(limit) {
            let id = i64::try_from(idx + 1)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            rows.push(ExamResultRow {
                id,
                record: record.clone(),
            });
        }
        Ok(rows)
    }

    async fn subject_accuracy(&self) -> Result<Vec<SubjectAccuracy>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut totals: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
        for subject in guard.iter().flat_map(|r| r.subjects.iter()) {
            let entry = totals.entry(subject.subject.as_str()).or_insert((0, 0));
            entry.0 = entry.0.saturating_add(subject.correct);
            entry.1 = entry.1.saturating_add(subject.total);
        }
        Ok(totals
            .into_iter()
            .map(|(subject, (correct, total))| SubjectAccuracy {
                subject: subject.to_string(),
                correct,
                total,
            })
            .collect())
    }
}

/// Aggregates the stores used by the services layer.
#[derive(Clone)]
pub struct Storage {
    pub snapshots: Arc<dyn KeyValueStore>,
    pub results: Arc<dyn ExamResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let snapshots: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let results: Arc<dyn ExamResultRepository> = Arc::new(InMemoryRepository::new());
        Self { snapshots, results }
    }
}
