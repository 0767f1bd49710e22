use std::sync::Arc;

use storage::repository::{
    ExamResultRecord, ExamResultRepository, ExamResultRow, StorageError, SubjectAccuracy,
};

/// Subjects need at least this many answered questions before they count as weak.
pub const MIN_ATTEMPTS_FOR_GAP: u32 = 3;
/// Accuracy (percent) below which a subject is a gap.
pub const GAP_THRESHOLD_PERCENT: f64 = 70.0;
/// How many weak subjects gap-focus mode passes to the provider.
pub const MAX_GAP_SUBJECTS: usize = 3;

/// Finished-exam history and the weak subjects derived from it.
#[derive(Clone)]
pub struct HistoryService {
    results: Arc<dyn ExamResultRepository>,
}

impl HistoryService {
    #[must_use]
    pub fn new(results: Arc<dyn ExamResultRepository>) -> Self {
        Self { results }
    }

    /// Store a finished exam.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the result cannot be written.
    pub async fn record(&self, record: &ExamResultRecord) -> Result<i64, StorageError> {
        let id = self.results.append_result(record).await?;
        tracing::info!(id, correct = record.correct, total = record.total, "recorded exam result");
        Ok(id)
    }

    /// Most recent results first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if results cannot be read.
    pub async fn recent(&self, limit: u32) -> Result<Vec<ExamResultRow>, StorageError> {
        self.results.list_results(limit).await
    }

    /// Per-subject accuracy across all stored results.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if results cannot be read.
    pub async fn accuracy(&self) -> Result<Vec<SubjectAccuracy>, StorageError> {
        self.results.subject_accuracy().await
    }

    /// Subjects with the lowest accuracy, worst first.
    ///
    /// Only subjects with enough attempts and an accuracy below
    /// [`GAP_THRESHOLD_PERCENT`] are returned, at most [`MAX_GAP_SUBJECTS`].
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if results cannot be read.
    pub async fn weak_subjects(&self) -> Result<Vec<String>, StorageError> {
        Ok(pick_weak_subjects(self.accuracy().await?))
    }
}

fn pick_weak_subjects(accuracy: Vec<SubjectAccuracy>) -> Vec<String> {
    let mut weak: Vec<SubjectAccuracy> = accuracy
        .into_iter()
        .filter(|a| a.total >= MIN_ATTEMPTS_FOR_GAP && a.percentage() < GAP_THRESHOLD_PERCENT)
        .collect();
    weak.sort_by(|a, b| {
        a.percentage()
            .total_cmp(&b.percentage())
            .then_with(|| b.total.cmp(&a.total))
    });
    weak.into_iter()
        .take(MAX_GAP_SUBJECTS)
        .map(|a| a.subject)
        .collect()
}
