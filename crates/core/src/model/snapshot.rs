use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::mode::{ExamMode, ModeError};
use crate::model::question::{OPTION_COUNT, Question};

/// Current snapshot layout. Older layouts are treated as corrupt.
pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("snapshot could not be parsed: {0}")]
    Parse(String),

    #[error("snapshot could not be encoded: {0}")]
    Encode(String),

    #[error("unsupported snapshot version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("current index {index} out of range for {len} questions")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("answer recorded for missing question {index}")]
    AnswerOutOfRange { index: usize },

    #[error("answer {choice} for question {index} is not a valid option")]
    ChoiceOutOfRange { index: usize, choice: usize },

    #[error("duplicate question id {id}")]
    DuplicateQuestionId { id: String },

    #[error(transparent)]
    Mode(#[from] ModeError),
}

/// Serialized state of an active exam, written after every mutation and read on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSnapshot {
    pub version: u32,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub answers: BTreeMap<usize, usize>,
    pub remaining_seconds: u32,
    pub mode: ExamMode,
    pub subject_filter: Option<String>,
    pub started_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}

impl ExamSnapshot {
    /// Parse and validate a stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Parse` for malformed JSON (including malformed
    /// questions) and the other variants when the content breaks session invariants.
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self =
            serde_json::from_str(raw).map_err(|e| SnapshotError::Parse(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Encode the snapshot for storage.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Encode` if serialization fails.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Check that the snapshot describes a session the state machine could be in.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
            });
        }

        let len = self.questions.len();
        if self.current_index >= len.max(1) {
            return Err(SnapshotError::IndexOutOfRange {
                index: self.current_index,
                len,
            });
        }

        for (&index, &choice) in &self.answers {
            if index >= len {
                return Err(SnapshotError::AnswerOutOfRange { index });
            }
            if choice >= OPTION_COUNT {
                return Err(SnapshotError::ChoiceOutOfRange { index, choice });
            }
        }

        let mut seen = std::collections::HashSet::with_capacity(len);
        for question in &self.questions {
            if !seen.insert(question.id().as_str()) {
                return Err(SnapshotError::DuplicateQuestionId {
                    id: question.id().to_string(),
                });
            }
        }

        if self.mode.requires_subject() {
            self.mode.normalize_subject(self.subject_filter.as_deref())?;
        }
        Ok(())
    }

    /// Whether the snapshot was saved longer ago than `max_age`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.saved_at) > max_age
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::QuestionDraft;
    use crate::time::fixed_now;

    fn question(id: &str) -> Question {
        QuestionDraft {
            id: Some(id.into()),
            subject: "Proteção Radiológica".into(),
            text: "Princípio ALARA significa?".into(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: 3,
            explanation: "As low as reasonably achievable.".into(),
        }
        .validate()
        .unwrap()
    }

    fn snapshot() -> ExamSnapshot {
        ExamSnapshot {
            version: SNAPSHOT_VERSION,
            questions: vec![question("a"), question("b"), question("c")],
            current_index: 1,
            answers: BTreeMap::from([(0, 3), (1, 0)]),
            remaining_seconds: 12_000,
            mode: ExamMode::SingleSubject,
            subject_filter: Some("Proteção Radiológica".into()),
            started_at: fixed_now(),
            saved_at: fixed_now() + Duration::minutes(40),
        }
    }

    #[test]
    fn json_roundtrip_keeps_session_fields() {
        let original = snapshot();
        let raw = original.to_json().unwrap();
        let restored = ExamSnapshot::from_json(&raw).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            ExamSnapshot::from_json("{not json"),
            Err(SnapshotError::Parse(_))
        ));
    }

    #[test]
    fn index_past_end_is_rejected() {
        let mut snap = snapshot();
        snap.current_index = 3;
        assert_eq!(
            snap.validate(),
            Err(SnapshotError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn empty_question_list_allows_index_zero() {
        let mut snap = snapshot();
        snap.questions.clear();
        snap.answers.clear();
        snap.current_index = 0;
        assert!(snap.validate().is_ok());
    }

    #[test]
    fn answers_must_point_at_questions_and_options() {
        let mut snap = snapshot();
        snap.answers.insert(5, 0);
        assert_eq!(snap.validate(), Err(SnapshotError::AnswerOutOfRange { index: 5 }));

        let mut snap = snapshot();
        snap.answers.insert(2, 4);
        assert_eq!(
            snap.validate(),
            Err(SnapshotError::ChoiceOutOfRange { index: 2, choice: 4 })
        );
    }

    #[test]
    fn single_subject_snapshot_needs_subject() {
        let mut snap = snapshot();
        snap.subject_filter = None;
        assert!(matches!(snap.validate(), Err(SnapshotError::Mode(_))));
    }

    #[test]
    fn old_versions_are_rejected() {
        let mut snap = snapshot();
        snap.version = 1;
        assert_eq!(
            snap.validate(),
            Err(SnapshotError::UnsupportedVersion { found: 1 })
        );
    }

    #[test]
    fn staleness_uses_saved_at() {
        let snap = snapshot();
        let saved = snap.saved_at;
        assert!(!snap.is_stale(saved + Duration::hours(1), Duration::days(7)));
        assert!(snap.is_stale(saved + Duration::days(8), Duration::days(7)));
    }
}
