use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

/// Every question carries exactly this many options, shown as A–D.
pub const OPTION_COUNT: usize = 4;

//
// ─── QUESTION TYPES ────────────────────────────────────────────────────────────
//

/// Unvalidated question as received from a provider or a stored snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(alias = "correct_index")]
    pub correct_index: i64,
    #[serde(default)]
    pub explanation: String,
}

impl QuestionDraft {
    /// Validate the draft into a `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when the id or prompt is blank, the option count is
    /// not four, an option is blank, or the correct index does not point at an option.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(QuestionError::MissingId)?;

        let text = self.text.trim().to_string();
        if text.is_empty() {
            return Err(QuestionError::EmptyText);
        }

        if self.options.len() != OPTION_COUNT {
            return Err(QuestionError::OptionCount {
                len: self.options.len(),
            });
        }
        if let Some(index) = self.options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::EmptyOption { index });
        }

        let correct_index = usize::try_from(self.correct_index)
            .ok()
            .filter(|idx| *idx < OPTION_COUNT)
            .ok_or(QuestionError::CorrectIndexOutOfRange {
                index: self.correct_index,
            })?;

        Ok(Question {
            id: QuestionId::new(id),
            subject: self.subject.trim().to_string(),
            text,
            options: self.options,
            correct_index,
            explanation: self.explanation.trim().to_string(),
        })
    }
}

/// One exam item. Option order is fixed at ingestion and never reshuffled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    subject: String,
    text: String,
    options: Vec<String>,
    correct_index: usize,
    explanation: String,
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl Question {
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_index(&self) -> usize {
        self.correct_index
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    #[must_use]
    pub fn is_correct(&self, choice: usize) -> bool {
        self.correct_index == choice
    }

    /// Replace the id, keeping everything else.
    ///
    /// Used when an appended batch reuses ids already present in the session.
    #[must_use]
    pub fn with_id(mut self, id: QuestionId) -> Self {
        self.id = id;
        self
    }
}

/// Display letter for an option index (`0` → `A`).
#[must_use]
pub fn option_letter(index: usize) -> Option<char> {
    if index < OPTION_COUNT {
        u8::try_from(index).ok().map(|i| char::from(b'A' + i))
    } else {
        None
    }
}

/// Parse a display letter back into an option index (`b` → `1`).
#[must_use]
pub fn option_from_letter(letter: char) -> Option<usize> {
    let upper = letter.to_ascii_uppercase();
    if ('A'..='D').contains(&upper) {
        Some(upper as usize - 'A' as usize)
    } else {
        None
    }
}

//
// ─── QUESTION VALIDATION ERRORS ────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question id is missing")]
    MissingId,
    #[error("question text is empty")]
    EmptyText,
    #[error("expected 4 options, found {len}")]
    OptionCount { len: usize },
    #[error("option {index} is empty")]
    EmptyOption { index: usize },
    #[error("correct index {index} is out of range")]
    CorrectIndexOutOfRange { index: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> QuestionDraft {
        QuestionDraft {
            id: Some("q1".into()),
            subject: "Física Radiológica".into(),
            text: "Qual unidade mede dose absorvida?".into(),
            options: vec!["Gray".into(), "Sievert".into(), "Becquerel".into(), "Roentgen".into()],
            correct_index: 0,
            explanation: "Gray (Gy) = J/kg.".into(),
        }
    }

    #[test]
    fn valid_draft_builds_question() {
        let q = draft().validate().unwrap();
        assert_eq!(q.id().as_str(), "q1");
        assert_eq!(q.options().len(), OPTION_COUNT);
        assert!(q.is_correct(0));
        assert!(!q.is_correct(1));
    }

    #[test]
    fn wrong_option_count_is_rejected() {
        let mut d = draft();
        d.options.pop();
        assert_eq!(d.validate(), Err(QuestionError::OptionCount { len: 3 }));
    }

    #[test]
    fn correct_index_must_point_at_option() {
        let mut d = draft();
        d.correct_index = 4;
        assert!(matches!(
            d.validate(),
            Err(QuestionError::CorrectIndexOutOfRange { index: 4 })
        ));

        let mut d = draft();
        d.correct_index = -1;
        assert!(d.validate().is_err());
    }

    #[test]
    fn blank_id_and_text_are_rejected() {
        let mut d = draft();
        d.id = Some("  ".into());
        assert_eq!(d.validate(), Err(QuestionError::MissingId));

        let mut d = draft();
        d.text = String::new();
        assert_eq!(d.validate(), Err(QuestionError::EmptyText));
    }

    #[test]
    fn deserializing_provider_json_validates() {
        let json = r#"{"id":"7","subject":"Anatomia","text":"T","options":["a","b","c","d"],"correctIndex":2,"explanation":"e"}"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.correct_index(), 2);

        let bad = r#"{"id":"7","subject":"Anatomia","text":"T","options":["a","b"],"correctIndex":0,"explanation":"e"}"#;
        assert!(serde_json::from_str::<Question>(bad).is_err());
    }

    #[test]
    fn letters_map_to_indices() {
        assert_eq!(option_letter(0), Some('A'));
        assert_eq!(option_letter(3), Some('D'));
        assert_eq!(option_letter(4), None);
        assert_eq!(option_from_letter('c'), Some(2));
        assert_eq!(option_from_letter('e'), None);
    }
}
