use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Question-selection policy for a practice exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamMode {
    /// Every question from one subject.
    SingleSubject,
    /// Two complementary subjects mixed.
    PairedSubjects,
    /// Arbitrary mix of general and specific topics.
    Random,
    /// Official-style exam following the published topic weighting.
    FullMock,
    /// Biased toward historically weak topics.
    GapFocus,
}

impl ExamMode {
    pub const ALL: [ExamMode; 5] = [
        ExamMode::SingleSubject,
        ExamMode::PairedSubjects,
        ExamMode::Random,
        ExamMode::FullMock,
        ExamMode::GapFocus,
    ];

    /// Stable key used in snapshots, history rows and CLI flags.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            ExamMode::SingleSubject => "single_subject",
            ExamMode::PairedSubjects => "paired_subjects",
            ExamMode::Random => "random",
            ExamMode::FullMock => "full_mock",
            ExamMode::GapFocus => "gap_focus",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ExamMode::SingleSubject => "Matéria Única",
            ExamMode::PairedSubjects => "Combinação ZBS",
            ExamMode::Random => "IA: Aleatório",
            ExamMode::FullMock => "Simulado Completo",
            ExamMode::GapFocus => "Correção de Gaps",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            ExamMode::SingleSubject => "Foque em uma disciplina específica.",
            ExamMode::PairedSubjects => "Duas matérias complementares.",
            ExamMode::Random => "Mix surpresa de questões.",
            ExamMode::FullMock => "Questões estilo oficial, com carregamento extra em segundo plano.",
            ExamMode::GapFocus => "Foco nos seus pontos fracos.",
        }
    }

    #[must_use]
    pub fn requires_subject(self) -> bool {
        matches!(self, ExamMode::SingleSubject)
    }

    /// Whether a second batch is fetched in the background after activation.
    #[must_use]
    pub fn prefetches(self) -> bool {
        matches!(self, ExamMode::FullMock)
    }

    /// Normalize a subject filter for this mode.
    ///
    /// # Errors
    ///
    /// Returns `ModeError::SubjectRequired` when the mode needs a subject and none
    /// (or only whitespace) was given.
    pub fn normalize_subject(self, subject: Option<&str>) -> Result<Option<String>, ModeError> {
        let subject = subject
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        match (self.requires_subject(), subject) {
            (true, None) => Err(ModeError::SubjectRequired { mode: self }),
            (true, subject) => Ok(subject),
            (false, _) => Ok(None),
        }
    }
}

impl fmt::Display for ExamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ExamMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ExamMode::ALL
            .into_iter()
            .find(|mode| mode.key() == normalized)
            .ok_or_else(|| ModeError::Unknown(s.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModeError {
    #[error("unknown exam mode: {0}")]
    Unknown(String),
    #[error("mode {mode} requires a subject")]
    SubjectRequired { mode: ExamMode },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_roundtrip_through_from_str() {
        for mode in ExamMode::ALL {
            assert_eq!(mode.key().parse::<ExamMode>().unwrap(), mode);
        }
        assert_eq!("full-mock".parse::<ExamMode>().unwrap(), ExamMode::FullMock);
        assert!("marathon".parse::<ExamMode>().is_err());
    }

    #[test]
    fn single_subject_requires_filter() {
        let err = ExamMode::SingleSubject.normalize_subject(Some("  ")).unwrap_err();
        assert_eq!(
            err,
            ModeError::SubjectRequired {
                mode: ExamMode::SingleSubject
            }
        );
        assert_eq!(
            ExamMode::SingleSubject
                .normalize_subject(Some(" Anatomia Radiológica "))
                .unwrap()
                .as_deref(),
            Some("Anatomia Radiológica")
        );
    }

    #[test]
    fn other_modes_drop_subject() {
        assert_eq!(
            ExamMode::Random.normalize_subject(Some("Português")).unwrap(),
            None
        );
    }

    #[test]
    fn only_full_mock_prefetches() {
        let prefetching: Vec<_> = ExamMode::ALL.into_iter().filter(|m| m.prefetches()).collect();
        assert_eq!(prefetching, vec![ExamMode::FullMock]);
    }
}
