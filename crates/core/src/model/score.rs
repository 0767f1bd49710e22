use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::question::Question;

/// Correct/total tally for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectScore {
    pub subject: String,
    pub correct: u32,
    pub total: u32,
}

impl SubjectScore {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        percentage(self.correct, self.total)
    }
}

/// Aggregate result of a finished exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamScore {
    correct: u32,
    answered: u32,
    total: u32,
    percentage: f64,
    by_subject: Vec<SubjectScore>,
    finished_at: DateTime<Utc>,
}

impl ExamScore {
    /// Score `answers` against `questions`.
    ///
    /// Unanswered questions count toward the total but never as correct. Answers
    /// pointing past the end of `questions` are ignored. An empty question list
    /// scores 0%.
    #[must_use]
    pub fn compute(
        questions: &[Question],
        answers: &BTreeMap<usize, usize>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let mut correct = 0_u32;
        let mut answered = 0_u32;
        let mut by_subject: BTreeMap<&str, (u32, u32)> = BTreeMap::new();

        for (idx, question) in questions.iter().enumerate() {
            let entry = by_subject.entry(question.subject()).or_insert((0, 0));
            entry.1 = entry.1.saturating_add(1);

            let Some(choice) = answers.get(&idx) else {
                continue;
            };
            answered = answered.saturating_add(1);
            if question.is_correct(*choice) {
                correct = correct.saturating_add(1);
                entry.0 = entry.0.saturating_add(1);
            }
        }

        let total = u32::try_from(questions.len()).unwrap_or(u32::MAX);
        Self {
            correct,
            answered,
            total,
            percentage: percentage(correct, total),
            by_subject: by_subject
                .into_iter()
                .map(|(subject, (correct, total))| SubjectScore {
                    subject: subject.to_string(),
                    correct,
                    total,
                })
                .collect(),
            finished_at,
        }
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn answered(&self) -> u32 {
        self.answered
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    /// Percentage rounded to the nearest whole number, as shown on the result screen.
    #[must_use]
    pub fn rounded_percentage(&self) -> u32 {
        // percentage is always within 0..=100
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = self.percentage.round() as u32;
        rounded
    }

    #[must_use]
    pub fn by_subject(&self) -> &[SubjectScore] {
        &self.by_subject
    }

    #[must_use]
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }
}

fn percentage(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * f64::from(correct) / f64::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::QuestionDraft;
    use crate::time::fixed_now;

    fn question(id: usize, subject: &str, correct: i64) -> Question {
        QuestionDraft {
            id: Some(format!("q{id}")),
            subject: subject.into(),
            text: format!("Question {id}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: correct,
            explanation: String::new(),
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn half_correct_scores_fifty() {
        let questions: Vec<_> = (0..10).map(|i| question(i, "Português", 1)).collect();
        let mut answers = BTreeMap::new();
        for idx in 0..5 {
            answers.insert(idx, 1);
        }
        for idx in 5..10 {
            answers.insert(idx, 0);
        }

        let score = ExamScore::compute(&questions, &answers, fixed_now());
        assert_eq!(score.correct(), 5);
        assert_eq!(score.answered(), 10);
        assert!((score.percentage() - 50.0).abs() < f64::EPSILON);
        assert_eq!(score.rounded_percentage(), 50);
    }

    #[test]
    fn empty_exam_scores_zero() {
        let score = ExamScore::compute(&[], &BTreeMap::new(), fixed_now());
        assert_eq!(score.total(), 0);
        assert!(score.percentage().abs() < f64::EPSILON);
    }

    #[test]
    fn unanswered_questions_count_toward_total() {
        let questions = vec![question(0, "Português", 0), question(1, "Português", 0)];
        let answers = BTreeMap::from([(0, 0)]);
        let score = ExamScore::compute(&questions, &answers, fixed_now());
        assert_eq!(score.correct(), 1);
        assert_eq!(score.total(), 2);
        assert_eq!(score.rounded_percentage(), 50);
    }

    #[test]
    fn breakdown_groups_by_subject() {
        let questions = vec![
            question(0, "Física Radiológica", 0),
            question(1, "Física Radiológica", 0),
            question(2, "Anatomia Radiológica", 2),
        ];
        let answers = BTreeMap::from([(0, 0), (1, 3), (2, 2)]);
        let score = ExamScore::compute(&questions, &answers, fixed_now());

        let fisica = score
            .by_subject()
            .iter()
            .find(|s| s.subject == "Física Radiológica")
            .unwrap();
        assert_eq!((fisica.correct, fisica.total), (1, 2));
        let anatomia = score
            .by_subject()
            .iter()
            .find(|s| s.subject == "Anatomia Radiológica")
            .unwrap();
        assert_eq!((anatomia.correct, anatomia.total), (1, 1));
    }
}
