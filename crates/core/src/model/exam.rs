use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{Generation, QuestionId};
use crate::model::mode::{ExamMode, ModeError};
use crate::model::question::{OPTION_COUNT, Question};
use crate::model::score::ExamScore;
use crate::model::snapshot::{ExamSnapshot, SNAPSHOT_VERSION, SnapshotError};

/// Questions requested when a session starts.
pub const INITIAL_BATCH_SIZE: u32 = 15;
/// Questions requested by the full-mock background prefetch.
pub const PREFETCH_BATCH_SIZE: u32 = 20;
/// Exam clock: four hours.
pub const EXAM_DURATION_SECS: u32 = 14_400;

//
// ─── PHASE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamPhase {
    NotStarted,
    Loading,
    Active,
    Finished,
}

impl fmt::Display for ExamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExamPhase::NotStarted => "not started",
            ExamPhase::Loading => "loading",
            ExamPhase::Active => "active",
            ExamPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Mode plus its normalized subject filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSelection {
    pub mode: ExamMode,
    pub subject: Option<String>,
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Rejected session intents. A rejected intent never changes state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("cannot {action} while the exam is {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: ExamPhase,
    },

    #[error("result belongs to session generation {found}, current is {current}")]
    StaleGeneration {
        current: Generation,
        found: Generation,
    },

    #[error("question {index} does not exist ({len} loaded)")]
    QuestionOutOfRange { index: usize, len: usize },

    #[error("option {choice} does not exist")]
    ChoiceOutOfRange { choice: usize },

    #[error("question {index} was already answered with option {existing}")]
    AlreadyAnswered { index: usize, existing: usize },

    #[error("answer the current question before moving on")]
    CurrentUnanswered,

    #[error("already at the last loaded question")]
    AtLastQuestion,

    #[error("already at the first question")]
    AtFirstQuestion,

    #[error(transparent)]
    Mode(#[from] ModeError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One practice-exam attempt.
///
/// The phase is the only source of truth for where the session is; the
/// `is_*` helpers are derived from it. Every transition keeps
/// `current_index < max(1, questions.len())`.
#[derive(Debug, Clone)]
pub struct ExamSession {
    phase: ExamPhase,
    generation: Generation,
    selection: Option<ExamSelection>,
    questions: Vec<Question>,
    current_index: usize,
    answers: BTreeMap<usize, usize>,
    remaining_seconds: u32,
    started_at: Option<DateTime<Utc>>,
    score: Option<ExamScore>,
    prefetch_pending: bool,
}

impl Default for ExamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ExamSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: ExamPhase::NotStarted,
            generation: Generation::default(),
            selection: None,
            questions: Vec::new(),
            current_index: 0,
            answers: BTreeMap::new(),
            remaining_seconds: EXAM_DURATION_SECS,
            started_at: None,
            score: None,
            prefetch_pending: false,
        }
    }

    // ─── Transitions ───────────────────────────────────────────────────────────

    /// Select a mode and enter `Loading`.
    ///
    /// Returns the generation the initial batch must be delivered with.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidPhase` outside `NotStarted` and
    /// `ExamError::Mode` when the mode needs a subject that was not given.
    pub fn begin(&mut self, mode: ExamMode, subject: Option<&str>) -> Result<Generation, ExamError> {
        self.require(ExamPhase::NotStarted, "start")?;
        let subject = mode.normalize_subject(subject)?;

        self.selection = Some(ExamSelection { mode, subject });
        self.phase = ExamPhase::Loading;
        self.generation = self.generation.next();
        Ok(self.generation)
    }

    /// Deliver the initial batch and enter `Active`.
    ///
    /// An empty batch is accepted; the session is then active with no questions.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidPhase` outside `Loading` and
    /// `ExamError::StaleGeneration` when the batch belongs to an earlier session.
    pub fn activate(
        &mut self,
        generation: Generation,
        batch: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Result<(), ExamError> {
        self.require(ExamPhase::Loading, "activate")?;
        self.require_generation(generation)?;

        self.questions = Vec::with_capacity(batch.len());
        self.push_unique(batch, |_, n| QuestionId::new(format!("q{n}")));
        self.current_index = 0;
        self.answers.clear();
        self.remaining_seconds = EXAM_DURATION_SECS;
        self.started_at = Some(now);
        self.score = None;
        self.prefetch_pending = false;
        self.phase = ExamPhase::Active;
        Ok(())
    }

    /// Leave `Loading` after the initial fetch failed.
    ///
    /// Returns `false` (and changes nothing) if the session has moved on.
    pub fn abort_loading(&mut self, generation: Generation) -> bool {
        if self.phase != ExamPhase::Loading || self.generation != generation {
            return false;
        }
        self.selection = None;
        self.phase = ExamPhase::NotStarted;
        true
    }

    /// Replace in-memory state with a stored snapshot and enter `Active`.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidPhase` while loading or finished, and
    /// `ExamError::Snapshot` if the snapshot breaks session invariants.
    pub fn restore(&mut self, snapshot: ExamSnapshot) -> Result<Generation, ExamError> {
        if !matches!(self.phase, ExamPhase::NotStarted | ExamPhase::Active) {
            return Err(ExamError::InvalidPhase {
                action: "resume",
                phase: self.phase,
            });
        }
        snapshot.validate()?;

        self.selection = Some(ExamSelection {
            mode: snapshot.mode,
            subject: snapshot.subject_filter,
        });
        self.questions = snapshot.questions;
        self.current_index = snapshot.current_index;
        self.answers = snapshot.answers;
        self.remaining_seconds = snapshot.remaining_seconds;
        self.started_at = Some(snapshot.started_at);
        self.score = None;
        self.prefetch_pending = false;
        self.phase = ExamPhase::Active;
        self.generation = self.generation.next();
        Ok(self.generation)
    }

    /// Record `choice` for the question at `index`. The first answer is final.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::AlreadyAnswered` if the question has an answer, or the
    /// range/phase variants for invalid input.
    pub fn answer(&mut self, index: usize, choice: usize) -> Result<(), ExamError> {
        self.require(ExamPhase::Active, "answer")?;
        if index >= self.questions.len() {
            return Err(ExamError::QuestionOutOfRange {
                index,
                len: self.questions.len(),
            });
        }
        if choice >= OPTION_COUNT {
            return Err(ExamError::ChoiceOutOfRange { choice });
        }
        if let Some(existing) = self.answers.get(&index) {
            return Err(ExamError::AlreadyAnswered {
                index,
                existing: *existing,
            });
        }
        self.answers.insert(index, choice);
        Ok(())
    }

    /// Answer the question under the cursor.
    ///
    /// # Errors
    ///
    /// See [`ExamSession::answer`].
    pub fn answer_current(&mut self, choice: usize) -> Result<(), ExamError> {
        self.answer(self.current_index, choice)
    }

    /// Move to the next question. Only allowed once the current one is answered.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::CurrentUnanswered` or `ExamError::AtLastQuestion`.
    pub fn next(&mut self) -> Result<usize, ExamError> {
        self.require(ExamPhase::Active, "advance")?;
        if !self.is_current_answered() {
            return Err(ExamError::CurrentUnanswered);
        }
        if self.current_index + 1 >= self.questions.len() {
            return Err(ExamError::AtLastQuestion);
        }
        self.current_index += 1;
        Ok(self.current_index)
    }

    /// Move to the previous question. Answering is not required.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::AtFirstQuestion` at index zero.
    pub fn previous(&mut self) -> Result<usize, ExamError> {
        self.require(ExamPhase::Active, "go back")?;
        if self.current_index == 0 {
            return Err(ExamError::AtFirstQuestion);
        }
        self.current_index -= 1;
        Ok(self.current_index)
    }

    /// Advance the exam clock by one second.
    ///
    /// Returns the remaining time after the tick, or `None` when nothing ticked
    /// (not active, or the clock already reached zero).
    pub fn tick(&mut self) -> Option<u32> {
        if self.phase != ExamPhase::Active || self.remaining_seconds == 0 {
            return None;
        }
        self.remaining_seconds -= 1;
        Some(self.remaining_seconds)
    }

    /// Append a background batch to an active session.
    ///
    /// Existing questions, the cursor and the answers are untouched. Questions
    /// whose id is already taken get one from `fresh_id`. Returns how many
    /// questions were appended.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::StaleGeneration` or `ExamError::InvalidPhase` when the
    /// session the batch was fetched for no longer exists; the batch is dropped.
    pub fn append_batch(
        &mut self,
        generation: Generation,
        batch: Vec<Question>,
        fresh_id: impl FnMut(&Question) -> QuestionId,
    ) -> Result<usize, ExamError> {
        self.require_generation(generation)?;
        self.require(ExamPhase::Active, "append questions")?;
        self.prefetch_pending = false;
        let mut fresh_id = fresh_id;
        Ok(self.push_unique(batch, |q, _| fresh_id(q)))
    }

    /// Note that a background batch is on its way for `generation`.
    ///
    /// Returns `false` (and changes nothing) if the session has moved on.
    pub fn mark_prefetch_pending(&mut self, generation: Generation) -> bool {
        if self.phase != ExamPhase::Active || self.generation != generation {
            return false;
        }
        self.prefetch_pending = true;
        true
    }

    /// The background fetch for `generation` failed; nothing more is coming.
    pub fn cancel_prefetch(&mut self, generation: Generation) {
        if self.generation == generation {
            self.prefetch_pending = false;
        }
    }

    /// Score the exam and enter `Finished`.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidPhase` outside `Active`.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<&ExamScore, ExamError> {
        self.require(ExamPhase::Active, "finish")?;
        let score = ExamScore::compute(&self.questions, &self.answers, now);
        self.prefetch_pending = false;
        self.phase = ExamPhase::Finished;
        self.generation = self.generation.next();
        Ok(&*self.score.insert(score))
    }

    /// Drop everything and return to `NotStarted`. Allowed from any phase.
    pub fn discard(&mut self) {
        let generation = self.generation.next();
        *self = Self::new();
        self.generation = generation;
    }

    /// Capture the state for persistence. `None` unless the session is active.
    #[must_use]
    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> Option<ExamSnapshot> {
        if self.phase != ExamPhase::Active {
            return None;
        }
        let selection = self.selection.as_ref()?;
        Some(ExamSnapshot {
            version: SNAPSHOT_VERSION,
            questions: self.questions.clone(),
            current_index: self.current_index,
            answers: self.answers.clone(),
            remaining_seconds: self.remaining_seconds,
            mode: selection.mode,
            subject_filter: selection.subject.clone(),
            started_at: self.started_at.unwrap_or(saved_at),
            saved_at,
        })
    }

    // ─── Derived state ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn phase(&self) -> ExamPhase {
        self.phase
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn selection(&self) -> Option<&ExamSelection> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn mode(&self) -> Option<ExamMode> {
        self.selection.as_ref().map(|s| s.mode)
    }

    #[must_use]
    pub fn subject_filter(&self) -> Option<&str> {
        self.selection.as_ref().and_then(|s| s.subject.as_deref())
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The question under the cursor; `None` when the session has no questions.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<usize, usize> {
        &self.answers
    }

    #[must_use]
    pub fn answer_for(&self, index: usize) -> Option<usize> {
        self.answers.get(&index).copied()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_current_answered(&self) -> bool {
        self.answers.contains_key(&self.current_index)
    }

    #[must_use]
    pub fn can_go_next(&self) -> bool {
        self.is_active()
            && self.is_current_answered()
            && self.current_index + 1 < self.questions.len()
    }

    #[must_use]
    pub fn can_go_previous(&self) -> bool {
        self.is_active() && self.current_index > 0
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// The clock reached zero. The exam stays active until finished explicitly.
    #[must_use]
    pub fn is_time_up(&self) -> bool {
        self.is_active() && self.remaining_seconds == 0
    }

    /// A background batch for this session has been requested and not yet applied.
    #[must_use]
    pub fn is_prefetch_pending(&self) -> bool {
        self.prefetch_pending
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn score(&self) -> Option<&ExamScore> {
        self.score.as_ref()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase == ExamPhase::Loading
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase == ExamPhase::Active
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase == ExamPhase::Finished
    }

    // ─── Helpers ───────────────────────────────────────────────────────────────

    fn require(&self, phase: ExamPhase, action: &'static str) -> Result<(), ExamError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(ExamError::InvalidPhase {
                action,
                phase: self.phase,
            })
        }
    }

    fn require_generation(&self, found: Generation) -> Result<(), ExamError> {
        if self.generation == found {
            Ok(())
        } else {
            Err(ExamError::StaleGeneration {
                current: self.generation,
                found,
            })
        }
    }

    /// Append `batch`, renaming questions whose id is already present.
    fn push_unique(
        &mut self,
        batch: Vec<Question>,
        mut rename: impl FnMut(&Question, usize) -> QuestionId,
    ) -> usize {
        let mut taken: HashSet<QuestionId> =
            self.questions.iter().map(|q| q.id().clone()).collect();
        let added = batch.len();
        for question in batch {
            let question = if taken.contains(question.id()) {
                let mut n = self.questions.len();
                let mut id = rename(&question, n);
                while taken.contains(&id) {
                    n += 1;
                    id = rename(&question, n);
                }
                question.with_id(id)
            } else {
                question
            };
            taken.insert(question.id().clone());
            self.questions.push(question);
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::QuestionDraft;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn question(id: &str, correct: i64) -> Question {
        QuestionDraft {
            id: Some(id.into()),
            subject: "Técnicas e Posicionamentos".into(),
            text: format!("Pergunta {id}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: correct,
            explanation: "Porque sim.".into(),
        }
        .validate()
        .unwrap()
    }

    fn batch(prefix: &str, n: usize) -> Vec<Question> {
        (0..n).map(|i| question(&format!("{prefix}{i}"), 1)).collect()
    }

    fn active(n: usize) -> ExamSession {
        let mut session = ExamSession::new();
        let generation = session.begin(ExamMode::Random, None).unwrap();
        session.activate(generation, batch("q", n), fixed_now()).unwrap();
        session
    }

    fn assert_index_invariant(session: &ExamSession) {
        assert!(session.current_index() < session.question_count().max(1));
    }

    #[test]
    fn start_moves_through_loading_to_active() {
        let mut session = ExamSession::new();
        assert_eq!(session.phase(), ExamPhase::NotStarted);

        let generation = session.begin(ExamMode::FullMock, Some("ignored")).unwrap();
        assert!(session.is_loading());
        assert_eq!(session.subject_filter(), None);

        session.activate(generation, batch("q", 15), fixed_now()).unwrap();
        assert!(session.is_active());
        assert_eq!(session.question_count(), 15);
        assert_eq!(session.current_index(), 0);
        assert!(session.answers().is_empty());
        assert_eq!(session.remaining_seconds(), EXAM_DURATION_SECS);
        assert_eq!(session.started_at(), Some(fixed_now()));
    }

    #[test]
    fn single_subject_needs_filter_to_start() {
        let mut session = ExamSession::new();
        let err = session.begin(ExamMode::SingleSubject, None).unwrap_err();
        assert!(matches!(err, ExamError::Mode(_)));
        assert_eq!(session.phase(), ExamPhase::NotStarted);
    }

    #[test]
    fn empty_batch_activates_without_questions() {
        let session = active(0);
        assert!(session.is_active());
        assert!(session.current_question().is_none());
        assert!(!session.is_current_answered());
        assert_index_invariant(&session);
    }

    #[test]
    fn failed_load_returns_to_not_started() {
        let mut session = ExamSession::new();
        let generation = session.begin(ExamMode::Random, None).unwrap();
        assert!(session.abort_loading(generation));
        assert_eq!(session.phase(), ExamPhase::NotStarted);
        assert!(session.mode().is_none());
        assert!(!session.abort_loading(generation));
    }

    #[test]
    fn first_answer_is_final() {
        let mut session = active(3);
        session.answer(0, 2).unwrap();
        let err = session.answer(0, 1).unwrap_err();
        assert_eq!(err, ExamError::AlreadyAnswered { index: 0, existing: 2 });
        assert_eq!(session.answers(), &BTreeMap::from([(0, 2)]));
    }

    #[test]
    fn answer_rejects_out_of_range_input() {
        let mut session = active(2);
        assert!(matches!(
            session.answer(2, 0),
            Err(ExamError::QuestionOutOfRange { index: 2, len: 2 })
        ));
        assert_eq!(
            session.answer(0, 4),
            Err(ExamError::ChoiceOutOfRange { choice: 4 })
        );
        assert!(session.answers().is_empty());
    }

    #[test]
    fn next_requires_answer_and_stops_at_last() {
        let mut session = active(2);
        assert_eq!(session.next(), Err(ExamError::CurrentUnanswered));
        assert_eq!(session.current_index(), 0);

        session.answer_current(1).unwrap();
        assert_eq!(session.next(), Ok(1));

        session.answer_current(0).unwrap();
        assert_eq!(session.next(), Err(ExamError::AtLastQuestion));
        assert_eq!(session.current_index(), 1);
        assert_index_invariant(&session);
    }

    #[test]
    fn previous_does_not_need_answer() {
        let mut session = active(3);
        assert_eq!(session.previous(), Err(ExamError::AtFirstQuestion));
        session.answer_current(1).unwrap();
        session.next().unwrap();
        assert!(!session.is_current_answered());
        assert_eq!(session.previous(), Ok(0));
        assert!(session.is_current_answered());
    }

    #[test]
    fn countdown_floors_at_zero() {
        let mut session = active(1);
        for _ in 0..EXAM_DURATION_SECS {
            session.tick();
        }
        assert_eq!(session.remaining_seconds(), 0);
        assert!(session.is_time_up());
        assert_eq!(session.tick(), None);
        assert_eq!(session.remaining_seconds(), 0);
        assert!(session.is_active());
    }

    #[test]
    fn tick_is_inert_outside_active() {
        let mut session = ExamSession::new();
        assert_eq!(session.tick(), None);
        assert_eq!(session.remaining_seconds(), EXAM_DURATION_SECS);
    }

    #[test]
    fn background_batch_appends_without_moving_cursor() {
        let mut session = active(15);
        let generation = session.generation();
        session.answer_current(1).unwrap();
        session.next().unwrap();

        let appended = session
            .append_batch(generation, batch("bg", 20), |_| QuestionId::new("unused"))
            .unwrap();
        assert_eq!(appended, 20);
        assert_eq!(session.question_count(), 35);
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.answers(), &BTreeMap::from([(0, 1)]));
    }

    #[test]
    fn prefetch_pending_clears_on_append_or_cancel() {
        let mut session = active(15);
        let generation = session.generation();
        assert!(!session.is_prefetch_pending());

        assert!(session.mark_prefetch_pending(generation));
        assert!(session.is_prefetch_pending());
        session
            .append_batch(generation, batch("bg", 2), |_| QuestionId::new("x"))
            .unwrap();
        assert!(!session.is_prefetch_pending());

        assert!(session.mark_prefetch_pending(generation));
        session.cancel_prefetch(generation);
        assert!(!session.is_prefetch_pending());
    }

    #[test]
    fn prefetch_pending_ends_with_the_session() {
        let mut session = active(3);
        let generation = session.generation();
        session.mark_prefetch_pending(generation);
        session.finish(fixed_now()).unwrap();
        assert!(!session.is_prefetch_pending());
        assert!(!session.mark_prefetch_pending(generation));

        let mut session = active(3);
        let generation = session.generation();
        session.mark_prefetch_pending(generation);
        session.discard();
        assert!(!session.is_prefetch_pending());
    }

    #[test]
    fn colliding_ids_are_renamed_on_append() {
        let mut session = active(2);
        let generation = session.generation();
        let mut counter = 0;
        session
            .append_batch(generation, batch("q", 2), |_| {
                counter += 1;
                QuestionId::new(format!("fresh-{counter}"))
            })
            .unwrap();

        let ids: HashSet<_> = session.questions().iter().map(|q| q.id().clone()).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.contains(&QuestionId::new("fresh-1")));
    }

    #[test]
    fn stale_batch_is_rejected_after_discard() {
        let mut session = active(15);
        let generation = session.generation();
        session.discard();

        let err = session
            .append_batch(generation, batch("bg", 20), |_| QuestionId::new("x"))
            .unwrap_err();
        assert!(matches!(err, ExamError::StaleGeneration { .. }));
        assert_eq!(session.question_count(), 0);
    }

    #[test]
    fn stale_batch_is_rejected_after_finish() {
        let mut session = active(3);
        let generation = session.generation();
        session.finish(fixed_now()).unwrap();

        assert!(session
            .append_batch(generation, batch("bg", 2), |_| QuestionId::new("x"))
            .is_err());
        assert_eq!(session.question_count(), 3);
    }

    #[test]
    fn finish_scores_and_freezes() {
        let mut session = active(10);
        for idx in 0..5 {
            session.answer(idx, 1).unwrap();
        }
        for idx in 5..10 {
            session.answer(idx, 3).unwrap();
        }
        let score = session.finish(fixed_now()).unwrap().clone();
        assert_eq!(score.rounded_percentage(), 50);
        assert!(session.is_finished());
        assert!(session.answer(0, 1).is_err());
        assert_eq!(session.tick(), None);
        assert!(session.snapshot(fixed_now()).is_none());
    }

    #[test]
    fn discard_works_from_every_phase() {
        let mut session = ExamSession::new();
        session.discard();
        assert_eq!(session.phase(), ExamPhase::NotStarted);

        let mut session = active(2);
        session.finish(fixed_now()).unwrap();
        session.discard();
        assert_eq!(session.phase(), ExamPhase::NotStarted);
        assert!(session.score().is_none());
        assert!(session.mode().is_none());

        let mut session = ExamSession::new();
        session.begin(ExamMode::GapFocus, None).unwrap();
        session.discard();
        assert_eq!(session.phase(), ExamPhase::NotStarted);
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let mut session = active(4);
        session.answer_current(1).unwrap();
        session.next().unwrap();
        session.tick();
        let saved_at = fixed_now() + Duration::minutes(3);
        let snapshot = session.snapshot(saved_at).unwrap();

        let mut resumed = ExamSession::new();
        resumed.restore(snapshot.clone()).unwrap();
        assert!(resumed.is_active());
        assert_eq!(resumed.questions(), session.questions());
        assert_eq!(resumed.current_index(), 1);
        assert_eq!(resumed.answers(), session.answers());
        assert_eq!(resumed.remaining_seconds(), EXAM_DURATION_SECS - 1);
        assert_eq!(resumed.mode(), Some(ExamMode::Random));
        assert_eq!(resumed.snapshot(saved_at), Some(snapshot));
    }

    #[test]
    fn restore_over_active_session_bumps_generation() {
        let mut session = active(2);
        let before = session.generation();
        let snapshot = active(5).snapshot(fixed_now()).unwrap();
        let after = session.restore(snapshot).unwrap();
        assert!(after > before);
        assert_eq!(session.question_count(), 5);
    }

    #[test]
    fn restore_rejects_invalid_snapshot() {
        let mut snapshot = active(2).snapshot(fixed_now()).unwrap();
        snapshot.current_index = 9;
        let mut session = ExamSession::new();
        assert!(matches!(
            session.restore(snapshot),
            Err(ExamError::Snapshot(_))
        ));
        assert_eq!(session.phase(), ExamPhase::NotStarted);
    }
}
