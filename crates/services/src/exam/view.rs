use prep_core::model::{ExamMode, ExamPhase, ExamScore, ExamSession, Question, QuestionId};

/// Presentation-agnostic snapshot of the exam for rendering.
///
/// No pre-formatted strings: the UI formats the countdown and the score as it
/// likes (see `prep_core::time::format_countdown`).
#[derive(Debug, Clone, PartialEq)]
pub struct ExamView {
    pub phase: ExamPhase,
    pub mode: Option<ExamMode>,
    pub subject_filter: Option<String>,
    pub current_index: usize,
    pub question_count: usize,
    pub answered_count: usize,
    pub remaining_seconds: u32,
    pub is_time_up: bool,
    /// More questions are still being fetched in the background.
    pub prefetch_pending: bool,
    pub can_go_next: bool,
    pub can_go_previous: bool,
    pub question: Option<QuestionView>,
    pub score: Option<ExamScore>,
}

/// The question under the cursor.
///
/// `feedback` stays `None` until the question is answered, so the correct
/// option never leaks before the user commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub id: QuestionId,
    pub subject: String,
    pub text: String,
    pub options: Vec<String>,
    pub feedback: Option<AnswerFeedback>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub selected: usize,
    pub correct_index: usize,
    pub is_correct: bool,
    pub explanation: String,
}

impl QuestionView {
    fn new(question: &Question, selected: Option<usize>) -> Self {
        Self {
            id: question.id().clone(),
            subject: question.subject().to_string(),
            text: question.text().to_string(),
            options: question.options().to_vec(),
            feedback: selected.map(|selected| AnswerFeedback {
                selected,
                correct_index: question.correct_index(),
                is_correct: question.is_correct(selected),
                explanation: question.explanation().to_string(),
            }),
        }
    }
}

impl From<&ExamSession> for ExamView {
    fn from(session: &ExamSession) -> Self {
        let index = session.current_index();
        Self {
            phase: session.phase(),
            mode: session.mode(),
            subject_filter: session.subject_filter().map(str::to_string),
            current_index: index,
            question_count: session.question_count(),
            answered_count: session.answered_count(),
            remaining_seconds: session.remaining_seconds(),
            is_time_up: session.is_time_up(),
            prefetch_pending: session.is_prefetch_pending(),
            can_go_next: session.can_go_next(),
            can_go_previous: session.can_go_previous(),
            question: session
                .current_question()
                .map(|q| QuestionView::new(q, session.answer_for(index))),
            score: session.score().cloned(),
        }
    }
}
