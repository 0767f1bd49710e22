use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use prep_core::model::{
    ExamError, ExamMode, ExamPhase, ExamScore, ExamSession, Generation, INITIAL_BATCH_SIZE,
    PREFETCH_BATCH_SIZE, Question,
};
use storage::repository::ExamResultRecord;
use tokio::task::JoinHandle;

use super::persistence::{SavedSessionInfo, SnapshotPersistence};
use super::view::ExamView;
use crate::Clock;
use crate::error::ExamServiceError;
use crate::history_service::HistoryService;
use crate::question_provider::{QuestionProvider, QuestionRequest, fresh_question_id};

/// Presentation-facing exam facade.
///
/// Owns the single exam session, the question provider, snapshot persistence
/// and the result history. Every mutation while the session is active is
/// written through to the snapshot before the intent returns; a change whose
/// snapshot cannot be written is not applied.
///
/// The session sits behind a `std::sync::Mutex`; the lock is never held
/// across an `.await`.
#[derive(Clone)]
pub struct ExamService {
    clock: Clock,
    session: Arc<Mutex<ExamSession>>,
    provider: Arc<dyn QuestionProvider>,
    persistence: SnapshotPersistence,
    history: HistoryService,
    prefetch: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ExamService {
    #[must_use]
    pub fn new(
        clock: Clock,
        provider: Arc<dyn QuestionProvider>,
        persistence: SnapshotPersistence,
        history: HistoryService,
    ) -> Self {
        Self {
            clock,
            session: Arc::new(Mutex::new(ExamSession::new())),
            provider,
            persistence,
            history,
            prefetch: Arc::new(Mutex::new(None)),
        }
    }

    // ─── Intents ───────────────────────────────────────────────────────────────

    /// Start a new exam and wait for its first batch.
    ///
    /// A finished exam in memory is cleared first. Full mocks then fetch a
    /// second batch in the background.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::UnfinishedSession` while a saved exam exists,
    /// `ExamServiceError::Loading` when the first batch cannot be fetched (the
    /// session returns to `NotStarted`), and `ExamServiceError::Exam` for an
    /// invalid mode/subject pair or a session that is already running.
    pub async fn start(
        &self,
        mode: ExamMode,
        subject: Option<&str>,
    ) -> Result<ExamView, ExamServiceError> {
        if self.persistence.peek(self.clock.now())?.is_some() {
            return Err(ExamServiceError::UnfinishedSession);
        }

        let (generation, subject) = {
            let mut session = self.lock()?;
            if session.phase() == ExamPhase::Finished {
                session.discard();
            }
            let generation = session.begin(mode, subject)?;
            (generation, session.subject_filter().map(str::to_string))
        };
        tracing::info!(%mode, subject = subject.as_deref(), "starting exam");

        let focus = if mode == ExamMode::GapFocus {
            self.history.weak_subjects().await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "history unavailable; using default gap topics");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        let request =
            QuestionRequest::new(INITIAL_BATCH_SIZE, mode, subject.clone()).with_focus_subjects(focus);

        let batch = match self.provider.fetch_questions(&request).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(error = %err, "initial question fetch failed");
                self.lock()?.abort_loading(generation);
                return Err(ExamServiceError::Loading(err));
            }
        };
        if batch.is_empty() {
            tracing::warn!(%mode, "provider returned no questions; exam starts empty");
        }

        let view = {
            let mut session = self.lock()?;
            let mut draft = session.clone();
            draft.activate(generation, batch, self.clock.now())?;
            if mode.prefetches() {
                draft.mark_prefetch_pending(generation);
            }
            if let Err(err) = self.persist(&draft) {
                session.abort_loading(generation);
                return Err(err);
            }
            *session = draft;
            ExamView::from(&*session)
        };

        if mode.prefetches() {
            self.spawn_prefetch(generation, QuestionRequest::new(PREFETCH_BATCH_SIZE, mode, subject));
        }
        Ok(view)
    }

    /// Restore the saved exam, if any.
    ///
    /// Returns `Ok(None)` when nothing usable is saved; corrupt or expired
    /// snapshots are purged on the way.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError` when storage fails or the session is loading
    /// or finished.
    pub fn resume(&self) -> Result<Option<ExamView>, ExamServiceError> {
        let mut session = self.lock()?;
        let Some(snapshot) = self.persistence.load(self.clock.now())? else {
            return Ok(None);
        };
        let answered = snapshot.answered_count();
        session.restore(snapshot)?;
        tracing::info!(
            answered,
            total = session.question_count(),
            remaining = session.remaining_seconds(),
            "resumed exam"
        );
        Ok(Some(ExamView::from(&*session)))
    }

    /// Drop the exam in memory and on disk. Pending background batches are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` if the snapshot cannot be deleted.
    pub fn discard(&self) -> Result<ExamView, ExamServiceError> {
        let mut session = self.lock()?;
        self.persistence.clear()?;
        session.discard();
        tracing::info!("discarded exam");
        Ok(ExamView::from(&*session))
    }

    /// Answer the current question with option `choice` (0-based).
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Exam` for invalid choices, answered questions
    /// or a session that is not active.
    pub fn answer(&self, choice: usize) -> Result<ExamView, ExamServiceError> {
        self.mutate(|session| session.answer_current(choice))
    }

    /// Move to the next question.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Exam` when the current question is unanswered
    /// or the cursor is on the last question.
    pub fn next(&self) -> Result<ExamView, ExamServiceError> {
        self.mutate(|session| session.next().map(|_| ()))
    }

    /// Move to the previous question.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Exam` on the first question.
    pub fn previous(&self) -> Result<ExamView, ExamServiceError> {
        self.mutate(|session| session.previous().map(|_| ()))
    }

    /// Advance the exam clock by one second.
    ///
    /// Returns the remaining seconds, or `None` when the clock did not move.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError` when the snapshot cannot be written; the
    /// clock then keeps its previous value.
    pub fn tick(&self) -> Result<Option<u32>, ExamServiceError> {
        let mut session = self.lock()?;
        let mut draft = session.clone();
        let remaining = draft.tick();
        if remaining.is_some() {
            self.persist(&draft)?;
            *session = draft;
        }
        if remaining == Some(0) {
            tracing::info!("exam time is up");
        }
        Ok(remaining)
    }

    /// Score the exam, clear the snapshot and append the result to the history.
    ///
    /// A history write failure is logged; the score is still returned.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Exam` outside `Active` and
    /// `ExamServiceError::Storage` if the snapshot cannot be cleared; the exam
    /// then stays active.
    pub async fn finish(&self) -> Result<ExamScore, ExamServiceError> {
        let (score, record) = {
            let mut session = self.lock()?;
            let mode = session.mode();
            let subject = session.subject_filter().map(str::to_string);
            let started_at = session.started_at();
            let remaining = session.remaining_seconds();
            let mut draft = session.clone();
            let score = draft.finish(self.clock.now())?.clone();
            self.persistence.clear()?;
            *session = draft;

            let record = mode.map(|mode| {
                ExamResultRecord::from_score(
                    mode,
                    subject,
                    started_at.unwrap_or_else(|| score.finished_at()),
                    remaining,
                    &score,
                )
            });
            (score, record)
        };
        tracing::info!(
            correct = score.correct(),
            total = score.total(),
            percentage = score.rounded_percentage(),
            "finished exam"
        );

        if let Some(record) = record {
            if let Err(err) = self.history.record(&record).await {
                tracing::warn!(error = %err, "failed to record exam result");
            }
        }
        Ok(score)
    }

    // ─── Queries ───────────────────────────────────────────────────────────────

    /// Current state for rendering.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::StateUnavailable` if the session lock is poisoned.
    pub fn view(&self) -> Result<ExamView, ExamServiceError> {
        Ok(ExamView::from(&*self.lock()?))
    }

    /// Summary of the saved exam for the resume prompt.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` when the store fails.
    pub fn saved_session(&self) -> Result<Option<SavedSessionInfo>, ExamServiceError> {
        self.persistence.peek(self.clock.now())
    }

    #[must_use]
    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    // ─── Background work ───────────────────────────────────────────────────────

    /// Wait until the pending background batch (if any) has been applied or dropped.
    pub async fn wait_for_prefetch(&self) {
        let handle = match self.prefetch.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "prefetch task failed");
            }
        }
    }

    /// Tick the exam clock once per second until it reaches zero or the
    /// session stops being active.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_countdown(&self) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                match service.tick() {
                    Ok(Some(remaining)) if remaining > 0 => {}
                    Ok(_) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "countdown stopped");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_prefetch(&self, generation: Generation, request: QuestionRequest) {
        let service = self.clone();
        let handle = tokio::spawn(async move {
            match service.provider.fetch_questions(&request).await {
                Ok(batch) => service.apply_prefetch(generation, batch),
                Err(err) => {
                    tracing::warn!(error = %err, "background question fetch failed");
                    if let Ok(mut session) = service.lock() {
                        session.cancel_prefetch(generation);
                    }
                }
            }
        });
        match self.prefetch.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(_) => tracing::warn!("prefetch slot unavailable"),
        }
    }

    fn apply_prefetch(&self, generation: Generation, batch: Vec<Question>) {
        let Ok(mut session) = self.lock() else {
            tracing::warn!("exam state unavailable; dropping prefetched questions");
            return;
        };
        match session.append_batch(generation, batch, |_| fresh_question_id()) {
            Ok(added) => {
                tracing::info!(added, total = session.question_count(), "appended prefetched questions");
                if let Err(err) = self.persist(&session) {
                    tracing::warn!(error = %err, "failed to save snapshot after prefetch");
                }
            }
            Err(err) => tracing::debug!(error = %err, "dropping stale prefetched questions"),
        }
    }

    // ─── Helpers ───────────────────────────────────────────────────────────────

    fn lock(&self) -> Result<MutexGuard<'_, ExamSession>, ExamServiceError> {
        self.session
            .lock()
            .map_err(|_| ExamServiceError::StateUnavailable)
    }

    /// Apply `f` to a copy of the session and commit it once the snapshot is written.
    fn mutate(
        &self,
        f: impl FnOnce(&mut ExamSession) -> Result<(), ExamError>,
    ) -> Result<ExamView, ExamServiceError> {
        let mut session = self.lock()?;
        let mut draft = session.clone();
        f(&mut draft)?;
        self.persist(&draft)?;
        *session = draft;
        Ok(ExamView::from(&*session))
    }

    fn persist(&self, session: &ExamSession) -> Result<(), ExamServiceError> {
        match session.snapshot(self.clock.now()) {
            Some(snapshot) => self.persistence.save(&snapshot),
            None => Ok(()),
        }
    }
}
