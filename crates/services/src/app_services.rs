use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::config::AppConfig;
use crate::error::AppServicesError;
use crate::exam::{ExamService, SnapshotPersistence};
use crate::gemini::GeminiClient;
use crate::history_service::HistoryService;
use crate::question_provider::{GeminiQuestionProvider, QuestionProvider};
use crate::tutor_service::TutorService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    exam: Arc<ExamService>,
    history: Arc<HistoryService>,
    tutor: Arc<TutorService>,
}

impl AppServices {
    /// Build services backed by `SQLite` history and file snapshots, as configured.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn from_config(config: &AppConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::open(&config.db_url, &config.data_dir).await?;
        let client = GeminiClient::new(config.ai.clone());
        if !client.enabled() {
            tracing::warn!("GEMINI_API_KEY is not set; question generation will fail");
        }
        let provider: Arc<dyn QuestionProvider> =
            Arc::new(GeminiQuestionProvider::new(client.clone()));
        Ok(Self::with_parts(
            &storage,
            clock,
            provider,
            config.snapshot_max_age,
            client,
        ))
    }

    /// Wire services from explicit parts. Used by tests with in-memory storage.
    #[must_use]
    pub fn with_parts(
        storage: &Storage,
        clock: Clock,
        provider: Arc<dyn QuestionProvider>,
        snapshot_max_age: Option<chrono::Duration>,
        client: GeminiClient,
    ) -> Self {
        let history = HistoryService::new(Arc::clone(&storage.results));
        let persistence =
            SnapshotPersistence::new(Arc::clone(&storage.snapshots)).with_max_age(snapshot_max_age);
        let exam = Arc::new(ExamService::new(clock, provider, persistence, history.clone()));
        Self {
            exam,
            history: Arc::new(history),
            tutor: Arc::new(TutorService::new(client)),
        }
    }

    #[must_use]
    pub fn exam(&self) -> Arc<ExamService> {
        Arc::clone(&self.exam)
    }

    #[must_use]
    pub fn history(&self) -> Arc<HistoryService> {
        Arc::clone(&self.history)
    }

    #[must_use]
    pub fn tutor(&self) -> Arc<TutorService> {
        Arc::clone(&self.tutor)
    }
}
