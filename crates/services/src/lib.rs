#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod exam;
pub mod gemini;
pub mod history_service;
pub mod question_provider;
pub mod tutor_service;

pub use prep_core::Clock;

pub use app_services::AppServices;
pub use config::AppConfig;
pub use error::{AiError, AppServicesError, ConfigError, ExamServiceError, ProviderError, TutorError};
pub use exam::{AnswerFeedback, ExamService, ExamView, QuestionView, SavedSessionInfo, SnapshotPersistence};
pub use history_service::HistoryService;
pub use question_provider::{GeminiQuestionProvider, QuestionProvider, QuestionRequest};
pub use tutor_service::{
    ASPECT_RATIOS, ChatMessage, ChatRole, DEFAULT_ASPECT_RATIO, GroundedAnswer, ImageSize, SourceLink,
    TutorService,
};
