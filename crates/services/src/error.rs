//! Shared error types for the services crate.

use thiserror::Error;

use prep_core::model::{AiSettingsError, ExamError, SnapshotError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the generative-language client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AiError {
    #[error("the AI provider is not configured (set GEMINI_API_KEY)")]
    Disabled,
    #[error("the AI provider returned an empty response")]
    EmptyResponse,
    #[error("AI request failed with status {status}: {message}")]
    HttpStatus {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by a `QuestionProvider`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("questions could not be parsed: {0}")]
    Parse(String),
    #[error("question provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by `ExamService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamServiceError {
    #[error("an unfinished exam is saved; resume or discard it first")]
    UnfinishedSession,
    #[error("loading questions failed: {0}")]
    Loading(#[source] ProviderError),
    #[error("exam state is unavailable")]
    StateUnavailable,
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `TutorService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TutorError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("invalid coordinates: {lat}, {lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },
    #[error("unsupported image option: {0}")]
    InvalidImageOption(String),
    #[error(transparent)]
    Ai(#[from] AiError),
}

/// Errors emitted while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
    #[error("no data directory available; set PREP_DATA_DIR")]
    NoDataDir,
    #[error(transparent)]
    Settings(#[from] AiSettingsError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
