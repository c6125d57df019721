use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

/// Failure of a call to a text, image or speech service.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error (status={status}): {body}")]
    Api { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("response contained no {0}")]
    MissingOutput(&'static str),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage API error (status={status}): {body}")]
    Api { status: u16, body: String },
    #[error("object not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("could not load curricula from {path}: {reason}")]
    Seed { path: String, reason: String },
}

/// Request-level failures of the generation workflow.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("stage code '{0}' not found")]
    CurriculumNotFound(String),
    #[error("curriculum lookup failed: {0}")]
    Lookup(#[source] StoreError),
    #[error("story draft generation failed: {0}")]
    Generation(#[source] ProviderError),
    #[error("story draft rejected: {0}")]
    InvalidDraft(String),
    #[error("saving story failed: {0}")]
    Persistence(#[source] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is required when {provider} is selected")]
    MissingKey { var: &'static str, provider: &'static str },
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
    #[error("either DATABASE_URL or CURRICULUM_FILE must be set")]
    NoCurriculumSource,
}

/// Error type returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Story(#[from] StoryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("story not found: {0}")]
    StoryNotFound(String),
    #[error("media not found: {0}")]
    MediaNotFound(String),
    #[error(transparent)]
    Storage(StorageError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Story(StoryError::CurriculumNotFound(_))
            | AppError::Store(StoreError::NotFound { .. })
            | AppError::StoryNotFound(_)
            | AppError::MediaNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Story(StoryError::Generation(_) | StoryError::InvalidDraft(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "GENERATION_ERROR")
            }
            AppError::Story(StoryError::Persistence(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR")
            }
            AppError::Story(StoryError::Lookup(_)) | AppError::Store(_) | AppError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let message = match &self {
            AppError::BadRequest(msg) => msg.clone(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, code, "❌ Request failed");
        }

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => AppError::MediaNotFound(key),
            other => AppError::Storage(other),
        }
    }
}
