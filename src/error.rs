use thiserror::Error;

use crate::ledger::Usd;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    AsyncDatabase(#[from] tokio_rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generative API error: {0}")]
    GenerativeApi(String),

    #[error("Embedding API error: {0}")]
    EmbeddingApi(String),

    #[error("Raindrop API error: {0}")]
    RaindropApi(String),

    #[error("Extraction failed (HTTP {status}): {message}")]
    Extraction { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Monthly budget exceeded: spent ${spent} of ${cap}")]
    BudgetExceeded { spent: Usd, cap: Usd },

    #[error("Article text too short to summarize ({length} chars, need {minimum})")]
    ContentTooShort { length: usize, minimum: usize },

    #[error("Unexpected model response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a job hitting this error may be attempted again.
    ///
    /// Missing credentials, missing rows, unprocessable extraction targets and
    /// budget exhaustion will fail the same way on every attempt.
    pub fn is_retriable(&self) -> bool {
        match self {
            AppError::NotFound(_)
            | AppError::MissingCredential(_)
            | AppError::BudgetExceeded { .. }
            | AppError::ContentTooShort { .. }
            | AppError::Invalid(_)
            | AppError::Config(_)
            | AppError::ConfigParse(_) => false,
            AppError::Extraction { status, .. } => !matches!(status, 404 | 422),
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
