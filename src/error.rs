use std::io;

use thiserror::Error;

/// Errors that terminate a catalog generation run.
///
/// Per-item problems (a malformed row, an image that cannot be fetched)
/// never show up here; they are absorbed where they happen.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A filtered mode was requested without anything selected.
    #[error("No {0} selected")]
    NoSelection(&'static str),
    /// The cancel probe fired at a suspension point.
    #[error("Generation cancelled")]
    Cancelled,
    /// The per-run scratch directory could not be created.
    #[error("failed to create temporary storage: {0}")]
    TempStorage(#[source] io::Error),
    /// The final document could not be serialized.
    #[error("failed to write catalog document: {0}")]
    Render(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    /// The source table could not be read as rows of cells.
    #[error("invalid input table: {0}")]
    InvalidInput(String),
    #[error("failed to parse settings: {0}")]
    Settings(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

impl CatalogError {
    /// Cancellation is a terminal condition of its own, not an error state.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CatalogError::Cancelled)
    }
}

/// Failure to resolve one image URL. Never fatal for the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("fetch stopped by cancellation")]
    Stopped,
}

impl FetchError {
    /// Whether another attempt may succeed (429, 5xx, connection trouble).
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status(code) => *code == 429 || (500..=599).contains(code),
            FetchError::Network(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            _ => false,
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
