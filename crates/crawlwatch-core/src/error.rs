//! CrawlWatch error types.

use thiserror::Error;

/// Errors surfaced by the scheduler core and its collaborators.
#[derive(Debug, Error)]
pub enum CrawlWatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid frequency: {0} (expected hourly, daily or weekly)")]
    InvalidFrequency(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {0} is already running")]
    TaskBusy(String),

    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<rusqlite::Error> for CrawlWatchError {
    fn from(e: rusqlite::Error) -> Self {
        CrawlWatchError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for CrawlWatchError {
    fn from(e: reqwest::Error) -> Self {
        CrawlWatchError::Http(e.to_string())
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, CrawlWatchError>;
