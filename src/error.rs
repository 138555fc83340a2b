//! Error types for the archival pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Required metadata field missing or input malformed
    #[error("validation error: {0}")]
    Validation(String),

    /// Role, record, or pagination state lookup failed
    #[error("not found: {0}")]
    NotFound(String),

    /// Remote fetch returned a non-success status or an empty body
    #[error("download failed: {0}")]
    Download(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
