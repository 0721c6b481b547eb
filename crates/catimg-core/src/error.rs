use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Target already exists: {}", path.display())]
    Conflict { path: PathBuf },

    #[error("Invalid category id '{0}' (expected 24 hex characters)")]
    InvalidCategoryId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backup copy missing before delete: {}", path.display())]
    BackupMissing { path: PathBuf },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
