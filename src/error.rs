use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Configuration error: {message} (hint: {hint})")]
    Configuration { message: String, hint: String },

    #[error("Source read failed: {0}")]
    SourceRead(String),

    #[error("Chunk {chunk_index} failed after {committed} rows were committed: {reason}")]
    LoadChunk {
        chunk_index: usize,
        committed: usize,
        reason: String,
    },

    #[error("Export write to {} failed: {reason}", path.display())]
    ExportWrite { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {message}")]
    Database { message: String },
}

impl MigrationError {
    pub fn config(message: impl Into<String>, hint: impl Into<String>) -> Self {
        MigrationError::Configuration {
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn export_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        MigrationError::ExportWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
