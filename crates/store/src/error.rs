use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path escapes the project root: {0}")]
    OutsideRoot(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("{0}")]
    Other(String),
}
