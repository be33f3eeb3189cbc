//! Error types for the Papyrus library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`PapyrusError`] enum.

use std::io;

use thiserror::Error;

/// The main error type for Papyrus operations.
#[derive(Error, Debug)]
pub enum PapyrusError {
    /// I/O errors (file operations, subprocess handling, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Index-related errors (forward, barrels, delta, stats cache)
    #[error("Index error: {0}")]
    Index(String),

    /// Analysis-related errors (tokenization, stopword loading)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Query-related errors
    #[error("Query error: {0}")]
    Query(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Ingest-related errors (extractor subprocess, processing pool)
    #[error("Ingest error: {0}")]
    Ingest(String),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with PapyrusError.
pub type Result<T> = std::result::Result<T, PapyrusError>;

impl PapyrusError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        PapyrusError::Index(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        PapyrusError::Analysis(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        PapyrusError::Query(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PapyrusError::Storage(msg.into())
    }

    /// Create a new ingest error.
    pub fn ingest<S: Into<String>>(msg: S) -> Self {
        PapyrusError::Ingest(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PapyrusError::Other(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        PapyrusError::Other(format!("Not found: {}", msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = PapyrusError::index("missing barrel");
        assert_eq!(error.to_string(), "Index error: missing barrel");

        let error = PapyrusError::ingest("tokenizer exited with status 1");
        assert_eq!(
            error.to_string(),
            "Ingest error: tokenizer exited with status 1"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error = PapyrusError::from(io_error);

        match error {
            PapyrusError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
