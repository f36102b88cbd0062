//! Error types for the docshift migration engine.
//!
//! A single enum covers source parsing, sink writes and identifier-map
//! failures so that every layer can return the shared `Result` alias.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    // Source / filesystem errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Invalid model definition: {message}")]
    ModelDef { message: String },

    // Sink errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Unique constraint violated on {table}: {message}")]
    UniqueViolation { table: String, message: String },

    // Identifier map
    #[error("No relational id allocated for source id {source_id}")]
    MissingMapping { source_id: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

impl From<std::io::Error> for MigrateError {
    fn from(err: std::io::Error) -> Self {
        MigrateError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        MigrateError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for MigrateError {
    fn from(err: rusqlite::Error) -> Self {
        MigrateError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl MigrateError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        MigrateError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Classify a SQLite failure on a specific table.
    ///
    /// Duplicate-unique-key conditions get their own variant so the link
    /// pass can suppress them; everything else stays a database error.
    pub fn from_sqlite(table: &str, err: rusqlite::Error) -> Self {
        if is_unique_violation(&err) {
            MigrateError::UniqueViolation {
                table: table.to_string(),
                message: err.to_string(),
            }
        } else {
            MigrateError::Database {
                message: format!("write to {table} failed: {err}"),
                source: Some(err),
            }
        }
    }
}

/// Whether a rusqlite error is a unique or primary-key constraint failure.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
