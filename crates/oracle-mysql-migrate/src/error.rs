//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, unsupported source version).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pre-run gate refused to start (prior FAILED metadata records present).
    #[error("Gate refused to start: {0}")]
    Gate(String),

    /// Checkpoint metadata is inconsistent and cannot be resumed.
    #[error("Checkpoint inconsistent: {0} - rerun with enable_checkpoint = false")]
    CheckpointInconsistent(String),

    /// Source database error, reported by the driver behind `SourceClient`.
    #[error("Source database error: {message}\n  Context: {context}")]
    Source { message: String, context: String },

    /// Sink or metadata-store SQL error.
    #[error("MySQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Metadata-store error with context about where it occurred.
    #[error("Metadata store error: {message}\n  Context: {context}")]
    Meta { message: String, context: String },

    /// Value conversion failed for one column of one row.
    #[error("Codec error for column {column}: {message}")]
    Codec { column: String, message: String },

    /// Chunk-scoped extract/apply failure. Recorded in full_sync_meta and
    /// swallowed by the inner group; sibling chunks continue.
    #[error("Chunk failed for table {table}: {message}")]
    Chunk { table: String, message: String },

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Source error with context about where it occurred.
    pub fn source(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Source {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Meta error with context about where it occurred.
    pub fn meta(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Meta {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Codec error.
    pub fn codec(column: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Codec {
            column: column.into(),
            message: message.to_string(),
        }
    }

    /// Create a Chunk error.
    pub fn chunk(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Chunk {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
