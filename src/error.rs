//! Error types for the GUID filter.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Cannot access table {table}: {reason}")]
    Access { table: String, reason: String },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Could not prepare statement: {0}")]
    Prepare(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {reason}")]
    Stage { stage: String, reason: String },

    #[error("Storage failed: {0}")]
    Storage(#[from] DatabaseError),
}

/// Failure to read a timestamp out of a transport-trace header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceTimeError {
    #[error("No RFC 1123 timestamp found in trace header")]
    NotFound,

    #[error("Invalid timestamp {value:?}: {reason}")]
    Invalid { value: String, reason: String },
}

/// Structural failure while splitting a raw message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("Malformed header line {line}: {content:?}")]
    MalformedHeader { line: usize, content: String },

    #[error("Message ended before the blank line separating headers from body")]
    MissingSeparator,
}
