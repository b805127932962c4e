//! Error types for the schema store

use thiserror::Error;

/// Result type for schema store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Schema store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid subject name: {0}")]
    InvalidSubject(String),

    #[error("Subject not found: {subject}")]
    SubjectNotFound { subject: String },

    #[error("Corrupt schema: hash {hash} is held by schema {schema_id} with different content")]
    Corruption { hash: String, schema_id: i64 },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote registry returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of a [`StoreError`], as seen by the registry frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed schema text or subject name; never retried
    Validation,
    /// Subject or schema absent
    NotFound,
    /// Hash collision with differing content; fatal
    Corruption,
    /// Storage or remote service could not complete the call
    StoreUnavailable,
    /// Bad connection string or settings
    Configuration,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidSchema(_) | StoreError::InvalidSubject(_) => ErrorKind::Validation,
            StoreError::SubjectNotFound { .. } => ErrorKind::NotFound,
            StoreError::Corruption { .. } => ErrorKind::Corruption,
            StoreError::Unavailable(_)
            | StoreError::Database(_)
            | StoreError::Http(_)
            | StoreError::Remote { .. } => ErrorKind::StoreUnavailable,
            StoreError::InvalidConfig(_) => ErrorKind::Configuration,
        }
    }

    /// Whether a caller may retry the operation with backoff.
    ///
    /// Only transport-level failures qualify; a statement the store rejected
    /// will be rejected again.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            StoreError::Http(e) => e.is_connect() || e.is_timeout(),
            StoreError::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn subject_not_found(subject: &str) -> Self {
        StoreError::SubjectNotFound {
            subject: subject.to_string(),
        }
    }
}

impl From<config_crate::ConfigError> for StoreError {
    fn from(e: config_crate::ConfigError) -> Self {
        StoreError::InvalidConfig(e.to_string())
    }
}
