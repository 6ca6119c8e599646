//! Core error types for caltrack-core.
//!
//! Errors raised by the storage and remote collaborators are modelled with
//! thiserror. The sync pass never returns these directly: it folds them into
//! a [`SyncReport`](crate::tracking::SyncReport) together with the diagnostic
//! trace, tagged with a [`SyncErrorKind`](crate::tracking::SyncErrorKind).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for caltrack-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credential errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Remote calendar errors
    #[error("Calendar source error: {0}")]
    Source(#[from] SourceError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A uniqueness constraint rejected the row
    #[error("Duplicate row: {0}")]
    Duplicate(String),

    /// Row lookup by id found nothing
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home/data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Credential errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No token in the environment or the keyring
    #[error("Not authenticated with {service}")]
    NotAuthenticated { service: String },

    /// Stored token is past its expiry
    #[error("Access token for {service} expired")]
    TokenExpired { service: String },

    /// OS keyring failure
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Stored token blob could not be decoded
    #[error("Stored credentials are unreadable: {0}")]
    Corrupt(String),
}

/// Errors raised by a calendar event source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The remote rejected the credential (HTTP 401/403)
    #[error("Calendar API rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Any other non-success HTTP status
    #[error("Calendar API error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    /// Transport failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("Malformed calendar response: {0}")]
    Malformed(String),

    /// Base URL or path could not be assembled
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl SourceError {
    /// Whether the failure means the credential is no good.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SourceError::Unauthorized { .. })
    }
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Required field is empty
    #[error("'{0}' is required")]
    Required(&'static str),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg) => match code.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    DatabaseError::Locked
                }
                rusqlite::ErrorCode::ConstraintViolation
                    if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                {
                    DatabaseError::Duplicate(msg.clone().unwrap_or_else(|| err.to_string()))
                }
                _ => DatabaseError::QueryFailed(err.to_string()),
            },
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
