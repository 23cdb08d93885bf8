//! Error types for flare operations.
//!
//! The top-level [`Error`] wraps a focused enum per failure class so callers
//! can match on the class they care about (validation vs. allocation vs.
//! storage) without knowing every variant.

use crate::domain::{IncidentId, UserId};
use crate::duration::DurationError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// The error type for flare operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed caller input.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Incident ID issuance failed; the enclosing create was rolled back.
    #[error("ID allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    /// Storage-layer failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// User resolution failed.
    #[error("User resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// Incident not found.
    #[error("Incident not found: {0}")]
    IncidentNotFound(IncidentId),

    /// User not found.
    #[error("User not found: {0}")]
    UserNotFound(UserId),
}

impl Error {
    /// Whether the caller can fix this error by changing its input.
    ///
    /// An outer request layer maps `true` to a 4xx response and `false` to 5xx.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::IncidentNotFound(_) | Error::UserNotFound(_)
        )
    }
}

/// Malformed input rejected before persistence.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Incident title is empty or whitespace-only.
    #[error("title cannot be empty")]
    EmptyTitle,

    /// Incident title exceeds the maximum length.
    #[error("title cannot exceed {max} characters (got {actual})")]
    TitleTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Length that was provided.
        actual: usize,
    },

    /// Incident severity was not provided.
    #[error("severity must be set")]
    MissingSeverity,

    /// Tag name is empty or too long.
    #[error("invalid tag name '{0}'")]
    InvalidTagName(String),

    /// Email is not usable as a user key.
    #[error("invalid email address '{0}'")]
    InvalidEmail(String),

    /// External link URL is empty.
    #[error("link URL cannot be empty")]
    EmptyLinkUrl,

    /// Downtime text did not parse.
    #[error("invalid downtime: {0}")]
    Duration(#[from] DurationError),
}

/// Failure to issue an incident ID.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    /// The counter lock was not acquired within the configured wait.
    #[error("timed out after {0:?} waiting for the ID counter lock")]
    LockTimeout(Duration),

    /// The counter row could not be read back after create-or-fetch.
    #[error("ID counter row is unavailable")]
    CounterUnavailable,

    /// The counter cannot be incremented further.
    #[error("ID space exhausted at {0}")]
    Exhausted(u64),
}

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique constraint rejected a write.
    #[error("unique constraint '{constraint}' violated by '{value}'")]
    UniqueViolation {
        /// Name of the violated constraint.
        constraint: &'static str,
        /// Conflicting value.
        value: String,
    },

    /// Persisted data is not in the expected format.
    #[error("invalid storage format: {0}")]
    InvalidFormat(String),

    /// Record serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl StorageError {
    /// Whether this error is a unique-constraint conflict.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueViolation { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be parsed or written.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A config value is out of range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Config key.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Workspace already initialized.
    #[error("flare is already initialized in this directory. Found existing '{0}'")]
    AlreadyInitialized(String),

    /// No `.flare/` directory was found.
    #[error("no .flare directory found in {0} or parent directories")]
    NotInitialized(String),
}

/// Failures resolving an external identity to a local user.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Email address is not usable as a natural key.
    #[error("invalid email address '{0}'")]
    InvalidEmail(String),

    /// The directory reports no such chat user.
    #[error("chat user '{0}' not found in directory")]
    UnknownChatUser(String),

    /// The store failed while resolving.
    #[error("store failure: {0}")]
    Store(#[source] Box<Error>),
}

impl From<Error> for ResolutionError {
    fn from(e: Error) -> Self {
        ResolutionError::Store(Box::new(e))
    }
}

/// A specialized Result type for flare operations.
pub type Result<T> = std::result::Result<T, Error>;
