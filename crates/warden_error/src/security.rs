//! Security error types.
//!
//! These cover rejections raised by identity directory mutations, identity
//! lookups and the enrollment handshake. Admission and authorization outcomes
//! are plain values, not errors.

use crate::{ConfigError, StorageError};

/// Specific security error conditions.
#[derive(Debug, Clone, derive_more::Display)]
pub enum SecurityErrorKind {
    /// Another identity already holds the wildcard owner role
    #[display("Owner already exists: {}", holder)]
    OwnerConflict {
        /// Handle of the current owner
        holder: String,
    },

    /// The owner's record cannot be modified or removed
    #[display("Identity '{}' is the owner and cannot be modified", handle)]
    OwnerProtected {
        /// Handle that was targeted
        handle: String,
    },

    /// An identity lookup for this key is already in flight
    #[display("Identity lookup already pending for '{}'", key)]
    DuplicateQuery {
        /// Normalized query key
        key: String,
    },

    /// An enrollment session is already running
    #[display("Enrollment session already active")]
    EnrollmentActive,

    /// Enrollment requested while an owner is already enrolled
    #[display("Owner already enrolled: {}", _0)]
    OwnerAlreadyEnrolled(String),

    /// Role name outside the closed role set
    #[display("Invalid role: {}", _0)]
    InvalidRole(String),

    /// Backing store failure
    #[display("{}", _0)]
    Storage(StorageError),

    /// Configuration problem
    #[display("Configuration error: {}", _0)]
    Configuration(String),
}

/// Security error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Security Error: {} at line {} in {}", kind, line, file)]
pub struct SecurityError {
    /// The specific error kind
    pub kind: SecurityErrorKind,
    /// Line number where error occurred
    pub line: u32,
    /// File where error occurred
    pub file: &'static str,
}

impl SecurityError {
    /// Create a new security error with location tracking.
    #[track_caller]
    pub fn new(kind: SecurityErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &SecurityErrorKind {
        &self.kind
    }
}

impl From<StorageError> for SecurityError {
    #[track_caller]
    fn from(err: StorageError) -> Self {
        Self::new(SecurityErrorKind::Storage(err))
    }
}

impl From<ConfigError> for SecurityError {
    #[track_caller]
    fn from(err: ConfigError) -> Self {
        Self::new(SecurityErrorKind::Configuration(err.message))
    }
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;
