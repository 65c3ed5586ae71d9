//! Top-level error wrapper types.

use crate::{ConfigError, SecurityError, StorageError};

/// Every error the workspace can surface to an enclosing application.
///
/// # Examples
///
/// ```
/// use warden_error::{StorageError, StorageErrorKind, WardenError};
///
/// let storage = StorageError::new(StorageErrorKind::FileRead("users.json".to_string()));
/// let err: WardenError = storage.into();
/// assert!(format!("{}", err).contains("Storage Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum WardenErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Identity store error
    #[from(StorageError)]
    Storage(StorageError),
    /// Security rejection
    #[from(SecurityError)]
    Security(SecurityError),
}

/// Warden error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Warden Error: {}", _0)]
pub struct WardenError(Box<WardenErrorKind>);

impl WardenError {
    /// Create a new error from a kind.
    pub fn new(kind: WardenErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &WardenErrorKind {
        &self.0
    }
}

impl<T> From<T> for WardenError
where
    T: Into<WardenErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Warden operations.
pub type WardenResult<T> = std::result::Result<T, WardenError>;
