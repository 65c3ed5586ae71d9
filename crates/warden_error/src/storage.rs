//! Identity store error types.

/// Kinds of identity store errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum StorageErrorKind {
    /// Failed to create the directory holding the store
    #[display("Failed to create store directory: {}", _0)]
    DirectoryCreation(String),
    /// Failed to read the store file
    #[display("Failed to read store: {}", _0)]
    FileRead(String),
    /// Failed to write or replace the store file
    #[display("Failed to write store: {}", _0)]
    FileWrite(String),
    /// Store contents could not be decoded
    #[display("Corrupt store: {}", _0)]
    Corrupt(String),
    /// Records could not be encoded
    #[display("Failed to encode records: {}", _0)]
    Serialize(String),
}

/// Storage error with location tracking.
///
/// # Examples
///
/// ```
/// use warden_error::{StorageError, StorageErrorKind};
///
/// let err = StorageError::new(StorageErrorKind::Corrupt("expected object".to_string()));
/// assert!(format!("{}", err).contains("Corrupt store"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Storage Error: {} at line {} in {}", kind, line, file)]
pub struct StorageError {
    /// The kind of error that occurred
    pub kind: StorageErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl StorageError {
    /// Create a new storage error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: StorageErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &StorageErrorKind {
        &self.kind
    }
}
