//! Error types for the Warden workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All constructors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use warden_error::{ConfigError, WardenResult};
//!
//! fn load() -> WardenResult<()> {
//!     Err(ConfigError::new("Missing [directory] section"))?
//! }
//!
//! assert!(load().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod security;
mod storage;

pub use config::ConfigError;
pub use error::{WardenError, WardenErrorKind, WardenResult};
pub use security::{SecurityError, SecurityErrorKind, SecurityResult};
pub use storage::{StorageError, StorageErrorKind};
