//! Error types for Keel core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors, while higher-level code can use `anyhow` for
//! convenient error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using KeelError
pub type Result<T> = std::result::Result<T, KeelError>;

/// Core error types for Keel operations.
///
/// Most of these never escape the store: load failures degrade to defaults
/// and save failures are logged (and prompted for in interactive sessions)
/// before being handed back to the caller.
#[derive(Error, Debug)]
pub enum KeelError {
    // === Settings File Errors ===
    /// The settings file could not be decoded
    #[error("failed to decode settings at {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// The settings instance could not be encoded
    #[error("failed to encode settings: {0}")]
    Encode(String),

    /// The settings file could not be created, written or flushed
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file stayed locked by another process for the whole poll
    #[error("{path} still busy after {attempts} attempts")]
    FileBusy { path: PathBuf, attempts: u32 },

    // === Filesystem Errors ===
    /// The settings directory could not be created
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The permission probe refused the operation
    #[error("permission denied: {operation} on {path}")]
    PermissionDenied { operation: String, path: PathBuf },

    // === Watch Errors ===
    /// The file-change subscription could not be created
    #[error("file watch error: {0}")]
    Watch(String),

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    Config { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeelError {
    /// Returns true if this error is likely to go away on its own
    /// (another process holding the file, a flaky share).
    pub fn is_transient(&self) -> bool {
        match self {
            KeelError::FileBusy { .. } => true,
            KeelError::Write { source, .. } | KeelError::DirectoryCreate { source, .. } => {
                is_transient_io(source)
            }
            KeelError::Io(err) => is_transient_io(err),
            _ => false,
        }
    }

    /// Returns true if retrying the operation can make sense
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KeelError::Io(_)
                | KeelError::Write { .. }
                | KeelError::DirectoryCreate { .. }
                | KeelError::FileBusy { .. }
                | KeelError::PermissionDenied { .. }
        )
    }

    /// Create a decode error
    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        KeelError::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a write error
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KeelError::Write {
            path: path.into(),
            source,
        }
    }
}

fn is_transient_io(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
    )
}

impl From<serde_json::Error> for KeelError {
    fn from(err: serde_json::Error) -> Self {
        KeelError::Encode(err.to_string())
    }
}

impl From<notify::Error> for KeelError {
    fn from(err: notify::Error) -> Self {
        KeelError::Watch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_is_transient() {
        let err = KeelError::FileBusy {
            path: PathBuf::from("/tmp/app.json"),
            attempts: 30_000,
        };
        assert!(err.is_transient());

        let err = KeelError::write("/tmp/app.json", io::Error::from(io::ErrorKind::WouldBlock));
        assert!(err.is_transient());

        let err = KeelError::write(
            "/tmp/app.json",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(!err.is_transient());

        let err = KeelError::decode("/tmp/app.json", "expected value at line 1");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(KeelError::PermissionDenied {
            operation: "write".to_string(),
            path: PathBuf::from("/etc/app.json"),
        }
        .is_recoverable());
        assert!(!KeelError::Encode("bad map key".to_string()).is_recoverable());
        assert!(!KeelError::Config {
            reason: "unknown field".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = KeelError::FileBusy {
            path: PathBuf::from("app.json"),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "app.json still busy after 3 attempts");
    }
}
