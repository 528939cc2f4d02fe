//! Error types for permission queries.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while collecting access rules or the process identity.
#[derive(Error, Debug)]
pub enum AccessError {
    /// Reading the object's permissions failed
    #[error("cannot read permissions of {path}: {reason}")]
    Permissions { path: PathBuf, reason: String },

    /// The process identity could not be resolved
    #[error("cannot resolve process identity: {reason}")]
    Identity { reason: String },

    /// The platform has no permission model we understand
    #[error("access probing is not supported on this platform")]
    Unsupported,

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AccessError {
    /// Create a permissions error
    pub fn permissions(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AccessError::Permissions {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an identity error
    pub fn identity(reason: impl Into<String>) -> Self {
        AccessError::Identity {
            reason: reason.into(),
        }
    }

    /// Check if this error comes from the OS refusing us
    pub fn is_access_denied(&self) -> bool {
        match self {
            AccessError::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}
