//! Unified error type for mediascan.
//!
//! All crates funnel their failures into [`Error`]. Callers that need to
//! decide whether a failure is fatal use [`Error::kind`]: transient errors
//! skip a single file, persistence errors abort startup, invalid input is
//! rejected at the API boundary.

use std::fmt;

/// Unified error type covering all failure modes in mediascan.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "library").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The on-disk schema could not be brought up to date.
    #[error("Migration error: {0}")]
    Migration(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffprobe, mediainfo) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A metadata provider produced unusable output.
    #[error("Provider error [{provider}]: {message}")]
    Provider {
        /// Name of the provider.
        provider: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Disk stat failures, provider crashes. Logged, the file is skipped.
    Transient,
    /// Store unreachable or schema broken.
    Persistence,
    /// Rejected before any work starts.
    InvalidInput,
    /// Bugs and broken invariants.
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } | Error::Validation(_) => ErrorKind::InvalidInput,
            Error::Database { .. } | Error::Migration(_) => ErrorKind::Persistence,
            Error::Io { .. } | Error::Tool { .. } | Error::Provider { .. } => ErrorKind::Transient,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Provider`].
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("library", 7);
        assert_eq!(err.to_string(), "library not found: 7");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("path escapes library root".into());
        assert_eq!(err.to_string(), "Validation error: path escapes library root");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn database_display() {
        let err = Error::database("database is locked");
        assert!(err.to_string().contains("database is locked"));
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn migration_is_persistence() {
        let err = Error::Migration("cannot add column".into());
        assert_eq!(err.to_string(), "Migration error: cannot add column");
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffprobe", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffprobe]: exit code 1");
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn provider_display() {
        let err = Error::provider("mediainfo", "invalid JSON");
        assert_eq!(err.to_string(), "Provider error [mediainfo]: invalid JSON");
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn internal_display() {
        let err = Error::Internal("worker panicked".into());
        assert_eq!(err.to_string(), "Internal error: worker panicked");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
