//! Error types for Cloudtape core operations.
//!
//! Every fallible operation in the crate returns [`Result`], whose error is a
//! single [`Error`] enum with one nested enum per domain:
//!
//! - [`RemoteError`] for failures reaching the remote store
//! - [`CacheError`] for content cache keys and materialization
//! - [`PlaylistError`] for XSPF documents and playlist storage
//! - [`PlaybackError`] for the playback controller and media engine
//! - [`FileSystemError`] for local file system operations
//!
//! [`Error::kind`] flattens these into an [`ErrorKind`] for callers that only
//! need to branch on the category (for example to pick a UI message).
//!
//! Errors carry their reasons as strings so that [`Error`] is `Clone`: a single
//! failed fetch can be handed to every caller waiting on it.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Flat classification of errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// A blank or malformed identifier was supplied.
    InvalidKey,
    /// The remote store could not be reached or refused the request.
    RemoteUnavailable,
    /// Content could not be materialized into the cache.
    CacheMiss,
    /// A playlist document is not well-formed.
    MalformedDocument,
    /// An index fell outside its collection.
    IndexOutOfRange,
    /// A local file system operation failed.
    FileSystem,
    /// Configuration is invalid or unreadable.
    Configuration,
    /// Data could not be serialized or deserialized.
    Serialization,
    /// The media engine rejected a command.
    Engine,
    /// The operation was cancelled by the caller.
    Cancelled,
}

/// Errors that can occur in Cloudtape core operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Remote store error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Content cache error.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Playlist document or storage error.
    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    /// Playback controller error.
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// File system operation failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The operation was cancelled.
    #[error("Operation cancelled: {operation}")]
    Cancelled {
        /// Name of the cancelled operation.
        operation: String,
    },
}

/// Errors reaching the remote store.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// A listing, metadata or fetch request failed.
    #[error("Remote store unavailable during {operation} of '{id}': {reason}")]
    Unavailable {
        /// The operation that failed (`list`, `metadata`, `fetch`).
        operation: &'static str,
        /// The remote id involved (empty for the root).
        id: String,
        /// Transport or store reason.
        reason: String,
    },

    /// The remote store does not know the requested id.
    #[error("Remote item not found: '{id}'")]
    NotFound {
        /// The unknown remote id.
        id: String,
    },

    /// A parent chain loops back onto itself.
    #[error("Remote parent chain of '{id}' contains a cycle")]
    ParentCycle {
        /// The id whose path was being resolved.
        id: String,
    },
}

/// Errors from the content cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The key is blank or otherwise unusable.
    #[error("Invalid cache key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The content could not be materialized.
    #[error("Cache miss for '{key}': {reason}")]
    Miss {
        /// The remote id.
        key: String,
        /// Why the content is unavailable.
        reason: String,
    },

    /// The cache directory could not be prepared.
    #[error("Cache initialization failed: {reason}")]
    InitializationFailed {
        /// Why initialization failed.
        reason: String,
    },
}

/// Errors from playlist documents and playlist storage.
#[derive(Debug, Clone, Error)]
pub enum PlaylistError {
    /// The document is not well-formed XML or lacks the playlist root.
    #[error("Malformed playlist document: {reason}")]
    MalformedDocument {
        /// Parser diagnostic.
        reason: String,
    },

    /// The document could not be written.
    #[error("Failed to encode playlist '{title}': {reason}")]
    EncodeFailed {
        /// Title of the playlist being encoded.
        title: String,
        /// Writer diagnostic.
        reason: String,
    },

    /// No playlist exists at the given library position.
    #[error("Playlist not found at index {index}")]
    NotFound {
        /// The requested index.
        index: usize,
    },
}

/// Errors from the playback controller and the media engine.
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    /// An index fell outside its collection.
    #[error("Index {index} out of range for collection of length {len}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Length of the collection.
        len: usize,
    },

    /// The media engine rejected a command.
    #[error("Media engine failed to {command}: {reason}")]
    EngineFailed {
        /// The command sent to the engine.
        command: &'static str,
        /// Engine diagnostic.
        reason: String,
    },
}

/// File system errors with path context.
#[derive(Debug, Clone, Error)]
pub enum FileSystemError {
    /// Path does not exist.
    #[error("Path not found: {path}")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// Reading failed.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// The path being read.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Writing failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// The path being written.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Directory creation failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// The directory path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote(_) => ErrorKind::RemoteUnavailable,
            Self::Cache(CacheError::InvalidKey { .. }) => ErrorKind::InvalidKey,
            Self::Cache(CacheError::Miss { .. }) => ErrorKind::CacheMiss,
            Self::Cache(CacheError::InitializationFailed { .. }) => ErrorKind::FileSystem,
            Self::Playlist(PlaylistError::MalformedDocument { .. }) => {
                ErrorKind::MalformedDocument
            }
            Self::Playlist(PlaylistError::EncodeFailed { .. }) => ErrorKind::Serialization,
            Self::Playlist(PlaylistError::NotFound { .. }) => ErrorKind::IndexOutOfRange,
            Self::Playback(PlaybackError::IndexOutOfRange { .. }) => ErrorKind::IndexOutOfRange,
            Self::Playback(PlaybackError::EngineFailed { .. }) => ErrorKind::Engine,
            Self::FileSystem(_) => ErrorKind::FileSystem,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote(RemoteError::Unavailable { .. }) | Self::Cache(CacheError::Miss { .. })
        )
    }

    /// Suggested delay before retrying, if the error is retryable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Remote(RemoteError::Unavailable { .. }) => Some(5),
            Self::Cache(CacheError::Miss { .. }) => Some(2),
            _ => None,
        }
    }

    /// Shorthand for a remote failure.
    pub fn remote(operation: &'static str, id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Remote(RemoteError::Unavailable {
            operation,
            id: id.into(),
            reason: reason.to_string(),
        })
    }

    /// Shorthand for a cache miss.
    pub fn cache_miss(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Cache(CacheError::Miss {
            key: key.into(),
            reason: reason.to_string(),
        })
    }

    /// Shorthand for a malformed playlist document.
    pub fn malformed(reason: impl ToString) -> Self {
        Self::Playlist(PlaylistError::MalformedDocument {
            reason: reason.to_string(),
        })
    }

    /// Shorthand for a cancelled operation.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Converts an I/O error for read operations.
pub(crate) fn read_error(path: &Path, e: &io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        return Error::FileSystem(FileSystemError::NotFound {
            path: path.to_path_buf(),
        });
    }
    Error::FileSystem(FileSystemError::ReadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Converts an I/O error for write operations.
pub(crate) fn write_error(path: &Path, e: &io::Error) -> Error {
    Error::FileSystem(FileSystemError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Converts an I/O error for directory creation.
pub(crate) fn create_dir_error(path: &Path, e: &io::Error) -> Error {
    Error::FileSystem(FileSystemError::CreateDirFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_display() {
        let err = Error::Cache(CacheError::InvalidKey {
            key: String::new(),
            reason: "key is blank".to_string(),
        });
        assert_eq!(err.to_string(), "Invalid cache key '': key is blank");
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn test_remote_error_kind_and_retry() {
        let err = Error::remote("list", "folder-1", "connection reset");
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(5));
        assert!(err.to_string().contains("folder-1"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_parent_cycle_is_not_retryable() {
        let err = Error::Remote(RemoteError::ParentCycle {
            id: "a".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cache_miss_kind() {
        let err = Error::cache_miss("abc", "not a regular file");
        assert_eq!(err.kind(), ErrorKind::CacheMiss);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_malformed_document_kind() {
        let err = Error::malformed("unexpected end of input");
        assert_eq!(err.kind(), ErrorKind::MalformedDocument);
        assert!(!err.is_retryable());
        assert_eq!(err.retry_delay_secs(), None);
    }

    #[test]
    fn test_file_system_error_display() {
        let err = Error::FileSystem(FileSystemError::WriteFailed {
            path: PathBuf::from("/test/path"),
            reason: "permission denied".to_string(),
        });
        assert!(err.to_string().contains("/test/path"));
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(err.kind(), ErrorKind::FileSystem);
    }

    #[test]
    fn test_read_error_maps_not_found() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = read_error(Path::new("/missing"), &io_err);
        assert!(matches!(
            err,
            Error::FileSystem(FileSystemError::NotFound { .. })
        ));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse = serde_json::from_str::<u32>("not a number");
        let err: Error = parse.expect_err("should fail").into();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn test_errors_are_clone() {
        let err = Error::cancelled("build");
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
        assert_eq!(cloned.kind(), ErrorKind::Cancelled);
    }
}
