//! Error types for HoardBase core.

use hoardbase_codec::CodecError;
use hoardbase_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in HoardBase core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error from the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a HoardBase database, or has an unsupported version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A collection (or database file) with this name already exists.
    #[error("already exists: {name}")]
    AlreadyExists {
        /// Name of the existing object.
        name: String,
    },

    /// Collection not found.
    #[error("collection not found: {name}")]
    NotFound {
        /// Name (or id) of the collection.
        name: String,
    },

    /// The input cannot be stored.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// A stored record failed its integrity checks.
    #[error("corrupt record at offset {offset}: {message}")]
    CorruptRecord {
        /// File offset of the damaged slot.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// Another handle has the database file open.
    #[error("database already open: another handle has exclusive access")]
    AlreadyOpen,

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// A write would give two documents the same value under a unique
    /// constraint.
    #[error("collection {collection}: duplicate value for unique {constraint}")]
    UniqueViolation {
        /// Collection written to.
        collection: String,
        /// `content hash`, or the index path.
        constraint: String,
    },

    /// No document with the given id.
    #[error("document {id} not found in collection {collection}")]
    DocumentNotFound {
        /// Collection searched.
        collection: String,
        /// The missing id.
        id: u64,
    },
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    /// Creates a collection not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a corrupt record error.
    pub fn corrupt(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            offset,
            message: message.into(),
        }
    }

    /// Creates a unique violation error.
    pub fn unique_violation(collection: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::UniqueViolation {
            collection: collection.into(),
            constraint: constraint.into(),
        }
    }

    /// Maps a codec error raised while encoding caller input.
    pub(crate) fn from_encode(err: CodecError) -> Self {
        Self::validation(err.to_string())
    }

    /// Maps a codec error raised while decoding stored bytes.
    pub(crate) fn from_decode(offset: u64, err: CodecError) -> Self {
        Self::corrupt(offset, err.to_string())
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => Self::Io(e),
            StorageError::ReadPastEnd { offset, len, size } => Self::corrupt(
                offset,
                format!("slot extends past end of file ({len} bytes, file is {size})"),
            ),
            StorageError::Locked(_) => Self::AlreadyOpen,
            other => Self::Io(io::Error::new(io::ErrorKind::InvalidInput, other.to_string())),
        }
    }
}
