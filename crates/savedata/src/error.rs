//! Error types raised by the cache, storage backends, and codecs.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::key::TypeKey;

/// Errors surfaced by storage backend implementations.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("no persisted data for '{key}'")]
    NotFound { key: TypeKey },

    #[error("I/O error for '{key}': {source}")]
    Io {
        key: TypeKey,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("I/O error on storage root: {0}")]
    Root(#[source] Arc<std::io::Error>),

    #[error("storage backend lock was poisoned")]
    LockPoisoned,
}

impl StorageError {
    pub(crate) fn io(key: &TypeKey, source: std::io::Error) -> Self {
        Self::Io {
            key: key.clone(),
            source: Arc::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors raised while converting records to and from bytes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Operations that require the record to be in a particular state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    MarkDirty,
    SaveImmediately,
    Unload,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::MarkDirty => "mark_dirty",
            Operation::SaveImmediately => "save_immediately",
            Operation::Unload => "unload",
        };
        write!(f, "{}", label)
    }
}

/// A key whose write failed during a flush.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    pub key: TypeKey,
    pub error: SaveDataError,
}

/// Master error type for the save data cache.
#[derive(Debug, Clone, Error)]
pub enum SaveDataError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The caller asked for a transition the record's current state does not
    /// allow. This is a programming error on the caller's side.
    #[error("cannot {op} '{key}' while it is {state}")]
    InvalidState {
        key: TypeKey,
        state: crate::RecordState,
        op: Operation,
    },

    #[error("invalid type key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("record cached under '{key}' has a different type than requested")]
    KeyTypeMismatch { key: TypeKey },

    #[error("record cache lock was poisoned")]
    LockPoisoned,

    #[error("load task for '{key}' ended without producing a record")]
    LoadAborted { key: TypeKey },

    #[error("write task for '{key}' ended without reporting a result")]
    WriteAborted { key: TypeKey },

    #[error("{} write(s) failed during flush", failures.len())]
    Flush { failures: Vec<WriteFailure> },

    #[error("no tokio runtime available; build the manager inside a runtime or pass one")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, SaveDataError>;
