use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::types::ActorId;

/// Unified error type for tandem operations
#[derive(Debug, Error)]
pub enum TandemError {
    // Validation errors
    #[error("Invalid actor id '{0}': expected 1-128 ASCII alphanumerics, '-' or '_'")]
    InvalidActorId(String),

    #[error("Malformed sync message: {0}")]
    InvalidMessage(String),

    #[error("Invalid change {actor}/{seq}: {reason}")]
    InvalidChange {
        actor: ActorId,
        seq: u64,
        reason: String,
    },

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    // Causality errors
    #[error("Actor '{0}' cannot merge with itself")]
    SelfMerge(ActorId),

    #[error("Change {actor}/{seq} conflicts with the change already recorded at that sequence number")]
    SequenceConflict { actor: ActorId, seq: u64 },

    // Connection errors
    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Connection cannot {action} while {state}")]
    ConnectionState { action: String, state: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias for tandem operations
pub type Result<T> = std::result::Result<T, TandemError>;

/// Broad classification of a [`TandemError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Malformed change, message, path, actor id or snapshot. State is untouched.
    Validation,
    /// Self-merge or sequence-number regression. State is untouched.
    Causality,
    /// Operation not allowed in the connection's current state.
    Connection,
    /// Encoding or decoding failure.
    Serialization,
    /// Filesystem failure.
    Io,
    /// Configuration failure.
    Config,
}

impl TandemError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TandemError::InvalidActorId(_)
            | TandemError::InvalidMessage(_)
            | TandemError::InvalidChange { .. }
            | TandemError::InvalidPath(_)
            | TandemError::InvalidSnapshot(_) => ErrorKind::Validation,
            TandemError::SelfMerge(_) | TandemError::SequenceConflict { .. } => {
                ErrorKind::Causality
            }
            TandemError::ConnectionClosed | TandemError::ConnectionState { .. } => {
                ErrorKind::Connection
            }
            TandemError::Json(_) => ErrorKind::Serialization,
            TandemError::Io(_) | TandemError::FileRead { .. } | TandemError::FileWrite { .. } => {
                ErrorKind::Io
            }
            TandemError::ConfigParse(_)
            | TandemError::ConfigSerialize(_)
            | TandemError::NoConfigDir => ErrorKind::Config,
        }
    }

    /// Shorthand for building an [`TandemError::InvalidChange`].
    pub(crate) fn invalid_change(actor: &ActorId, seq: u64, reason: impl Into<String>) -> Self {
        TandemError::InvalidChange {
            actor: actor.clone(),
            seq,
            reason: reason.into(),
        }
    }

    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}

/// A serializable representation of TandemError for IPC
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Broad classification
    pub category: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&TandemError> for SerializableError {
    fn from(err: &TandemError) -> Self {
        let kind = match err {
            TandemError::InvalidActorId(_) => "InvalidActorId",
            TandemError::InvalidMessage(_) => "InvalidMessage",
            TandemError::InvalidChange { .. } => "InvalidChange",
            TandemError::InvalidPath(_) => "InvalidPath",
            TandemError::InvalidSnapshot(_) => "InvalidSnapshot",
            TandemError::SelfMerge(_) => "SelfMerge",
            TandemError::SequenceConflict { .. } => "SequenceConflict",
            TandemError::ConnectionClosed => "ConnectionClosed",
            TandemError::ConnectionState { .. } => "ConnectionState",
            TandemError::Json(_) => "Json",
            TandemError::Io(_) => "Io",
            TandemError::FileRead { .. } => "FileRead",
            TandemError::FileWrite { .. } => "FileWrite",
            TandemError::ConfigParse(_) => "ConfigParse",
            TandemError::ConfigSerialize(_) => "ConfigSerialize",
            TandemError::NoConfigDir => "NoConfigDir",
        }
        .to_string();

        let path = match err {
            TandemError::FileRead { path, .. } => Some(path.clone()),
            TandemError::FileWrite { path, .. } => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            category: err.kind(),
            message: err.to_string(),
            path,
        }
    }
}

impl From<TandemError> for SerializableError {
    fn from(err: TandemError) -> Self {
        SerializableError::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let actor = ActorId::new("alice").unwrap();
        assert_eq!(
            TandemError::SelfMerge(actor.clone()).kind(),
            ErrorKind::Causality
        );
        assert_eq!(
            TandemError::invalid_change(&actor, 3, "bad op").kind(),
            ErrorKind::Validation
        );
        assert_eq!(TandemError::ConnectionClosed.kind(), ErrorKind::Connection);
        assert_eq!(TandemError::NoConfigDir.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_serializable_error() {
        let actor = ActorId::new("bob").unwrap();
        let err = TandemError::SequenceConflict { actor, seq: 4 };
        let ser = err.to_serializable();
        assert_eq!(ser.kind, "SequenceConflict");
        assert_eq!(ser.category, ErrorKind::Causality);
        assert!(ser.message.contains("bob/4"));
        assert!(ser.path.is_none());
    }
}
