//! Centralized error types for the workshop sync core.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the workshop library.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A context tried to reference a resource it already references.
    #[error("context {0} already refs this resource")]
    AlreadyReferenced(u64),

    /// A context tried to release a resource it never acquired.
    #[error("context {0} does not ref this resource")]
    NotReferenced(u64),

    /// A context was used after `cleanup()`.
    #[error("context '{0}' has already been cleaned up")]
    ContextClosed(String),

    /// No named context is registered under this name.
    #[error("no such named context: {0}")]
    NoSuchContext(String),

    /// No TOC provider is registered for the namespace.
    #[error("no such namespace: {0}")]
    UnknownNamespace(String),

    /// The namespace exists but has no TOC with this name.
    #[error("no TOC named '{name}' in namespace '{namespace}'")]
    UnknownTocName { namespace: String, name: String },

    /// A namespace provider of an unsupported shape was registered.
    #[error("bad provider for namespace '{0}'")]
    BadProvider(String),

    /// An identifier did not have the expected component structure.
    #[error("malformed {kind}: {id:?}")]
    MalformedId { kind: &'static str, id: String },

    /// The provider reported a non-success status, or its response could not
    /// be walked at all.
    #[error("protocol error (status {status})")]
    Protocol { status: String },

    /// The transport below the protocol adapter failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single item could not be parsed.
    #[error("failed to parse {item}: {reason}")]
    Parse { item: String, reason: String },

    /// A date field could not be interpreted.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The failure makes the whole batch untrustworthy, not just one item.
    #[error("critical sync failure: {0}")]
    Critical(String),

    /// A resource's activation hook failed.
    #[error("activation failed: {0}")]
    Activation(String),

    /// A TOC refresh helper failed.
    #[error("refresh failed: {0}")]
    Refresh(String),
}

/// Convenience alias for `Result<T, SyncError>`.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Parse` variant for a named item.
    pub fn parse(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            item: item.into(),
            reason: reason.into(),
        }
    }

    /// Errors of this class abort a reconciliation batch instead of skipping
    /// the offending item.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical(_))
    }
}
