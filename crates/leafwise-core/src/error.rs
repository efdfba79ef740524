//! Error types for leafwise-core

use std::fmt;

use thiserror::Error;

/// Result type alias using leafwise-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in leafwise-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Session missing, invalid, or expired. Fatal to the collection scope.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Network failure or unexpected backend status. Operation-scoped.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Caller input rejected locally or by the backend
    #[error("Validation error: {0}")]
    Validation(String),

    /// Target entity is unknown to the backend (or to the local cache)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response could not be mapped to the expected shape
    #[error("Unexpected response shape: {0}")]
    Schema(String),

    /// Local ownership check refused a mutation before any network call
    #[error("Not permitted: {0}")]
    Forbidden(String),

    /// Classification or advice endpoint failure
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pending mutation withdrawn by the caller before it was sent
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Async runtime unavailable
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Classify this error for presentation.
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Auth(_) => FailureKind::Auth,
            Self::Transport(_) => FailureKind::Transport,
            Self::Validation(_) => FailureKind::Validation,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Schema(_) | Self::Serialization(_) => FailureKind::Schema,
            Self::Forbidden(_) => FailureKind::Forbidden,
            Self::Inference(_) => FailureKind::Inference,
            Self::Cancelled(_) => FailureKind::Cancelled,
            Self::Config(_) | Self::Runtime(_) | Self::Io(_) => FailureKind::Internal,
        }
    }

    /// Auth failures end the session scope; everything else is per operation.
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Whether the user may reasonably try the same operation again.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Rebuild an error of the given kind. Used by the in-memory gateway's
    /// failure injection.
    pub fn from_kind(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            FailureKind::Auth => Self::Auth(message),
            FailureKind::Transport => Self::Transport(message),
            FailureKind::Validation => Self::Validation(message),
            FailureKind::NotFound => Self::NotFound(message),
            FailureKind::Schema => Self::Schema(message),
            FailureKind::Forbidden => Self::Forbidden(message),
            FailureKind::Inference => Self::Inference(message),
            FailureKind::Cancelled => Self::Cancelled(message),
            FailureKind::Internal => Self::Runtime(message),
        }
    }
}

/// Coarse failure category forwarded to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Auth,
    Transport,
    Validation,
    NotFound,
    Schema,
    Forbidden,
    Inference,
    Cancelled,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::Validation => "validation",
            Self::NotFound => "not found",
            Self::Schema => "schema",
            Self::Forbidden => "forbidden",
            Self::Inference => "inference",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Cloneable summary of an [`Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&Error> for FailureReason {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}
