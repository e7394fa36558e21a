//! Error types for Parlor.
//!
//! Each service defines its own error enum next to the code that raises it
//! (`IdentityError`, `ModerationError`, ...). `ParlorError` covers the
//! process-level failures: startup, configuration and I/O.

use thiserror::Error;

/// Common error type for Parlor.
#[derive(Error, Debug)]
pub enum ParlorError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error for snapshots and envelopes.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for Parlor operations.
pub type Result<T> = std::result::Result<T, ParlorError>;

/// Broad classification of errors that reach a client.
///
/// Used to pick the log level and to decide what a client gets told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad format, length or missing argument. No mutation happened.
    Validation,
    /// Profanity, reserved name or rate limit. No mutation happened.
    Policy,
    /// Unknown id, name, message or command.
    NotFound,
    /// A non-moderator invoked a moderator command.
    Authorization,
    /// The emote catalog failed.
    Upstream,
}

impl ErrorCategory {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Policy => "policy",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Upstream => "upstream",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
