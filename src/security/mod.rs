//! Address bans.
//!
//! Addresses are never stored in the clear. Each one is reduced to an
//! HMAC-SHA256 digest keyed by the server pepper, and only digests with a
//! ban timestamp are persisted.

mod ban;

use thiserror::Error;

use crate::error::ErrorCategory;

pub use ban::{hash_address, BanGate};

/// Ban gate errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// No pepper is configured, so addresses cannot be hashed.
    #[error("no pepper set")]
    NoSecretConfigured,

    /// The target has no live connection to take an address from.
    #[error("couldn't find any connections from that user")]
    NotConnected,
}

impl SecurityError {
    /// Error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SecurityError::NoSecretConfigured => ErrorCategory::Validation,
            SecurityError::NotConnected => ErrorCategory::NotFound,
        }
    }
}
