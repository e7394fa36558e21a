//! Connection bindings, presence, announcement and emote cache.

mod presence;
mod state;

use thiserror::Error;

use crate::emote::EmoteError;
use crate::error::ErrorCategory;

pub use presence::presence_rows;
pub use state::SessionState;

/// Session state errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The announcement already has that text.
    #[error("that's already the announcement")]
    Unchanged,

    /// Emote refresh failed.
    #[error(transparent)]
    Emote(#[from] EmoteError),
}

impl SessionError {
    /// Error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::Unchanged => ErrorCategory::Validation,
            SessionError::Emote(e) => e.category(),
        }
    }
}
