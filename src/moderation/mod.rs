//! Moderation: sanitization, name and profanity filters, slow mode.

pub mod filter;
pub mod policy;
pub mod sanitize;
pub mod slow_mode;

pub use filter::{fuzzy_pattern, FilterSet};
pub use policy::{ModerationEngine, ModerationError, TextKind, MIN_NICK_LEN};
pub use sanitize::{sanitize, sanitize_nick, CleanText};
pub use slow_mode::{cooldown, ActionClass, SlowMode, SlowModeResult};
