//! The moderation pipeline applied to every piece of user text.

use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::filter::FilterSet;
use super::sanitize::{sanitize, sanitize_nick, CleanText};
use super::slow_mode::{ActionClass, SlowMode, SlowModeResult};
use crate::config::Config;
use crate::error::ErrorCategory;
use crate::identity::{is_hex_color, Identity};

/// Minimum nickname length.
pub const MIN_NICK_LEN: usize = 2;

/// Moderation errors. None of them implies a mutation happened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModerationError {
    /// Reserved or profane nickname.
    #[error("can't be named that")]
    NameRejected,

    /// Profane content.
    #[error("watch your profanity")]
    ContentRejected,

    /// The identity is timed out.
    #[error("ur in timeout rn")]
    StillMuted {
        /// End of the timeout.
        until: DateTime<Utc>,
    },

    /// Cooldown not elapsed.
    #[error("you're doing that too fast, wait {remaining_secs} seconds.")]
    TooFast {
        /// Whole seconds left, rounded up.
        remaining_secs: u64,
    },

    /// Nothing left after sanitizing.
    #[error("message is empty")]
    Empty,

    /// Over the length limit.
    #[error("too long, keep it under {max} characters")]
    TooLong {
        /// Maximum length.
        max: usize,
    },

    /// Under the length minimum.
    #[error("must be at least {min} characters")]
    TooShort {
        /// Minimum length.
        min: usize,
    },

    /// A nickname with spaces.
    #[error("no spaces in usernames")]
    Whitespace,

    /// A color that is not `#RRGGBB`.
    #[error("invalid hex code. please use format #RRGGBB")]
    InvalidColor,
}

impl ModerationError {
    /// Error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ModerationError::NameRejected
            | ModerationError::ContentRejected
            | ModerationError::StillMuted { .. }
            | ModerationError::TooFast { .. } => ErrorCategory::Policy,
            _ => ErrorCategory::Validation,
        }
    }
}

/// What a piece of text is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    /// A chat message.
    Chat,
    /// A status line.
    Status,
    /// A nickname.
    Nick,
    /// A `#RRGGBB` color.
    Color,
    /// A server announcement. May be empty.
    Announcement,
}

impl TextKind {
    /// Slow mode class used for this kind of text.
    pub fn action_class(&self) -> ActionClass {
        match self {
            TextKind::Chat | TextKind::Announcement => ActionClass::Chat,
            TextKind::Nick => ActionClass::Nick,
            TextKind::Status | TextKind::Color => ActionClass::Other,
        }
    }
}

/// Sanitization, filters and slow mode bundled together.
#[derive(Debug, Clone)]
pub struct ModerationEngine {
    filters: FilterSet,
    slow_mode: SlowMode,
    max_msg_len: usize,
    max_nick_len: usize,
    max_status_len: usize,
}

impl ModerationEngine {
    /// Create from configuration and an already loaded filter set.
    pub fn new(config: &Config, filters: FilterSet) -> Self {
        Self {
            filters,
            slow_mode: SlowMode::from_config(config),
            max_msg_len: config.max_msg_len,
            max_nick_len: config.max_nick_len,
            max_status_len: config.max_status_len,
        }
    }

    /// Create from configuration, loading the filter files it names.
    pub fn load(config: &Config) -> Self {
        let filters = FilterSet::load(
            Path::new(&config.nick_filter_path),
            Path::new(&config.profanity_filter_path),
            &config.nick_reserved,
        );
        Self::new(config, filters)
    }

    /// Get the slow mode settings.
    pub fn slow_mode(&self) -> &SlowMode {
        &self.slow_mode
    }

    /// Reject reserved or profane nicknames.
    pub fn nick_check(&self, nick: &str) -> Result<(), ModerationError> {
        match self.filters.match_nick(nick) {
            Some(_) => Err(ModerationError::NameRejected),
            None => Ok(()),
        }
    }

    /// Reject profane text.
    pub fn prof_check(&self, text: &str) -> Result<(), ModerationError> {
        match self.filters.match_profanity(text) {
            Some(_) => Err(ModerationError::ContentRejected),
            None => Ok(()),
        }
    }

    /// Slow mode check at the current time.
    pub fn time_check(&self, identity: &Identity, class: ActionClass) -> Result<(), ModerationError> {
        self.time_check_at(identity, class, Utc::now())
    }

    /// Slow mode check at `now`.
    pub fn time_check_at(
        &self,
        identity: &Identity,
        class: ActionClass,
        now: DateTime<Utc>,
    ) -> Result<(), ModerationError> {
        match self.slow_mode.check(identity, class, now) {
            SlowModeResult::Allowed => Ok(()),
            SlowModeResult::Muted { until } => Err(ModerationError::StillMuted { until }),
            SlowModeResult::Denied { retry_after_secs } => Err(ModerationError::TooFast {
                remaining_secs: retry_after_secs,
            }),
        }
    }

    /// Run the full pipeline at the current time.
    pub fn text_check(
        &self,
        raw: &str,
        identity: Option<&Identity>,
        kind: TextKind,
    ) -> Result<CleanText, ModerationError> {
        self.text_check_at(raw, identity, kind, Utc::now())
    }

    /// Sanitize, validate, filter and (with an identity) rate-limit `raw`.
    pub fn text_check_at(
        &self,
        raw: &str,
        identity: Option<&Identity>,
        kind: TextKind,
        now: DateTime<Utc>,
    ) -> Result<CleanText, ModerationError> {
        let text = match kind {
            TextKind::Nick => sanitize_nick(raw),
            _ => sanitize(raw),
        };
        let len = text.chars().count();

        let text = match kind {
            TextKind::Chat => {
                if text.is_empty() {
                    return Err(ModerationError::Empty);
                }
                if len > self.max_msg_len {
                    return Err(ModerationError::TooLong {
                        max: self.max_msg_len,
                    });
                }
                self.prof_check(&text)?;
                text
            }
            TextKind::Announcement => {
                if len > self.max_msg_len {
                    return Err(ModerationError::TooLong {
                        max: self.max_msg_len,
                    });
                }
                self.prof_check(&text)?;
                text
            }
            TextKind::Status => {
                if len > self.max_status_len {
                    return Err(ModerationError::TooLong {
                        max: self.max_status_len,
                    });
                }
                self.prof_check(&text)?;
                text
            }
            TextKind::Nick => {
                if text.contains(char::is_whitespace) {
                    return Err(ModerationError::Whitespace);
                }
                if len < MIN_NICK_LEN {
                    return Err(ModerationError::TooShort { min: MIN_NICK_LEN });
                }
                if len > self.max_nick_len {
                    return Err(ModerationError::TooLong {
                        max: self.max_nick_len,
                    });
                }
                self.nick_check(&text)?;
                text
            }
            TextKind::Color => {
                if !is_hex_color(&text) {
                    return Err(ModerationError::InvalidColor);
                }
                text.to_uppercase()
            }
        };

        if let Some(identity) = identity {
            self.time_check_at(identity, kind.action_class(), now)?;
        }

        Ok(CleanText::new(text))
    }
}
