//! Per-identity slow mode.
//!
//! Each identity carries two timestamps: the last accepted chat message and
//! the last profile edit. An action is allowed once the configured cooldown
//! for its class has elapsed since the matching timestamp. A `last_message`
//! in the future means the identity is timed out until then.

use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::identity::Identity;

/// Upper bound for any configured cooldown or timeout, in seconds.
pub const MAX_COOLDOWN_SECS: u64 = 365 * 24 * 60 * 60;

/// Which timestamp and cooldown an action is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    /// Chat messages, checked against `last_message`.
    Chat,
    /// Nick changes, checked against `last_changed`.
    Nick,
    /// Other profile edits, checked against `last_changed`.
    Other,
}

/// Result of a slow mode check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlowModeResult {
    /// Action is allowed.
    Allowed,
    /// The identity is timed out.
    Muted {
        /// End of the timeout.
        until: DateTime<Utc>,
    },
    /// The cooldown has not elapsed.
    Denied {
        /// Whole seconds until the action is allowed, rounded up.
        retry_after_secs: u64,
    },
}

impl SlowModeResult {
    /// Check if the action is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, SlowModeResult::Allowed)
    }
}

/// Clamp a configured number of seconds into a usable duration.
pub fn cooldown(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_COOLDOWN_SECS) as i64)
}

/// Cooldowns per action class.
#[derive(Debug, Clone, Copy)]
pub struct SlowMode {
    chat: Duration,
    nick: Duration,
    other: Duration,
}

impl SlowMode {
    /// Create with explicit cooldowns in seconds.
    pub fn new(chat_secs: u64, nick_secs: u64, other_secs: u64) -> Self {
        Self {
            chat: cooldown(chat_secs),
            nick: cooldown(nick_secs),
            other: cooldown(other_secs),
        }
    }

    /// Create from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.slow_mode_secs,
            config.nick_slow_secs,
            config.other_slow_secs,
        )
    }

    /// Cooldown for a class.
    pub fn limit(&self, class: ActionClass) -> Duration {
        match class {
            ActionClass::Chat => self.chat,
            ActionClass::Nick => self.nick,
            ActionClass::Other => self.other,
        }
    }

    /// Check an identity against the cooldown for `class` at `now`.
    ///
    /// The action is allowed at exactly `last + limit`.
    pub fn check(&self, identity: &Identity, class: ActionClass, now: DateTime<Utc>) -> SlowModeResult {
        if identity.is_muted(now) {
            return SlowModeResult::Muted {
                until: identity.last_message,
            };
        }

        let last = match class {
            ActionClass::Chat => identity.last_message,
            ActionClass::Nick | ActionClass::Other => identity.last_changed,
        };
        let ready = last + self.limit(class);

        if now < ready {
            let wait_ms = (ready - now).num_milliseconds().max(1);
            let secs = (wait_ms + 999) / 1000;
            SlowModeResult::Denied {
                retry_after_secs: secs as u64,
            }
        } else {
            SlowModeResult::Allowed
        }
    }
}

impl Default for SlowMode {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
