//! Emote catalog lookups.
//!
//! A catalog set is fetched as JSON and reduced to a map from emote name to
//! image URL. Fetching and shape checking are separate so a caller can run
//! the network part off the event loop.

mod catalog;

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::error::ErrorCategory;

pub use catalog::EmoteCatalog;

/// Emote errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmoteError {
    /// No set id given and none configured.
    #[error("no emote set in config")]
    NoEmoteSet,

    /// Malformed set id, or a response that is not an emote set.
    #[error("doesn't look like a valid emote set: {0}")]
    InvalidId(String),

    /// The catalog failed or answered with something other than JSON.
    #[error("failed to fetch emotes: {0}")]
    Upstream(String),
}

impl EmoteError {
    /// Error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EmoteError::NoEmoteSet | EmoteError::InvalidId(_) => ErrorCategory::Validation,
            EmoteError::Upstream(_) => ErrorCategory::Upstream,
        }
    }
}

/// Check a catalog set id: ASCII letters, digits, `_` and `-`.
pub fn is_valid_set_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Reduce a catalog response to `name -> https:{url}/1x.webp`.
///
/// Expects `{ "emotes": [{ "name": ..., "data": { "host": { "url": ... } } }] }`.
/// Any deviation rejects the whole set.
pub fn parse_emote_set(set_id: &str, body: &Value) -> Result<BTreeMap<String, String>, EmoteError> {
    let invalid = || EmoteError::InvalidId(set_id.to_string());

    let emotes = body
        .get("emotes")
        .and_then(Value::as_array)
        .ok_or_else(invalid)?;

    let mut map = BTreeMap::new();
    for emote in emotes {
        let name = emote.get("name").and_then(Value::as_str).ok_or_else(invalid)?;
        let url = emote
            .pointer("/data/host/url")
            .and_then(Value::as_str)
            .ok_or_else(invalid)?;
        map.insert(name.to_string(), format!("https:{url}/1x.webp"));
    }
    Ok(map)
}
