//! Text sanitization and the `CleanText` marker type.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Text that went through sanitization and every policy check.
///
/// Only `ModerationEngine::text_check` can build one, so anything that
/// persists or broadcasts user text and takes a `CleanText` cannot be
/// handed raw input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanText(String);

impl CleanText {
    pub(super) fn new(text: String) -> Self {
        Self(text)
    }

    /// Borrow the text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the text is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CleanText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>?").expect("tag pattern is valid"))
}

/// Normalize and strip user text.
///
/// NFKC-normalizes, removes HTML-like tags, drops everything outside
/// printable ASCII and trims the result.
pub fn sanitize(raw: &str) -> String {
    let normalized: String = raw.nfkc().collect();
    let untagged = tag_regex().replace_all(&normalized, "");
    untagged
        .chars()
        .filter(|c| (' '..='~').contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitize a nickname: `sanitize` plus only word characters and spaces.
pub fn sanitize_nick(raw: &str) -> String {
    sanitize(raw)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}
