//! Reserved-name and profanity pattern sets.
//!
//! Two JSON files feed the filters:
//!
//! - the nick filter, `{ "usernames": ["pattern", ...] }`, holding regular
//!   expressions for names nobody may take;
//! - the profanity list, `[{ "match": "term", "tags": [...], "severity": n }]`.
//!   Only entries tagged `racial` with severity above 2 are used. Each term
//!   is compiled into a fuzzy pattern that tolerates inserted spaces and
//!   punctuation, with `*` as a wildcard.
//!
//! A file that is missing or unreadable contributes no patterns; startup
//! never fails on filters.

use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tracing::{info, warn};

/// Minimum severity (exclusive) for a profanity entry to be enforced.
const MIN_SEVERITY: f64 = 2.0;

/// Tag selecting which profanity entries are enforced.
const ENFORCED_TAG: &str = "racial";

/// Separators tolerated between the letters of a filtered term.
const FUZZY_GAP: &str = r"[\s\-_.]*";

#[derive(Debug, Deserialize)]
struct NickFilterFile {
    #[serde(default)]
    usernames: Vec<String>,
}

/// One entry of the profanity list.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfanityEntry {
    /// The term, possibly with `|` alternatives and `*` wildcards.
    #[serde(rename = "match")]
    pub term: String,
    /// Category tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Severity score.
    #[serde(default)]
    pub severity: f64,
}

impl ProfanityEntry {
    fn is_enforced(&self) -> bool {
        self.severity > MIN_SEVERITY && self.tags.iter().any(|t| t == ENFORCED_TAG)
    }
}

fn is_fuzzy_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.'
}

/// Turn a literal term into a fuzzy, word-bounded pattern.
///
/// `a|b` becomes a non-capturing group, `*` becomes `.*`, and a gap of
/// spaces, dashes, underscores or dots is allowed between any two adjacent
/// letters, digits or dots.
pub fn fuzzy_pattern(term: &str) -> String {
    let grouped = if term.contains('|') {
        format!("(?:{term})")
    } else {
        term.to_string()
    };
    let chars: Vec<char> = grouped.replace('*', ".*").chars().collect();

    let mut pattern = String::from(r"\b");
    for (i, &c) in chars.iter().enumerate() {
        pattern.push(c);
        if let Some(&next) = chars.get(i + 1) {
            if is_fuzzy_char(c) && is_fuzzy_char(next) {
                pattern.push_str(FUZZY_GAP);
            }
        }
    }
    pattern.push_str(r"\b");
    pattern
}

fn compile(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("skipping filter pattern {:?}: {}", pattern, e);
            None
        }
    }
}

fn read_nick_patterns(path: &Path) -> Vec<String> {
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|data| {
            serde_json::from_str::<NickFilterFile>(&data).map_err(|e| e.to_string())
        });
    match parsed {
        Ok(file) => file.usernames,
        Err(e) => {
            warn!("nick filter {} not loaded: {}", path.display(), e);
            Vec::new()
        }
    }
}

fn read_profanity(path: &Path) -> Vec<ProfanityEntry> {
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|data| {
            serde_json::from_str::<Vec<ProfanityEntry>>(&data).map_err(|e| e.to_string())
        });
    match parsed {
        Ok(entries) => entries,
        Err(e) => {
            warn!("profanity filter {} not loaded: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Compiled filter patterns.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    reserved: Vec<Regex>,
    profanity: Vec<Regex>,
}

impl FilterSet {
    /// A filter set that accepts everything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from reserved-name regexes and raw profanity terms.
    pub fn new(reserved: &[String], profane_terms: &[String]) -> Self {
        let reserved = reserved
            .iter()
            .filter(|p| !p.is_empty())
            .filter_map(|p| compile(p))
            .collect();
        let profanity = profane_terms
            .iter()
            .filter(|t| !t.is_empty())
            .filter_map(|t| compile(&fuzzy_pattern(t)))
            .collect();
        Self {
            reserved,
            profanity,
        }
    }

    /// Load from the filter files plus extra reserved patterns.
    pub fn load(nick_filter: &Path, profanity_list: &Path, extra_reserved: &[String]) -> Self {
        let mut reserved = read_nick_patterns(nick_filter);
        reserved.extend(extra_reserved.iter().cloned());

        let terms: Vec<String> = read_profanity(profanity_list)
            .into_iter()
            .filter(ProfanityEntry::is_enforced)
            .map(|entry| entry.term)
            .collect();

        let set = Self::new(&reserved, &terms);
        info!(
            reserved = set.reserved.len(),
            profanity = set.profanity.len(),
            "loaded moderation filters"
        );
        set
    }

    /// First reserved or profane pattern matching a nickname.
    pub fn match_nick(&self, nick: &str) -> Option<&Regex> {
        self.reserved
            .iter()
            .chain(self.profanity.iter())
            .find(|regex| regex.is_match(nick))
    }

    /// First profane pattern matching a text.
    pub fn match_profanity(&self, text: &str) -> Option<&Regex> {
        self.profanity.iter().find(|regex| regex.is_match(text))
    }

    /// Number of reserved-name patterns.
    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    /// Number of profanity patterns.
    pub fn profanity_count(&self) -> usize {
        self.profanity.len()
    }
}
