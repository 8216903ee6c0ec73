//! Canonical search identity
//!
//! A `SearchKey` is the only identity the cache knows about. Queries are
//! normalized on construction so whitespace differences never produce two
//! entries for the same search.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator users type between phrases of a multi-phrase query
const PHRASE_SEPARATOR: char = '+';

/// Separator written between phrases of a normalized query
const CANONICAL_SEPARATOR: &str = " + ";

/// Digest bytes kept in a storage key: 128 bits, 32 hex characters.
/// For n distinct keys the collision probability is about n^2 / 2^129.
const STORAGE_KEY_BYTES: usize = 16;

/// How the phrases of a multi-phrase query are combined by the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Suggestions related to any of the phrases
    #[default]
    Or,
    /// Suggestions related to all of the phrases at once
    And,
}

impl SearchMode {
    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Or => "or",
            SearchMode::And => "and",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "or" => Ok(SearchMode::Or),
            "and" => Ok(SearchMode::And),
            other => Err(format!("unknown search mode '{}' (expected 'or' or 'and')", other)),
        }
    }
}

/// Normalized identity of a cached search
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchKey {
    project_id: String,
    query: String,
    mode: SearchMode,
}

impl SearchKey {
    /// Build a key, normalizing the project id and the query
    pub fn new(project_id: &str, query: &str, mode: SearchMode) -> Self {
        Self {
            project_id: collapse_whitespace(project_id),
            query: normalize_query(query),
            mode,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The normalized query text
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Whether the normalized query has no phrases at all
    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }

    /// Individual phrases of the normalized query
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.query
            .split(CANONICAL_SEPARATOR)
            .filter(|phrase| !phrase.is_empty())
    }

    /// Deterministic storage key for this search
    ///
    /// Each field is length-prefixed before hashing so field boundaries can
    /// never be shifted to produce the same byte sequence.
    pub fn storage_key(&self) -> StorageKey {
        let mut hasher = Sha256::new();
        for field in [
            self.project_id.as_str(),
            self.query.as_str(),
            self.mode.as_str(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        let digest = hasher.finalize();
        StorageKey(hex::encode(&digest[..STORAGE_KEY_BYTES]))
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.project_id, self.mode, self.query)
    }
}

/// Hex digest under which a search is stored in every tier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a raw query: trim each phrase, collapse whitespace runs and drop
/// empty phrases.
pub fn normalize_query(raw: &str) -> String {
    raw.split(PHRASE_SEPARATOR)
        .map(collapse_whitespace)
        .filter(|phrase| !phrase.is_empty())
        .collect::<Vec<_>>()
        .join(CANONICAL_SEPARATOR)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod key_tests;
