//! Keyword suggestions produced by the search backend

use serde::{Deserialize, Serialize};

use super::SearchMode;

/// Longest word accepted from the producer, in characters
pub const MAX_WORD_CHARS: usize = 100;

/// Prefixes of producer output that is an apology or an error message rather
/// than a keyword. Compared case-insensitively.
const REFUSAL_PREFIXES: &[&str] = &[
    "i'm sorry",
    "i am sorry",
    "sorry",
    "i cannot",
    "i can't",
    "i apologize",
    "as an ai",
    "error:",
];

/// A single suggestion, kept in the order the producer emitted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordSuggestion {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<SearchMode>,
    /// Producer metadata this client does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl KeywordSuggestion {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            match_type: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Whether this suggestion is fit to show and cache
    ///
    /// Rejects empty words, words over `MAX_WORD_CHARS` characters, and
    /// apology or error shaped text.
    pub fn is_well_formed(&self) -> bool {
        let word = self.word.trim();
        if word.is_empty() || word.chars().count() > MAX_WORD_CHARS {
            return false;
        }
        let lowered = word.to_lowercase();
        !REFUSAL_PREFIXES
            .iter()
            .any(|prefix| lowered.starts_with(prefix))
    }
}
