use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{KeywordSuggestion, SearchKey};

/// One backing store in the cache chain, fastest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Memory,
    Session,
    Durable,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Session => "session",
            Tier::Durable => "durable",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A cached search: the ordered suggestion list and when it was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: SearchKey,
    pub suggestions: Vec<KeywordSuggestion>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: SearchKey, suggestions: Vec<KeywordSuggestion>) -> Self {
        Self::with_timestamp(key, suggestions, Utc::now())
    }

    pub fn with_timestamp(
        key: SearchKey,
        suggestions: Vec<KeywordSuggestion>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            suggestions,
            created_at,
        }
    }

    /// Creation time in milliseconds since the Unix epoch, used for ordering
    pub fn created_ms(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    pub fn is_expired(&self, ttl: TimeDelta, now: DateTime<Utc>) -> bool {
        now - self.created_at > ttl
    }

    /// The words of every suggestion, in order
    pub fn words(&self) -> Vec<&str> {
        self.suggestions.iter().map(|s| s.word.as_str()).collect()
    }
}
