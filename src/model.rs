//! Search identity and result elements shared by the cache and the stream.

mod key;
mod suggestion;

pub use key::{SearchKey, SearchMode, StorageKey};
pub use suggestion::KeywordSuggestion;
