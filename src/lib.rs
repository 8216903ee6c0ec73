//! scattershot library - Incremental search cache and streaming ingestion
//!
//! This library exposes the cache tiers, the stream transport and the session
//! controller that the `scattershot` binary is built from.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod session;
pub mod stream;

// Re-export commonly used types for convenience
pub use cache::CacheChain;
pub use config::Config;
pub use error::ScattershotError;
pub use model::{KeywordSuggestion, SearchKey, SearchMode};
pub use session::SessionController;
