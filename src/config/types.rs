// Configuration type definitions

use serde::Deserialize;

use crate::cache::QuotaPolicy;

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_session_max_entries() -> usize {
    500
}

/// Assumed session storage quota: 10 MiB
fn default_session_quota_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_soft_ratio() -> f64 {
    0.8
}

/// Two hours
fn default_durable_ttl_secs() -> u64 {
    2 * 60 * 60
}

fn default_durable_max_entries() -> usize {
    1000
}

fn default_durable_quota_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_cleanup_probability() -> f64 {
    0.1
}

fn default_persist() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_threshold() -> usize {
    80
}

fn default_continuation_threshold() -> usize {
    50
}

/// Search backend connection
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent with every request, if any
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: default_base_url(),
            token: None,
        }
    }
}

/// Cache tier budgets
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_session_max_entries")]
    pub session_max_entries: usize,
    #[serde(default = "default_session_quota_bytes")]
    pub session_quota_bytes: usize,
    /// Fraction of each quota the tiers try to stay under
    #[serde(default = "default_soft_ratio")]
    pub session_soft_ratio: f64,
    #[serde(default = "default_durable_ttl_secs")]
    pub durable_ttl_secs: u64,
    #[serde(default = "default_durable_max_entries")]
    pub durable_max_entries: usize,
    #[serde(default = "default_durable_quota_bytes")]
    pub durable_quota_bytes: usize,
    /// Chance per durable write of sweeping expired entries
    #[serde(default = "default_cleanup_probability")]
    pub cleanup_probability: f64,
    /// Back the session and durable tiers with files
    #[serde(default = "default_persist")]
    pub persist: bool,
}

impl CacheConfig {
    pub fn session_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            max_entries: self.session_max_entries,
            quota_bytes: self.session_quota_bytes,
            soft_ratio: self.session_soft_ratio,
        }
    }

    pub fn durable_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            max_entries: self.durable_max_entries,
            quota_bytes: self.durable_quota_bytes,
            soft_ratio: self.session_soft_ratio,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            session_max_entries: default_session_max_entries(),
            session_quota_bytes: default_session_quota_bytes(),
            session_soft_ratio: default_soft_ratio(),
            durable_ttl_secs: default_durable_ttl_secs(),
            durable_max_entries: default_durable_max_entries(),
            durable_quota_bytes: default_durable_quota_bytes(),
            cleanup_probability: default_cleanup_probability(),
            persist: default_persist(),
        }
    }
}

/// Load-more budget
#[derive(Debug, Clone, Deserialize)]
pub struct LoadMoreConfig {
    /// Most load-more rounds per search
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Items the first stream must produce before load-more is offered
    #[serde(default = "default_initial_threshold")]
    pub initial_threshold: usize,
    /// New items a load-more round must produce to offer another one
    #[serde(default = "default_continuation_threshold")]
    pub continuation_threshold: usize,
}

impl Default for LoadMoreConfig {
    fn default() -> Self {
        LoadMoreConfig {
            max_attempts: default_max_attempts(),
            initial_threshold: default_initial_threshold(),
            continuation_threshold: default_continuation_threshold(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub load_more: LoadMoreConfig,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;
