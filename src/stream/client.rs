//! HTTP client for the search stream endpoint
//!
//! Opens `POST {base_url}/api/v1/search/stream` and hands back the raw body
//! as a byte stream. Framing and cancellation live in the worker.

use bytes::Bytes;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use reqwest::Client;
use thiserror::Error;

use super::request::SearchRequest;
use crate::config::ApiConfig;

const STREAM_PATH: &str = "/api/v1/search/stream";

/// Errors that can occur while opening or reading a search stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SearchError {
    /// No usable backend configuration
    #[error("Search not configured: {0}")]
    NotConfigured(String),

    /// Network error during the request or while reading the body
    #[error("Network error: {0}")]
    Network(String),

    /// API returned an error response
    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    /// Failed to encode the request or decode the response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request was cancelled
    #[error("Request cancelled")]
    Cancelled,
}

/// Body of an open search stream
pub type ByteStream = BoxStream<'static, Result<Bytes, SearchError>>;

/// Something that can open a search stream
pub trait SearchBackend: Send + Sync {
    fn open<'a>(&'a self, request: &'a SearchRequest)
    -> BoxFuture<'a, Result<ByteStream, SearchError>>;
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl SearchClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), STREAM_PATH),
            token,
        }
    }

    /// Create a client from configuration
    ///
    /// Returns an error if the base URL is empty or not http(s)
    pub fn from_config(config: &ApiConfig) -> Result<Self, SearchError> {
        let base_url = config.base_url.trim();
        if base_url.is_empty() {
            return Err(SearchError::NotConfigured(
                "api.base_url is empty".to_string(),
            ));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SearchError::NotConfigured(format!(
                "api.base_url must start with http:// or https://, got {}",
                base_url
            )));
        }

        let token = config.token.clone().filter(|t| !t.trim().is_empty());
        Ok(Self::new(base_url, token))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SearchBackend for SearchClient {
    fn open<'a>(
        &'a self,
        request: &'a SearchRequest,
    ) -> BoxFuture<'a, Result<ByteStream, SearchError>> {
        Box::pin(async move {
            let body = serde_json::to_string(request).map_err(|e| SearchError::Parse(e.to_string()))?;

            let mut builder = self
                .client
                .post(&self.endpoint)
                .header("content-type", "application/json")
                .header("accept", "text/event-stream")
                .body(body);
            if let Some(token) = &self.token {
                builder = builder.bearer_auth(token);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| SearchError::Network(e.to_string()))?;

            // Check for HTTP errors
            if !response.status().is_success() {
                let code = response.status().as_u16();
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(SearchError::Api { code, message });
            }

            log::debug!("Search stream opened at {}", self.endpoint);
            Ok(response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| SearchError::Network(e.to_string())))
                .boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = SearchClient::new("https://search.example.com/", None);
        assert_eq!(
            client.endpoint(),
            "https://search.example.com/api/v1/search/stream"
        );
    }

    #[test]
    fn test_from_config_rejects_empty_url() {
        let config = ApiConfig {
            base_url: "   ".to_string(),
            token: None,
        };
        let result = SearchClient::from_config(&config);
        assert!(matches!(result, Err(SearchError::NotConfigured(_))));
    }

    #[test]
    fn test_from_config_rejects_non_http_url() {
        let config = ApiConfig {
            base_url: "ftp://search.example.com".to_string(),
            token: None,
        };
        assert!(SearchClient::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_drops_blank_token() {
        let config = ApiConfig {
            base_url: "http://localhost:8000".to_string(),
            token: Some("  ".to_string()),
        };
        let client = SearchClient::from_config(&config).unwrap();
        assert!(client.token.is_none());
    }

    #[test]
    fn test_error_display() {
        let err = SearchError::Api {
            code: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "API error (503): unavailable");
    }
}
