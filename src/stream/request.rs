//! Request body of the search stream endpoint

use serde::Serialize;

use crate::model::{SearchKey, SearchMode};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub project_id: String,
    pub search_mode: SearchMode,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_load_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_words: Vec<String>,
}

impl SearchRequest {
    pub fn initial(key: &SearchKey) -> Self {
        Self {
            query: key.query().to_string(),
            project_id: key.project_id().to_string(),
            search_mode: key.mode(),
            is_load_more: false,
            session_id: None,
            exclude_words: Vec::new(),
        }
    }

    /// Continue the server session it names
    pub fn resume(key: &SearchKey, session_id: impl Into<String>) -> Self {
        Self {
            is_load_more: true,
            session_id: Some(session_id.into()),
            ..Self::initial(key)
        }
    }

    /// Fresh load-more round that must not repeat `exclude_words`
    pub fn excluding(key: &SearchKey, exclude_words: Vec<String>) -> Self {
        Self {
            is_load_more: true,
            exclude_words,
            ..Self::initial(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initial_omits_optionals() {
        let key = SearchKey::new("p1", "  storms  ", SearchMode::And);
        let body = serde_json::to_value(SearchRequest::initial(&key)).unwrap();
        assert_eq!(
            body,
            json!({"query": "storms", "project_id": "p1", "search_mode": "and"})
        );
    }

    #[test]
    fn test_resume_carries_only_session() {
        let key = SearchKey::new("p1", "storms", SearchMode::Or);
        let body = serde_json::to_value(SearchRequest::resume(&key, "s-9")).unwrap();
        assert_eq!(body["is_load_more"], json!(true));
        assert_eq!(body["session_id"], json!("s-9"));
        assert!(body.get("exclude_words").is_none());
    }

    #[test]
    fn test_excluding_carries_words() {
        let key = SearchKey::new("p1", "storms", SearchMode::Or);
        let request = SearchRequest::excluding(&key, vec!["rain".into(), "hail".into()]);
        let body = serde_json::to_value(request).unwrap();
        assert_eq!(body["exclude_words"], json!(["rain", "hail"]));
        assert!(body.get("session_id").is_none());
    }
}
