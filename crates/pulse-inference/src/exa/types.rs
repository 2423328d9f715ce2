//! Exa API request and response types.

use serde::{Deserialize, Serialize};

use pulse_core::SearchResult;

/// Content retrieval flags shared by `/search` and `/findSimilar`.
#[derive(Debug, Default, Serialize)]
pub struct ContentsOptions {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryOptions>,
}

/// Empty object requests a default summary.
#[derive(Debug, Default, Serialize)]
pub struct SummaryOptions {}

/// Request body for `/search`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaSearchRequest {
    pub query: String,
    #[serde(rename = "type")]
    pub search_type: String,
    pub num_results: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_published_date: Option<String>,
    pub contents: ContentsOptions,
}

/// Request body for `/findSimilar`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaFindSimilarRequest {
    pub url: String,
    pub num_results: usize,
    pub exclude_source_domain: bool,
    pub contents: ContentsOptions,
}

/// Response from both endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl From<ExaResult> for SearchResult {
    fn from(r: ExaResult) -> Self {
        fn non_empty(s: Option<String>) -> Option<String> {
            s.filter(|v| !v.trim().is_empty())
        }
        SearchResult {
            url: r.url,
            title: non_empty(r.title),
            published_date: non_empty(r.published_date),
            author: non_empty(r.author),
            text: non_empty(r.text),
            summary: non_empty(r.summary),
            score: r.score,
        }
    }
}

/// Error body returned by Exa.
#[derive(Debug, Deserialize)]
pub struct ExaErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_shape() {
        let req = ExaSearchRequest {
            query: "site:example.com".into(),
            search_type: "auto".into(),
            num_results: 20,
            include_domains: vec!["example.com".into()],
            start_published_date: None,
            contents: ContentsOptions {
                text: true,
                summary: Some(SummaryOptions {}),
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["numResults"], 20);
        assert_eq!(json["type"], "auto");
        assert_eq!(json["includeDomains"][0], "example.com");
        assert_eq!(json["contents"]["text"], true);
        assert!(json["contents"]["summary"].is_object());
        assert!(json.get("startPublishedDate").is_none());
    }

    #[test]
    fn test_find_similar_request_shape() {
        let req = ExaFindSimilarRequest {
            url: "https://blog.example.com".into(),
            num_results: 10,
            exclude_source_domain: true,
            contents: ContentsOptions::default(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["excludeSourceDomain"], true);
        assert!(json["contents"].get("text").is_none());
    }

    #[test]
    fn test_result_conversion_drops_blank_fields() {
        let raw = r#"{"url": "https://a.example.com/x", "title": "  ", "publishedDate": "2024-01-02T00:00:00.000Z", "text": "body"}"#;
        let r: ExaResult = serde_json::from_str(raw).unwrap();
        let converted: SearchResult = r.into();
        assert!(converted.title.is_none());
        assert_eq!(converted.text.as_deref(), Some("body"));
        assert!(converted.published_at().is_some());
    }
}
