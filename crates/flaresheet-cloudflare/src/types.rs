//! GraphQL response shapes for the Cloudflare Analytics API
//!
//! Measure groups are kept as raw JSON objects; coercion and defaulting
//! happen in the transformer, not here.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse {
    pub data: Option<ResponseData>,
    #[serde(default)]
    pub errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub extensions: Option<serde_json::Value>,
}

impl GraphqlError {
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseData {
    pub viewer: Viewer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Viewer {
    #[serde(default)]
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Zone {
    #[serde(rename = "httpRequests1dGroups", default)]
    pub http_requests_1d_groups: Vec<DailyGroup>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyGroup {
    #[serde(default)]
    pub dimensions: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub sum: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub uniq: serde_json::Map<String, serde_json::Value>,
}

impl GraphqlResponse {
    /// Wraps groups in a successful single-zone response
    pub fn with_groups(groups: Vec<DailyGroup>) -> Self {
        Self {
            data: Some(ResponseData {
                viewer: Viewer {
                    zones: vec![Zone {
                        http_requests_1d_groups: groups,
                    }],
                },
            }),
            errors: None,
        }
    }
}
