//! Google Custom Search JSON API backend.
//!
//! `GET https://www.googleapis.com/customsearch/v1?key=..&cx=..&q=..&num=..`
//! One request per query, no retries. Missing credentials surface as
//! `SearchError::NotConfigured` so the planner can tell the model that search
//! is unavailable instead of failing the request.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use tripforge_core::error::SearchError;
use tripforge_core::search::{SearchProvider, SearchResultItem};

/// Custom Search caps `num` at 10.
const MAX_NUM: usize = 10;

pub struct GoogleSearchProvider {
    base_url: String,
    api_key: Option<String>,
    cx: Option<String>,
    client: reqwest::Client,
}

impl GoogleSearchProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, cx: Option<String>) -> Self {
        Self::with_timeout(base_url, api_key, cx, Duration::from_secs(15))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        cx: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            cx: cx.filter(|c| !c.is_empty()),
            client,
        }
    }

    /// Build from the `[search]` config section.
    pub fn from_config(config: &tripforge_config::SearchConfig) -> Self {
        Self::with_timeout(
            config.base_url.clone(),
            config.api_key.clone(),
            config.cx.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn parse_items(body: ApiSearchResponse) -> Vec<SearchResultItem> {
        body.items
            .into_iter()
            .map(|it| SearchResultItem {
                title: it.title,
                snippet: it.snippet,
                link: it.link,
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchProvider {
    fn name(&self) -> &str {
        "google_cse"
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResultItem>, SearchError> {
        let (Some(key), Some(cx)) = (self.api_key.as_deref(), self.cx.as_deref()) else {
            return Err(SearchError::NotConfigured(
                "Custom Search API key and engine ID (cx) are required".into(),
            ));
        };

        let num = limit.clamp(1, MAX_NUM).to_string();
        debug!(query = %query, num = %num, "Sending Custom Search request");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("key", key), ("cx", cx), ("q", query), ("num", num.as_str())])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| body.chars().take(512).collect());
            warn!(status = status.as_u16(), message = %message, "Custom Search returned error");
            return Err(SearchError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let body: ApiSearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        Ok(Self::parse_items(body))
    }
}

// --- Custom Search API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    /// Absent entirely when the query has no hits
    #[serde(default)]
    items: Vec<ApiSearchItem>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}
