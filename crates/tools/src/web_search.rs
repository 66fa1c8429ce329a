//! Web search tool, the only tool the planner declares to the model.
//!
//! Wraps a [`SearchProvider`] and keeps what flows back into the model
//! context bounded: at most `top_k` hits, titles and snippets clipped to a
//! fixed number of characters. Backend errors and empty result sets are not
//! failures here; they become a plain-text "no results" note so the model
//! can change its query or answer from what it already knows.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};
use tripforge_core::error::{SearchError, ToolError};
use tripforge_core::search::{SearchProvider, SearchResultItem};
use tripforge_core::tool::{Tool, ToolCall, ToolResult};

pub const TOOL_NAME: &str = "web_search";

/// Bounds applied to every result set before it reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub top_k: usize,
    pub title_max_chars: usize,
    pub snippet_max_chars: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            top_k: 5,
            title_max_chars: 80,
            snippet_max_chars: 200,
        }
    }
}

impl From<&tripforge_config::SearchConfig> for SearchLimits {
    fn from(config: &tripforge_config::SearchConfig) -> Self {
        Self {
            top_k: config.top_k,
            title_max_chars: config.title_max_chars,
            snippet_max_chars: config.snippet_max_chars,
        }
    }
}

pub struct WebSearchTool {
    backend: Arc<dyn SearchProvider>,
    limits: SearchLimits,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchProvider>, limits: SearchLimits) -> Self {
        Self { backend, limits }
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> SearchLimits {
        self.limits
    }

    /// Run one query and return the capped, clipped hits.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResultItem>, SearchError> {
        let items = self.backend.search(query, self.limits.top_k).await?;
        Ok(items
            .into_iter()
            .take(self.limits.top_k)
            .map(|item| SearchResultItem {
                title: clip(&item.title, self.limits.title_max_chars),
                snippet: clip(&item.snippet, self.limits.snippet_max_chars),
                link: item.link.trim().to_string(),
            })
            .collect())
    }
}

/// Render a result set (or the reason there is none) as a tool-result turn.
pub fn format_results(query: &str, outcome: &Result<Vec<SearchResultItem>, SearchError>) -> String {
    match outcome {
        Ok(items) if !items.is_empty() => {
            let mut out = String::from("Search Results:\n");
            for (i, item) in items.iter().enumerate() {
                let _ = write!(
                    out,
                    "{}. {}\n   {}\n   {}\n\n",
                    i + 1,
                    item.title,
                    item.snippet,
                    item.link
                );
            }
            out
        }
        Ok(_) => format!(
            "No results found for \"{query}\". Try a different query or continue with what you already know."
        ),
        Err(e) => format!(
            "No results available for \"{query}\" (search failed: {e}). Try a different query or continue with what you already know."
        ),
    }
}

/// Collapse whitespace and cut to at most `max` characters, marking the cut.
fn clip(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        return collapsed;
    }
    let mut clipped: String = collapsed.chars().take(max.saturating_sub(1)).collect();
    clipped.truncate(clipped.trim_end().len());
    clipped.push('…');
    clipped
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information such as campsites, routes, addresses, \
         coordinates and opening seasons. Returns titles, snippets and links."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, call: ToolCall) -> Result<ToolResult, ToolError> {
        let query = call.arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let outcome = self.search(query).await;
        match &outcome {
            Ok(items) => debug!(query = %query, hits = items.len(), "Web search completed"),
            Err(e) => warn!(query = %query, error = %e, "Web search failed"),
        }

        let output = format_results(query, &outcome);
        let items = outcome.unwrap_or_default();
        Ok(ToolResult {
            call_id: call.id,
            success: !items.is_empty(),
            output,
            data: serde_json::to_value(&items).ok(),
        })
    }
}
