//! Web search boundary.
//!
//! A `SearchProvider` takes a query and a result-count limit and returns an
//! ordered list of hits. Ranking is entirely the backend's business.

use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One search hit, reduced to the fields the planner feeds back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// A human-readable name for this backend (e.g., "google_cse").
    fn name(&self) -> &str;

    /// Run one query. Backends must not retry internally.
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<SearchResultItem>, SearchError>;
}
