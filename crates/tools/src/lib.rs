//! Tool and search backend implementations for TripForge.
//!
//! The planner gives the model a single capability, web search, backed by
//! the Google Custom Search JSON API.

pub mod google_search;
pub mod web_search;

pub use google_search::GoogleSearchProvider;
pub use web_search::{SearchLimits, WebSearchTool, format_results};
