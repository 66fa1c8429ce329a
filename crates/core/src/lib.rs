//! # TripForge Core
//!
//! Domain types, traits, and error definitions for the TripForge itinerary
//! planner. This crate has **no framework dependencies**. It defines the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each outbound collaborator (language model, web search, tools) is a trait
//! here. Implementations live in their own crates, which keeps:
//! - backends swappable through configuration
//! - the planner testable with scripted stubs
//! - the dependency graph pointing inward at core

pub mod error;
pub mod message;
pub mod provider;
pub mod search;
pub mod tool;
pub mod trip;

// Re-export key types at crate root for ergonomics
pub use error::{Error, PlanError, ProviderError, Result, SearchError, ToolError};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use search::{SearchProvider, SearchResultItem};
pub use tool::{Tool, ToolCall, ToolResult};
pub use trip::{DailyPlan, Location, PlanViolation, Trip, TripPlan, TripRequest};
