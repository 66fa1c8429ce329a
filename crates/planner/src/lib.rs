//! The TripForge planner.
//!
//! Drives a bounded conversation with a language model that may ask for web
//! searches, then turns its final reply into a validated [`TripPlan`]. When
//! the model does not deliver one within the round, context and time limits,
//! a marked placeholder plan is returned instead.
//!
//! [`TripPlan`]: tripforge_core::TripPlan

pub mod extract;
pub mod fallback;
pub mod orchestrator;
pub mod prompt;
pub mod state;

pub use extract::{extract, extract_plan};
pub use fallback::{PLACEHOLDER_MARKER, fallback};
pub use orchestrator::{FallbackReason, PlanOutcome, Provenance, TripPlanner};
