//! Placeholder plan returned when the model did not produce a usable one.
//!
//! The result always passes [`TripPlan::validate`], carries the request's
//! identifying fields verbatim, and is visibly marked so nobody mistakes the
//! coordinates for a real campsite.

use tripforge_core::trip::{DailyPlan, Location, Trip, TripPlan, TripRequest};

/// Prefix on every user-visible placeholder field.
pub const PLACEHOLDER_MARKER: &str = "[placeholder]";

/// Approximate geographic centre of Türkiye.
pub const PLACEHOLDER_LATITUDE: f64 = 39.0;
pub const PLACEHOLDER_LONGITUDE: f64 = 35.0;

/// Upper bound on the search findings copied into the notes.
const CONTEXT_EXCERPT_CHARS: usize = 600;

/// Build a one-day placeholder plan for `request`.
///
/// `partial_context` is whatever search output was gathered before planning
/// stopped; a bounded excerpt of it goes into the location notes.
pub fn fallback(request: &TripRequest, partial_context: Option<&str>) -> TripPlan {
    let origin = non_blank(&request.start_position, "the starting point");
    let destination = non_blank(&request.end_position, "the destination");

    let mut notes = format!(
        "{PLACEHOLDER_MARKER} Coordinates are approximate and do not point to a real campsite."
    );
    if let Some(context) = partial_context.map(str::trim).filter(|c| !c.is_empty()) {
        notes.push_str("\nSearch findings gathered before planning stopped:\n");
        notes.push_str(&excerpt(context, CONTEXT_EXCERPT_CHARS));
    }

    TripPlan {
        trip: Trip {
            user_id: request.user_id.clone(),
            name: request.name.clone(),
            description: request.description.clone(),
            start_position: request.start_position.clone(),
            end_position: request.end_position.clone(),
            start_date: request.start_date.clone(),
            end_date: request.end_date.clone(),
            total_days: 1,
            route_summary: format!(
                "{PLACEHOLDER_MARKER} Automatic planning was incomplete for the route from \
                 {origin} to {destination}. Review and complete this itinerary manually."
            ),
        },
        daily_plan: vec![DailyPlan {
            day: 1,
            date: request.start_date.clone(),
            location: Location {
                name: format!("{PLACEHOLDER_MARKER} Campsite near {origin}"),
                address: Some(format!("Near {origin}")),
                site_url: None,
                latitude: PLACEHOLDER_LATITUDE,
                longitude: PLACEHOLDER_LONGITUDE,
                notes: Some(notes),
            },
        }],
    }
}

fn non_blank<'a>(value: &'a str, default: &'a str) -> &'a str {
    match value.trim() {
        "" => default,
        trimmed => trimmed,
    }
}

fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push('…');
    cut
}
