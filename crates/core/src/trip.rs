//! Trip request and plan types.
//!
//! `TripRequest` is what a caller asks for; `TripPlan` is what the planner
//! hands back, whether it came from the model or from the fallback
//! generator. Both paths must pass [`TripPlan::validate`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A trip-planning request. Dates are opaque strings and are never parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Origin location
    #[serde(default)]
    pub start_position: String,
    /// Destination location
    #[serde(default)]
    pub end_position: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

/// The structured itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlan {
    pub trip: Trip,
    pub daily_plan: Vec<DailyPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_position: String,
    #[serde(default)]
    pub end_position: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub total_days: u32,
    #[serde(default)]
    pub route_summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPlan {
    pub day: u32,
    #[serde(default)]
    pub date: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub site_url: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Why a plan failed structural validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanViolation {
    #[error("plan has no daily entries")]
    NoDailyEntries,

    #[error("total_days must be at least 1")]
    ZeroTotalDays,

    #[error("daily entry {index} has day number 0")]
    ZeroDay { index: usize },

    #[error("daily entry {index} has an empty location name")]
    UnnamedLocation { index: usize },

    #[error("daily entry {index} has out-of-range coordinates ({latitude}, {longitude})")]
    BadCoordinates {
        index: usize,
        latitude: f64,
        longitude: f64,
    },
}

impl TripPlan {
    /// Check the structural invariants every returned plan must satisfy.
    pub fn validate(&self) -> Result<(), PlanViolation> {
        if self.daily_plan.is_empty() {
            return Err(PlanViolation::NoDailyEntries);
        }
        if self.trip.total_days == 0 {
            return Err(PlanViolation::ZeroTotalDays);
        }

        for (index, entry) in self.daily_plan.iter().enumerate() {
            if entry.day == 0 {
                return Err(PlanViolation::ZeroDay { index });
            }
            if entry.location.name.trim().is_empty() {
                return Err(PlanViolation::UnnamedLocation { index });
            }
            let Location {
                latitude, longitude, ..
            } = entry.location;
            let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
            let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);
            if !lat_ok || !lon_ok {
                return Err(PlanViolation::BadCoordinates {
                    index,
                    latitude,
                    longitude,
                });
            }
        }

        Ok(())
    }

    /// Fill identifying trip fields the model left blank from the request.
    ///
    /// Non-empty fields are kept as the model wrote them. A missing
    /// `total_days` becomes the number of daily entries.
    pub fn backfill_from(&mut self, request: &TripRequest) {
        fn fill(slot: &mut String, value: &str) {
            if slot.trim().is_empty() {
                *slot = value.to_string();
            }
        }

        let trip = &mut self.trip;
        fill(&mut trip.user_id, &request.user_id);
        fill(&mut trip.name, &request.name);
        fill(&mut trip.description, &request.description);
        fill(&mut trip.start_position, &request.start_position);
        fill(&mut trip.end_position, &request.end_position);
        fill(&mut trip.start_date, &request.start_date);
        fill(&mut trip.end_date, &request.end_date);

        if trip.total_days == 0 {
            trip.total_days = u32::try_from(self.daily_plan.len()).unwrap_or(u32::MAX);
        }
    }
}
