// Core data model: search requests, normalized offers and the terminal search result.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Supported search horizon, in months ahead of today.
pub const MIN_HORIZON_MONTHS: u32 = 1;
pub const MAX_HORIZON_MONTHS: u32 = 6;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid location code '{0}': expected exactly 3 uppercase letters")]
    InvalidLocationCode(String),

    #[error("origin and destination must differ")]
    SameOriginAndDestination,

    #[error("months must be between {MIN_HORIZON_MONTHS} and {MAX_HORIZON_MONTHS}, got {0}")]
    HorizonOutOfRange(u32),
}

// One inbound search: a route plus the horizon over which departure dates are probed.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub origin: String,
    pub destination: String,
    pub months: u32,
}

impl SearchRequest {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>, months: u32) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            months,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_location_code(&self.origin) {
            return Err(ValidationError::InvalidLocationCode(self.origin.clone()));
        }
        if !is_location_code(&self.destination) {
            return Err(ValidationError::InvalidLocationCode(self.destination.clone()));
        }
        if self.origin == self.destination {
            return Err(ValidationError::SameOriginAndDestination);
        }
        if !(MIN_HORIZON_MONTHS..=MAX_HORIZON_MONTHS).contains(&self.months) {
            return Err(ValidationError::HorizonOutOfRange(self.months));
        }
        Ok(())
    }
}

// IATA location code: exactly three ASCII uppercase letters.
pub fn is_location_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

// The canonical offer record the reducer operates on. All provider-specific
// fields are dropped at normalization time.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOffer {
    pub price: Price,
    // Elapsed itinerary time; the raw ISO-8601 string is kept for display.
    pub duration_minutes: i64,
    pub duration: String,
    pub departure_date: NaiveDate,
    pub segments: usize,
    pub carrier: String,
}

// Display shape for a selected offer, matching the JSON payload returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSummary {
    pub price: String,
    pub currency: String,
    pub departure_date: NaiveDate,
    pub duration: String,
    pub segments: usize,
    pub airline: String,
}

impl From<&NormalizedOffer> for FlightSummary {
    fn from(offer: &NormalizedOffer) -> Self {
        Self {
            price: format!("{:.2}", offer.price.amount),
            currency: offer.price.currency.clone(),
            departure_date: offer.departure_date,
            duration: offer.duration.clone(),
            segments: offer.segments,
            airline: offer.carrier.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Completed,
    PartiallyFailed,
}

// Terminal artifact of one orchestrated search. Immutable after construction,
// never persisted. Both flight fields are None for a legitimate empty result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub total_flights_found: usize,
    pub search_period: String,
    pub status: SearchStatus,
    pub failed_dates: usize,
    pub cheapest_flight: Option<FlightSummary>,
    pub shortest_flight: Option<FlightSummary>,
}
