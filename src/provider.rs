// Outbound provider interface: wire model for the offer-search capability,
// normalization into the canonical offer shape, and the reqwest-backed client.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::model::{NormalizedOffer, Price};

// Per-call provider failures. Detail strings are for logging only and never
// reach callers of the search engine.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("authentication rejected by provider")]
    AuthRejected,

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transport error: {0}")]
    Transport(String),
}

// Raw offer records as returned by the provider. Everything is defaulted so a
// malformed record degrades to a droppable one instead of failing the batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferSearchResponse {
    #[serde(default)]
    pub data: Vec<RawOffer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOffer {
    #[serde(default)]
    pub price: RawPrice,
    #[serde(default)]
    pub itineraries: Vec<RawItinerary>,
    #[serde(default, rename = "validatingAirlineCodes")]
    pub validating_airline_codes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPrice {
    #[serde(default)]
    pub total: String,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItinerary {
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub segments: Vec<RawSegment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSegment {
    #[serde(default, rename = "carrierCode")]
    pub carrier_code: String,
}

// The provider's offer-search capability, keyed by route, one departure date
// and a bearer credential. Seam for tests and alternative providers.
#[async_trait]
pub trait OfferSource: Send + Sync + 'static {
    async fn search_offers(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        bearer: &str,
    ) -> Result<Vec<RawOffer>, FetchError>;
}

// Parses ISO-8601 durations of the `PnDTnHnMnS` family into whole minutes.
// Seconds are truncated. Returns None for anything it cannot account for,
// including components large enough to overflow the minute total.
pub fn parse_iso8601_duration(value: &str) -> Option<i64> {
    let rest = value.strip_prefix('P')?;
    let (day_part, time_part) = match rest.split_once('T') {
        Some((days, time)) => (days, time),
        None => (rest, ""),
    };

    let mut minutes = 0i64;
    let mut components = 0;

    if !day_part.is_empty() {
        let days: i64 = day_part.strip_suffix('D')?.parse().ok()?;
        minutes = minutes.checked_add(days.checked_mul(24 * 60)?)?;
        components += 1;
    }

    let mut digits = String::new();
    for ch in time_part.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let value: i64 = digits.parse().ok()?;
        digits.clear();
        match ch {
            'H' => minutes = minutes.checked_add(value.checked_mul(60)?)?,
            'M' => minutes = minutes.checked_add(value)?,
            'S' => {}
            _ => return None,
        }
        components += 1;
    }

    if !digits.is_empty() || components == 0 {
        return None;
    }
    Some(minutes)
}

// Maps one raw offer into the canonical shape. Records with an unparsable
// price or duration, no segments or no carrier are dropped, not propagated.
pub fn normalize_offer(raw: &RawOffer, departure_date: NaiveDate) -> Option<NormalizedOffer> {
    let amount: f64 = raw.price.total.trim().parse().ok()?;
    if !amount.is_finite() || amount < 0.0 || raw.price.currency.is_empty() {
        return None;
    }

    let itinerary = raw.itineraries.first()?;
    let duration_minutes = parse_iso8601_duration(&itinerary.duration)?;
    if duration_minutes <= 0 {
        return None;
    }

    let segments = itinerary.segments.len();
    if segments == 0 {
        return None;
    }

    let carrier = raw
        .validating_airline_codes
        .iter()
        .chain(itinerary.segments.iter().map(|s| &s.carrier_code))
        .find(|c| !c.is_empty())?
        .clone();

    Some(NormalizedOffer {
        price: Price {
            amount,
            currency: raw.price.currency.clone(),
        },
        duration_minutes,
        duration: itinerary.duration.clone(),
        departure_date,
        segments,
        carrier,
    })
}

// Normalizes a whole batch, returning the kept offers and the dropped count.
pub fn normalize_batch(
    raw: Vec<RawOffer>,
    departure_date: NaiveDate,
) -> (Vec<NormalizedOffer>, usize) {
    let total = raw.len();
    let offers: Vec<NormalizedOffer> = raw
        .iter()
        .filter_map(|offer| normalize_offer(offer, departure_date))
        .collect();
    let dropped = total - offers.len();
    if dropped > 0 {
        debug!(%departure_date, dropped, "dropped malformed offer records");
    }
    (offers, dropped)
}

// reqwest-backed offer source against the provider's search endpoint.
pub struct HttpOfferSource {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl HttpOfferSource {
    pub fn new(config: ProviderConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl OfferSource for HttpOfferSource {
    async fn search_offers(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        bearer: &str,
    ) -> Result<Vec<RawOffer>, FetchError> {
        let url = format!(
            "{}/v2/shopping/flight-offers",
            self.config.base_url.trim_end_matches('/')
        );
        let departure_date = date.to_string();
        let max = self.config.max_offers_per_date.to_string();

        let response = self
            .http
            .get(&url)
            .query(&[
                ("originLocationCode", origin),
                ("destinationLocationCode", destination),
                ("departureDate", departure_date.as_str()),
                ("adults", "1"),
                ("nonStop", "false"),
                ("currencyCode", self.config.currency.as_str()),
                ("max", max.as_str()),
            ])
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::AuthRejected);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FetchError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(FetchError::Transport(format!("provider returned {status}")));
        }

        let body: OfferSearchResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(body.data)
    }
}
