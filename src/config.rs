// Configuration for the provider client and the search engine. Values are
// resolved by the embedding application; nothing here reads the environment.

use std::time::Duration;

// Connection details for the external flight-data provider. The bearer
// credential itself comes from the token cache, never from this struct.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub currency: String,
    // Offer cap requested per date, to keep response sizes bounded.
    pub max_offers_per_date: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://test.api.amadeus.com".to_string(),
            currency: "USD".to_string(),
            max_offers_per_date: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    // Exponential backoff with jitter to prevent thundering herd.
    pub fn backoff_for(&self, retry_attempt: u32) -> Duration {
        let base_backoff_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powf(retry_attempt as f64))
        .min(self.max_backoff_ms as f64);

        let jitter = rand::random::<f64>() * self.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - self.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms as u64)
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    // Cap on in-flight provider calls. Small enough to respect provider rate
    // limits, large enough to keep the window latency network-bound.
    pub max_concurrent_fetches: usize,
    // Per-call budget, so one slow date cannot consume the whole search.
    pub per_call_timeout: Duration,
    // Global deadline for the whole fetch phase.
    pub search_timeout: Duration,
    pub max_rate_limit_retries: u32,
    pub retry: RetryConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            per_call_timeout: Duration::from_secs(10),
            search_timeout: Duration::from_secs(60),
            max_rate_limit_retries: 2,
            retry: RetryConfig::default(),
        }
    }
}
