// Per-date offer fetching. Every failure is isolated to its own date: the
// batch settles with a sanitized failure kind and the search carries on.

use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::model::NormalizedOffer;
use crate::provider::{normalize_batch, FetchError, OfferSource};
use crate::token::{TokenCache, TokenSource};

// Sanitized per-date failure classification. This is all callers ever see of
// a failed date; provider payloads and credentials stay in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Auth,
    RateLimited,
    Transport,
    // Still outstanding when the global search deadline elapsed.
    TimedOut,
}

// The settled result for one candidate date: normalized offers, or the kind
// of failure that exhausted its retry budget. Lives for one search only.
#[derive(Debug)]
pub struct OfferBatch {
    pub date: NaiveDate,
    pub outcome: Result<Vec<NormalizedOffer>, FailureKind>,
}

impl OfferBatch {
    pub fn offers(date: NaiveDate, offers: Vec<NormalizedOffer>) -> Self {
        Self {
            date,
            outcome: Ok(offers),
        }
    }

    pub fn failed(date: NaiveDate, kind: FailureKind) -> Self {
        Self {
            date,
            outcome: Err(kind),
        }
    }
}

#[derive(Debug, Default)]
struct FetchStats {
    requests_sent: AtomicUsize,
    batches_succeeded: AtomicUsize,
    empty_batches: AtomicUsize,
    offers_normalized: AtomicUsize,
    offers_dropped: AtomicUsize,
    auth_retries: AtomicUsize,
    rate_limit_retries: AtomicUsize,
    transport_failures: AtomicUsize,
    call_timeouts: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchStatsReport {
    pub requests_sent: usize,
    pub batches_succeeded: usize,
    pub empty_batches: usize,
    pub offers_normalized: usize,
    pub offers_dropped: usize,
    pub auth_retries: usize,
    pub rate_limit_retries: usize,
    pub transport_failures: usize,
    pub call_timeouts: usize,
}

pub struct OfferFetcher {
    source: Arc<dyn OfferSource>,
    tokens: TokenCache,
    config: SearchConfig,
    stats: FetchStats,
}

impl OfferFetcher {
    pub fn new(
        source: Arc<dyn OfferSource>,
        token_source: Arc<dyn TokenSource>,
        config: SearchConfig,
    ) -> Self {
        Self {
            source,
            tokens: TokenCache::new(token_source),
            config,
            stats: FetchStats::default(),
        }
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    pub fn stats(&self) -> FetchStatsReport {
        FetchStatsReport {
            requests_sent: self.stats.requests_sent.load(Ordering::SeqCst),
            batches_succeeded: self.stats.batches_succeeded.load(Ordering::SeqCst),
            empty_batches: self.stats.empty_batches.load(Ordering::SeqCst),
            offers_normalized: self.stats.offers_normalized.load(Ordering::SeqCst),
            offers_dropped: self.stats.offers_dropped.load(Ordering::SeqCst),
            auth_retries: self.stats.auth_retries.load(Ordering::SeqCst),
            rate_limit_retries: self.stats.rate_limit_retries.load(Ordering::SeqCst),
            transport_failures: self.stats.transport_failures.load(Ordering::SeqCst),
            call_timeouts: self.stats.call_timeouts.load(Ordering::SeqCst),
        }
    }

    // One authenticated provider query for one departure date, normalized.
    // Recovery budget: one token refresh after an auth rejection, up to
    // `max_rate_limit_retries` backoffs after 429s. Transport errors and the
    // per-call timeout settle the date immediately.
    pub async fn fetch_date(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> OfferBatch {
        let mut token = match self.tokens.current().await {
            Ok(token) => token,
            Err(error) => {
                warn!(%date, %error, "could not obtain an access token");
                return OfferBatch::failed(date, FailureKind::Auth);
            }
        };

        let mut auth_retried = false;
        let mut rate_limit_attempts: u32 = 0;

        loop {
            self.stats.requests_sent.fetch_add(1, Ordering::SeqCst);
            let call = self
                .source
                .search_offers(origin, destination, date, &token.token);

            let outcome = match timeout(self.config.per_call_timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.stats.call_timeouts.fetch_add(1, Ordering::SeqCst);
                    warn!(%date, "provider call exceeded the per-call timeout");
                    return OfferBatch::failed(date, FailureKind::Transport);
                }
            };

            match outcome {
                Ok(raw) => {
                    let (offers, dropped) = normalize_batch(raw, date);
                    self.stats.batches_succeeded.fetch_add(1, Ordering::SeqCst);
                    self.stats
                        .offers_normalized
                        .fetch_add(offers.len(), Ordering::SeqCst);
                    self.stats.offers_dropped.fetch_add(dropped, Ordering::SeqCst);
                    if offers.is_empty() {
                        self.stats.empty_batches.fetch_add(1, Ordering::SeqCst);
                        debug!(%date, "no offers for this date");
                    } else {
                        info!(%date, count = offers.len(), "fetched offers");
                    }
                    return OfferBatch::offers(date, offers);
                }
                Err(FetchError::AuthRejected) => {
                    if auth_retried {
                        warn!(%date, "credential rejected again after refresh");
                        return OfferBatch::failed(date, FailureKind::Auth);
                    }
                    auth_retried = true;
                    self.stats.auth_retries.fetch_add(1, Ordering::SeqCst);
                    match self.tokens.refresh_after_rejection(&token.token).await {
                        Ok(fresh) => token = fresh,
                        Err(error) => {
                            warn!(%date, %error, "token refresh failed");
                            return OfferBatch::failed(date, FailureKind::Auth);
                        }
                    }
                }
                Err(FetchError::RateLimited { retry_after }) => {
                    if rate_limit_attempts >= self.config.max_rate_limit_retries {
                        warn!(%date, "rate limit retries exhausted, skipping date");
                        return OfferBatch::failed(date, FailureKind::RateLimited);
                    }
                    // Retry-After hints are clamped to the backoff ceiling.
                    let cap = Duration::from_millis(self.config.retry.max_backoff_ms);
                    let delay = retry_after
                        .map(|hint| hint.min(cap))
                        .unwrap_or_else(|| self.config.retry.backoff_for(rate_limit_attempts));
                    rate_limit_attempts += 1;
                    self.stats.rate_limit_retries.fetch_add(1, Ordering::SeqCst);
                    debug!(%date, ?delay, "rate limited, backing off");
                    sleep(delay).await;
                }
                Err(FetchError::Transport(detail)) => {
                    self.stats.transport_failures.fetch_add(1, Ordering::SeqCst);
                    warn!(%date, error = %detail, "transport failure");
                    return OfferBatch::failed(date, FailureKind::Transport);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::provider::mock::{raw_offer, ScriptedCall, ScriptedOfferSource};
    use crate::provider::RawOffer;
    use crate::token::mock::{CountingTokenSource, FailingTokenSource};
    use std::time::Duration;

    fn test_config() -> SearchConfig {
        SearchConfig {
            per_call_timeout: Duration::from_millis(100),
            max_rate_limit_retries: 2,
            retry: RetryConfig {
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
                ..RetryConfig::default()
            },
            ..SearchConfig::default()
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn fetcher(source: Arc<ScriptedOfferSource>) -> OfferFetcher {
        let tokens = Arc::new(CountingTokenSource::new(Duration::ZERO, 3600));
        OfferFetcher::new(source, tokens, test_config())
    }

    #[tokio::test]
    async fn successful_fetch_normalizes_and_drops_malformed_records() {
        let source = Arc::new(ScriptedOfferSource::new());
        source.script(
            date(),
            ScriptedCall::Offers(vec![
                raw_offer("120.00", "USD", "PT2H", 1, "BA"),
                RawOffer::default(),
            ]),
        );

        let fetcher = fetcher(Arc::clone(&source));
        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        let offers = batch.outcome.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].price.amount, 120.0);

        let stats = fetcher.stats();
        assert_eq!(stats.batches_succeeded, 1);
        assert_eq!(stats.offers_normalized, 1);
        assert_eq!(stats.offers_dropped, 1);
    }

    #[tokio::test]
    async fn empty_batch_is_a_success_not_a_failure() {
        let source = Arc::new(ScriptedOfferSource::new());
        let fetcher = fetcher(Arc::clone(&source));

        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        assert_eq!(batch.outcome.unwrap(), vec![]);
        assert_eq!(fetcher.stats().empty_batches, 1);
    }

    #[tokio::test]
    async fn auth_rejection_refreshes_the_token_and_retries_once() {
        let source = Arc::new(ScriptedOfferSource::new());
        source.script(date(), ScriptedCall::Fail(FetchError::AuthRejected));
        source.script(
            date(),
            ScriptedCall::Offers(vec![raw_offer("99.00", "USD", "PT3H", 1, "AF")]),
        );

        let fetcher = fetcher(Arc::clone(&source));
        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        assert!(batch.outcome.is_ok());
        assert_eq!(source.calls(), 2);
        // The retry went out with a fresh credential.
        let tokens = source.tokens_seen();
        assert_ne!(tokens[0], tokens[1]);
        assert_eq!(fetcher.stats().auth_retries, 1);
    }

    #[tokio::test]
    async fn second_auth_rejection_settles_the_date() {
        let source = Arc::new(ScriptedOfferSource::new());
        source.script(date(), ScriptedCall::Fail(FetchError::AuthRejected));
        source.script(date(), ScriptedCall::Fail(FetchError::AuthRejected));

        let fetcher = fetcher(Arc::clone(&source));
        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        assert_eq!(batch.outcome.unwrap_err(), FailureKind::Auth);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn rate_limiting_backs_off_then_succeeds() {
        let source = Arc::new(ScriptedOfferSource::new());
        source.script(
            date(),
            ScriptedCall::Fail(FetchError::RateLimited {
                retry_after: Some(Duration::from_millis(1)),
            }),
        );
        source.script(
            date(),
            ScriptedCall::Offers(vec![raw_offer("45.00", "USD", "PT1H30M", 1, "FR")]),
        );

        let fetcher = fetcher(Arc::clone(&source));
        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        assert!(batch.outcome.is_ok());
        assert_eq!(source.calls(), 2);
        assert_eq!(fetcher.stats().rate_limit_retries, 1);
    }

    #[tokio::test]
    async fn oversized_retry_after_hints_are_clamped_to_the_backoff_cap() {
        let source = Arc::new(ScriptedOfferSource::new());
        source.script(
            date(),
            ScriptedCall::Fail(FetchError::RateLimited {
                retry_after: Some(Duration::from_secs(3600)),
            }),
        );
        source.script(
            date(),
            ScriptedCall::Offers(vec![raw_offer("45.00", "USD", "PT1H30M", 1, "FR")]),
        );

        let fetcher = fetcher(Arc::clone(&source));
        let started = tokio::time::Instant::now();
        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        assert!(batch.outcome.is_ok());
        assert_eq!(source.calls(), 2);
        // The test config caps backoff at 5ms; an hour-long hint must not be
        // slept verbatim.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn rate_limit_retries_are_bounded() {
        let source = Arc::new(ScriptedOfferSource::new());
        for _ in 0..3 {
            source.script(
                date(),
                ScriptedCall::Fail(FetchError::RateLimited { retry_after: None }),
            );
        }

        let fetcher = fetcher(Arc::clone(&source));
        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        assert_eq!(batch.outcome.unwrap_err(), FailureKind::RateLimited);
        // Initial call plus max_rate_limit_retries attempts.
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn transport_failures_are_not_retried() {
        let source = Arc::new(ScriptedOfferSource::new());
        source.script(
            date(),
            ScriptedCall::Fail(FetchError::Transport("connection reset".to_string())),
        );

        let fetcher = fetcher(Arc::clone(&source));
        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        assert_eq!(batch.outcome.unwrap_err(), FailureKind::Transport);
        assert_eq!(source.calls(), 1);
        assert_eq!(fetcher.stats().transport_failures, 1);
    }

    #[tokio::test]
    async fn slow_calls_are_cut_by_the_per_call_timeout() {
        let source = Arc::new(ScriptedOfferSource::new());
        source.script(
            date(),
            ScriptedCall::HangThenOffers(
                Duration::from_millis(500),
                vec![raw_offer("10.00", "USD", "PT1H", 1, "U2")],
            ),
        );

        let fetcher = fetcher(Arc::clone(&source));
        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        assert_eq!(batch.outcome.unwrap_err(), FailureKind::Transport);
        assert_eq!(fetcher.stats().call_timeouts, 1);
    }

    #[tokio::test]
    async fn token_acquisition_failure_settles_without_a_provider_call() {
        let source = Arc::new(ScriptedOfferSource::new());
        let fetcher = OfferFetcher::new(
            Arc::clone(&source) as Arc<dyn OfferSource>,
            Arc::new(FailingTokenSource),
            test_config(),
        );

        let batch = fetcher.fetch_date("JFK", "LHR", date()).await;

        assert_eq!(batch.outcome.unwrap_err(), FailureKind::Auth);
        assert_eq!(source.calls(), 0);
    }
}
