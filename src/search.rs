// Search orchestration: validation, bounded concurrent fan-out over the date
// window, global deadline, and assembly of the terminal result.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::dates::date_window_from_today;
use crate::fetch::{FailureKind, OfferBatch, OfferFetcher, FetchStatsReport};
use crate::model::{
    FlightSummary, SearchRequest, SearchResult, SearchStatus, ValidationError,
};
use crate::provider::OfferSource;
use crate::reduce::reduce;
use crate::token::TokenSource;

// Lifecycle of one search. Terminal phases are final; a new request gets a
// fresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Pending,
    Fetching,
    Aggregating,
    Completed,
    PartiallyFailed,
    Failed,
}

// Only request-level failures reach callers; per-date failures are absorbed
// into tallies during the fetch phase. Counts are sanitized kinds, never
// provider payloads.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SearchError {
    #[error("invalid search request: {0}")]
    Validation(#[from] ValidationError),

    #[error(
        "all {attempted} date queries failed \
         (auth: {auth}, rate limited: {rate_limited}, transport: {transport}, timed out: {timed_out})"
    )]
    TotalFailure {
        attempted: usize,
        auth: usize,
        rate_limited: usize,
        transport: usize,
        timed_out: usize,
    },
}

#[derive(Debug, Default)]
struct FailureTally {
    auth: usize,
    rate_limited: usize,
    transport: usize,
    timed_out: usize,
}

impl FailureTally {
    fn record(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Auth => self.auth += 1,
            FailureKind::RateLimited => self.rate_limited += 1,
            FailureKind::Transport => self.transport += 1,
            FailureKind::TimedOut => self.timed_out += 1,
        }
    }

    fn total(&self) -> usize {
        self.auth + self.rate_limited + self.transport + self.timed_out
    }
}

fn advance(phase: &mut SearchPhase, next: SearchPhase) {
    debug!(from = ?phase, to = ?next, "search phase transition");
    *phase = next;
}

// Without a credential every date would fail identically, so the search
// fails upstream with the whole window counted as auth failures.
fn warmup_failure(phase: &mut SearchPhase, attempted: usize) -> SearchError {
    advance(phase, SearchPhase::Failed);
    SearchError::TotalFailure {
        attempted,
        auth: attempted,
        rate_limited: 0,
        transport: 0,
        timed_out: 0,
    }
}

pub struct SearchEngine {
    fetcher: Arc<OfferFetcher>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        source: Arc<dyn OfferSource>,
        tokens: Arc<dyn TokenSource>,
        config: SearchConfig,
    ) -> Self {
        let fetcher = Arc::new(OfferFetcher::new(source, tokens, config.clone()));
        Self { fetcher, config }
    }

    pub fn stats(&self) -> FetchStatsReport {
        self.fetcher.stats()
    }

    // Runs one search to a terminal state. Succeeds with an empty result when
    // the market is genuinely empty; fails with TotalFailure only when not a
    // single date could be fetched.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult, SearchError> {
        let mut phase = SearchPhase::Pending;

        if let Err(error) = request.validate() {
            advance(&mut phase, SearchPhase::Failed);
            return Err(SearchError::Validation(error));
        }

        let dates = date_window_from_today(request.months);
        info!(
            origin = %request.origin,
            destination = %request.destination,
            months = request.months,
            dates = dates.len(),
            "starting flight search"
        );
        advance(&mut phase, SearchPhase::Fetching);

        // The token is obtained once before the fan-out; fetchers re-auth
        // only on rejection. Acquisition gets the per-call budget so a hung
        // auth endpoint cannot stall the search past its deadline.
        let warmup = tokio::time::timeout(
            self.config.per_call_timeout,
            self.fetcher.tokens().current(),
        )
        .await;
        match warmup {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => {
                warn!(%error, "token acquisition failed before fan-out");
                return Err(warmup_failure(&mut phase, dates.len()));
            }
            Err(_) => {
                warn!("token acquisition timed out before fan-out");
                return Err(warmup_failure(&mut phase, dates.len()));
            }
        }

        let batches = self
            .fetch_all(&request.origin, &request.destination, &dates)
            .await;
        advance(&mut phase, SearchPhase::Aggregating);

        let settled = batches.len();
        let mut tally = FailureTally::default();
        tally.timed_out = dates.len() - settled;

        // Batches are merged in date order so the selection cannot depend on
        // which fetch happened to complete first.
        let mut batches = batches;
        batches.sort_by_key(|batch| batch.date);

        let mut successes = 0usize;
        let mut offers = Vec::new();
        for batch in batches {
            match batch.outcome {
                Ok(batch_offers) => {
                    successes += 1;
                    offers.extend(batch_offers);
                }
                Err(kind) => tally.record(kind),
            }
        }

        if successes == 0 {
            advance(&mut phase, SearchPhase::Failed);
            return Err(SearchError::TotalFailure {
                attempted: dates.len(),
                auth: tally.auth,
                rate_limited: tally.rate_limited,
                transport: tally.transport,
                timed_out: tally.timed_out,
            });
        }

        let selection = reduce(&offers);
        let failed_dates = tally.total();
        let status = if failed_dates == 0 {
            advance(&mut phase, SearchPhase::Completed);
            SearchStatus::Completed
        } else {
            advance(&mut phase, SearchPhase::PartiallyFailed);
            SearchStatus::PartiallyFailed
        };

        let result = SearchResult {
            total_flights_found: offers.len(),
            search_period: format!("{} months", request.months),
            status,
            failed_dates,
            cheapest_flight: selection.cheapest.as_ref().map(FlightSummary::from),
            shortest_flight: selection.shortest.as_ref().map(FlightSummary::from),
        };
        info!(
            total = result.total_flights_found,
            failed_dates, "flight search finished"
        );
        Ok(result)
    }

    // Concurrent fan-out with a hard deadline. Whatever has not settled when
    // the deadline fires is abandoned, not awaited.
    async fn fetch_all(
        &self,
        origin: &str,
        destination: &str,
        dates: &[NaiveDate],
    ) -> Vec<OfferBatch> {
        let mut pending = stream::iter(dates.to_vec())
            .map(|date| {
                let fetcher = Arc::clone(&self.fetcher);
                let origin = origin.to_string();
                let destination = destination.to_string();
                async move { fetcher.fetch_date(&origin, &destination, date).await }
            })
            .buffer_unordered(self.config.max_concurrent_fetches);

        let deadline = tokio::time::sleep(self.config.search_timeout);
        tokio::pin!(deadline);

        let mut batches = Vec::with_capacity(dates.len());
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(
                        settled = batches.len(),
                        total = dates.len(),
                        "search deadline elapsed, abandoning outstanding fetches"
                    );
                    break;
                }
                next = pending.next() => match next {
                    Some(batch) => batches.push(batch),
                    None => break,
                },
            }
        }
        batches
    }
}
