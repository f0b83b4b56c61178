// Multi-date flight search engine: samples departure dates across a horizon,
// queries the provider concurrently per date, and reduces the normalized
// offers to the cheapest and shortest options.

pub mod config;
pub mod dates;
pub mod fetch;
pub mod model;
pub mod provider;
pub mod reduce;
pub mod search;
pub mod token;

// Re-export key types for convenience
pub use config::{ProviderConfig, RetryConfig, SearchConfig};
pub use fetch::{FailureKind, FetchStatsReport, OfferBatch, OfferFetcher};
pub use model::{
    FlightSummary, NormalizedOffer, SearchRequest, SearchResult, SearchStatus, ValidationError,
};
pub use provider::{FetchError, HttpOfferSource, OfferSource};
pub use reduce::{merge, reduce, Selection};
pub use search::{SearchEngine, SearchError, SearchPhase};
pub use token::{AccessToken, TokenCache, TokenError, TokenSource};
