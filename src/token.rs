// Shared bearer-credential cache. Acquisition itself is a black box behind
// `TokenSource`; this module owns the lifecycle: fetch-if-absent-or-expired
// and refresh-on-auth-failure, both single-flight.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

// Tokens within this margin of expiry are treated as expired, so a fetch
// dispatched just before the deadline does not go out with a dying credential.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token acquisition failed: {0}")]
    Acquire(#[from] anyhow::Error),
}

// The external authentication collaborator, reduced to the one capability
// this engine consumes.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn get_access_token(&self) -> anyhow::Result<AccessToken>;
}

// Read-mostly cache: concurrent fetchers take the fast path under a read
// lock; acquisition and refresh serialize on an async mutex so at most one
// request is in flight against the auth endpoint.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    current: RwLock<Option<AccessToken>>,
    refresh_guard: tokio::sync::Mutex<()>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh_guard: tokio::sync::Mutex::new(()),
        }
    }

    // Returns the cached token, fetching one if absent or expired.
    pub async fn current(&self) -> Result<AccessToken, TokenError> {
        let now = Utc::now();
        if let Some(token) = self.cached_valid(now) {
            debug!("using cached access token");
            return Ok(token);
        }

        let _guard = self.refresh_guard.lock().await;
        // Another caller may have refreshed while we waited on the guard.
        if let Some(token) = self.cached_valid(Utc::now()) {
            return Ok(token);
        }
        self.acquire().await
    }

    // Replaces a token the provider just rejected. Callers racing on the same
    // stale token wait on the guard and reuse the winner's replacement.
    pub async fn refresh_after_rejection(&self, rejected: &str) -> Result<AccessToken, TokenError> {
        let _guard = self.refresh_guard.lock().await;
        if let Some(token) = self.cached_valid(Utc::now()) {
            if token.token != rejected {
                debug!("token already refreshed by a concurrent caller");
                return Ok(token);
            }
        }
        self.acquire().await
    }

    fn cached_valid(&self, now: DateTime<Utc>) -> Option<AccessToken> {
        self.current
            .read()
            .as_ref()
            .filter(|token| !token.is_expired_at(now))
            .cloned()
    }

    // Must be called with the refresh guard held.
    async fn acquire(&self) -> Result<AccessToken, TokenError> {
        let token = self.source.get_access_token().await?;
        info!(expires_at = %token.expires_at, "acquired access token");
        *self.current.write() = Some(token.clone());
        Ok(token)
    }
}
