//! OAuth access-token cache for partner platform calls.
//!
//! Tokens are cached per tenant under `tenant:{tenant}:token` and handed out only while
//! `now < expires_at - buffer`, so a caller never starts a request with a token that is
//! about to lapse. Refreshes are serialized through a [`bridge_lock`] lock by default;
//! callers that lose the race poll the cache briefly and then fetch on their own.

mod cache;
mod error;
mod fetcher;

use std::time::Duration;

use bridge_core::CoordinationConfig;
use serde::{Deserialize, Serialize};

pub use cache::TokenCache;
pub use error::TokenError;
pub use fetcher::{FetchedToken, TokenFetcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSettings {
    /// Margin before `expires_at` after which a cached token is treated as stale.
    pub buffer: Duration,
    /// Serialize refreshes through the token lock.
    pub lock_refresh: bool,
    pub wait_attempts: u32,
    pub wait_interval: Duration,
    /// Bound on each fetch attempt.
    pub fetch_timeout: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            buffer: Duration::from_secs(300),
            lock_refresh: true,
            wait_attempts: 5,
            wait_interval: Duration::from_millis(50),
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

impl TokenSettings {
    pub fn from_config(cfg: &CoordinationConfig) -> Self {
        Self {
            buffer: cfg.token_buffer,
            fetch_timeout: cfg.remote_call_timeout,
            ..Self::default()
        }
    }
}

/// Stored form of a tenant token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at_ms: i64,
    pub cached_at_ms: i64,
}

impl CachedToken {
    /// Whether the token may still be handed out at `now_ms`.
    ///
    /// ```
    /// use std::time::Duration;
    /// use bridge_token::CachedToken;
    ///
    /// let token = CachedToken { access_token: "t".into(), expires_at_ms: 10_000, cached_at_ms: 0 };
    /// assert!(token.is_usable(6_999, Duration::from_secs(3)));
    /// assert!(!token.is_usable(7_000, Duration::from_secs(3)));
    /// ```
    pub fn is_usable(&self, now_ms: i64, buffer: Duration) -> bool {
        now_ms < self.expires_at_ms.saturating_sub(buffer.as_millis() as i64)
    }

    /// Milliseconds left before the token reaches its buffer.
    pub fn usable_for_ms(&self, now_ms: i64, buffer: Duration) -> i64 {
        self.expires_at_ms
            .saturating_sub(buffer.as_millis() as i64)
            .saturating_sub(now_ms)
            .max(0)
    }
}
