use std::time::Duration;

use bridge_core::{
    CoordinationConfig, KeySpace, SharedClock, TenantId, system_clock, token_lock_resource,
};
use bridge_lock::{LockError, LockManager, LockSettings, LockToken};
use bridge_retry::{RemoteError, RetryExecutor, RetryPolicy, TransportFailure};
use bridge_store::{SharedTtlStore, StoreError};
use tracing::{debug, info, instrument, warn};

use crate::{CachedToken, TokenError, TokenFetcher, TokenSettings};

/// Reported lifetimes beyond this are treated as this long.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Clone)]
pub struct TokenCache {
    store: SharedTtlStore,
    keys: KeySpace,
    locks: LockManager,
    retry: RetryExecutor,
    clock: SharedClock,
    settings: TokenSettings,
}

impl TokenCache {
    pub fn new(
        store: SharedTtlStore,
        keys: KeySpace,
        locks: LockManager,
        retry: RetryExecutor,
        clock: SharedClock,
        settings: TokenSettings,
    ) -> Self {
        Self {
            store,
            keys,
            locks,
            retry,
            clock,
            settings,
        }
    }

    pub fn from_config(store: SharedTtlStore, cfg: &CoordinationConfig) -> Self {
        let keys = KeySpace::new(cfg.namespace.clone());
        let locks = LockManager::new(store.clone(), keys.clone(), LockSettings::from_config(cfg));
        Self::new(
            store,
            keys,
            locks,
            RetryExecutor::new(RetryPolicy::from_config(cfg)),
            system_clock(),
            TokenSettings::from_config(cfg),
        )
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Returns a token usable for at least the configured buffer, fetching one through
    /// `fetcher` when the cache is empty or stale.
    #[instrument(name = "token.get", skip(self, tenant, fetcher), fields(tenant = %tenant))]
    pub async fn get_token<F>(&self, tenant: &TenantId, fetcher: &F) -> Result<String, TokenError>
    where
        F: TokenFetcher + ?Sized,
    {
        validate(tenant)?;
        if let Some(token) = self.read_usable(tenant).await? {
            metrics::counter!("token_cache_hit_total", "tenant" => tenant.to_string())
                .increment(1);
            return Ok(token.access_token);
        }
        if !self.settings.lock_refresh {
            return self.fetch_and_store(tenant, fetcher).await;
        }
        self.refresh_serialized(tenant, fetcher, None).await
    }

    /// Fetches a new token regardless of what is cached, e.g. after the partner rejected
    /// the cached one. A refresh completed by someone else meanwhile is reused.
    #[instrument(name = "token.refresh", skip(self, tenant, fetcher), fields(tenant = %tenant))]
    pub async fn refresh<F>(&self, tenant: &TenantId, fetcher: &F) -> Result<String, TokenError>
    where
        F: TokenFetcher + ?Sized,
    {
        validate(tenant)?;
        if !self.settings.lock_refresh {
            return self.fetch_and_store(tenant, fetcher).await;
        }
        let since = self.clock.now_unix_ms();
        self.refresh_serialized(tenant, fetcher, Some(since)).await
    }

    /// Drops the cached token for `tenant`.
    pub async fn invalidate(&self, tenant: &TenantId) -> Result<(), TokenError> {
        validate(tenant)?;
        self.store.delete(&self.keys.token(tenant)).await?;
        debug!(%tenant, "cached token dropped");
        Ok(())
    }

    /// Cached entry as stored, usable or not.
    pub async fn peek(&self, tenant: &TenantId) -> Result<Option<CachedToken>, TokenError> {
        validate(tenant)?;
        self.read_cached(tenant).await
    }

    /// `fresh_since` set: only tokens cached after that instant count.
    async fn refresh_serialized<F>(
        &self,
        tenant: &TenantId,
        fetcher: &F,
        fresh_since: Option<i64>,
    ) -> Result<String, TokenError>
    where
        F: TokenFetcher + ?Sized,
    {
        let resource = token_lock_resource(tenant);
        let ttl = self.locks.settings().ttl;
        match self.locks.acquire(&resource, ttl, 0).await {
            Ok(lock) => {
                let outcome = match self.read_fresh(tenant, fresh_since).await {
                    Ok(Some(token)) => Ok(token.access_token),
                    Ok(None) => self.fetch_and_store(tenant, fetcher).await,
                    Err(err) => Err(err),
                };
                self.release_quietly(&lock).await;
                outcome
            }
            Err(LockError::Busy { .. }) => {
                for _ in 0..self.settings.wait_attempts {
                    tokio::time::sleep(self.settings.wait_interval).await;
                    if let Some(token) = self.read_fresh(tenant, fresh_since).await? {
                        debug!("token refreshed by concurrent holder");
                        return Ok(token.access_token);
                    }
                }
                debug!("token refresh still in flight elsewhere; fetching without lock");
                self.fetch_and_store(tenant, fetcher).await
            }
            Err(LockError::Store(err)) => Err(err.into()),
        }
    }

    async fn fetch_and_store<F>(&self, tenant: &TenantId, fetcher: &F) -> Result<String, TokenError>
    where
        F: TokenFetcher + ?Sized,
    {
        let attempt_timeout = self.settings.fetch_timeout;
        let fetched = self
            .retry
            .execute("fetch_token", move || async move {
                let fetched = tokio::time::timeout(attempt_timeout, fetcher.fetch_token(tenant))
                    .await
                    .map_err(|_| {
                        RemoteError::transport(
                            TransportFailure::Timeout,
                            format!("token fetch exceeded {attempt_timeout:?}"),
                        )
                    })??;
                if fetched.access_token.trim().is_empty() {
                    return Err(RemoteError::Rejected(
                        "authorization server returned an empty access token".into(),
                    ));
                }
                Ok(fetched)
            })
            .await
            .map_err(|source| TokenError::FetchFailed {
                tenant: tenant.clone(),
                source,
            })?;
        metrics::counter!("token_refresh_total", "tenant" => tenant.to_string()).increment(1);

        let now = self.clock.now_unix_ms();
        let buffer = self.settings.buffer;
        let lifetime = fetched.expires_in.min(MAX_TOKEN_LIFETIME);
        if lifetime <= buffer {
            warn!(
                expires_in_s = lifetime.as_secs(),
                buffer_s = buffer.as_secs(),
                "token lifetime does not exceed buffer; not caching"
            );
            return Ok(fetched.access_token);
        }

        let cached = CachedToken {
            access_token: fetched.access_token,
            expires_at_ms: now.saturating_add(lifetime.as_millis() as i64),
            cached_at_ms: now,
        };
        let payload = serde_json::to_string(&cached).map_err(|err| {
            StoreError::InvalidValue {
                key: self.keys.token(tenant),
                reason: err.to_string(),
            }
        })?;
        let ttl = lifetime - buffer;
        self.store
            .set(&self.keys.token(tenant), &payload, ttl)
            .await?;
        info!(ttl_s = ttl.as_secs(), "access token refreshed");
        Ok(cached.access_token)
    }

    async fn read_fresh(
        &self,
        tenant: &TenantId,
        since: Option<i64>,
    ) -> Result<Option<CachedToken>, TokenError> {
        let token = self.read_usable(tenant).await?;
        Ok(token.filter(|token| since.is_none_or(|since| token.cached_at_ms > since)))
    }

    async fn read_usable(&self, tenant: &TenantId) -> Result<Option<CachedToken>, TokenError> {
        let now = self.clock.now_unix_ms();
        let buffer = self.settings.buffer;
        Ok(self
            .read_cached(tenant)
            .await?
            .filter(|token| token.is_usable(now, buffer)))
    }

    async fn read_cached(&self, tenant: &TenantId) -> Result<Option<CachedToken>, TokenError> {
        let key = self.keys.token(tenant);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<CachedToken>(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(err) => {
                warn!(%key, error = %err, "ignoring unreadable cached token");
                Ok(None)
            }
        }
    }

    async fn release_quietly(&self, lock: &LockToken) {
        if let Err(err) = self.locks.release(lock).await {
            warn!(error = %err, resource = lock.resource(), "token lock release failed");
        }
    }
}

fn validate(tenant: &TenantId) -> Result<(), TokenError> {
    if tenant.is_blank() {
        return Err(TokenError::InvalidIdentifier("tenant id"));
    }
    Ok(())
}
