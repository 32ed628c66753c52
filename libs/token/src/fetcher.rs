use std::{future::Future, time::Duration};

use async_trait::async_trait;
use bridge_core::TenantId;
use bridge_retry::RemoteError;

/// Token as returned by the authorization server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedToken {
    pub access_token: String,
    /// Lifetime reported by the server (`expires_in`).
    pub expires_in: Duration,
}

impl FetchedToken {
    pub fn new(access_token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in,
        }
    }
}

/// Obtains a fresh token for a tenant. One remote attempt per call; the cache retries.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch_token(&self, tenant: &TenantId) -> Result<FetchedToken, RemoteError>;
}

#[async_trait]
impl<F, Fut> TokenFetcher for F
where
    F: Fn(TenantId) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FetchedToken, RemoteError>> + Send + 'static,
{
    async fn fetch_token(&self, tenant: &TenantId) -> Result<FetchedToken, RemoteError> {
        (self)(tenant.clone()).await
    }
}
