use bridge_core::TenantId;
use bridge_retry::RemoteError;
use bridge_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("{0} must not be blank")]
    InvalidIdentifier(&'static str),
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    #[error("token fetch failed for tenant {tenant}")]
    FetchFailed {
        tenant: TenantId,
        #[source]
        source: RemoteError,
    },
}

impl TokenError {
    pub fn is_retry_later(&self) -> bool {
        match self {
            TokenError::InvalidIdentifier(_) => false,
            TokenError::StoreUnavailable(err) => err.is_transient(),
            TokenError::FetchFailed { source, .. } => source.is_retryable(),
        }
    }
}
