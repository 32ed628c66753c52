use std::time::Duration;

use bridge_core::{TenantId, ThreadId};
use bridge_lock::LockError;
use bridge_retry::RemoteError;
use bridge_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{0} must not be blank")]
    InvalidIdentifier(&'static str),
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    #[error("mapping for thread {thread} (tenant {tenant}) is locked by another holder")]
    LockBusy { tenant: TenantId, thread: ThreadId },
    #[error("no mapping for thread {thread} (tenant {tenant}) appeared within {waited:?}")]
    CreationTimeout {
        tenant: TenantId,
        thread: ThreadId,
        waited: Duration,
    },
    #[error("remote conversation creation failed for thread {thread} (tenant {tenant})")]
    RemoteCreationFailed {
        tenant: TenantId,
        thread: ThreadId,
        #[source]
        source: RemoteError,
    },
}

impl MappingError {
    /// Whether the caller should requeue the event and try again later.
    pub fn is_retry_later(&self) -> bool {
        match self {
            MappingError::InvalidIdentifier(_) => false,
            MappingError::StoreUnavailable(err) => err.is_transient(),
            MappingError::LockBusy { .. } | MappingError::CreationTimeout { .. } => true,
            MappingError::RemoteCreationFailed { source, .. } => source.is_retryable(),
        }
    }

    pub(crate) fn from_lock(err: LockError, tenant: &TenantId, thread: &ThreadId) -> Self {
        match err {
            LockError::Busy { .. } => MappingError::LockBusy {
                tenant: tenant.clone(),
                thread: thread.clone(),
            },
            LockError::Store(err) => MappingError::StoreUnavailable(err),
        }
    }
}
