use std::future::Future;

use async_trait::async_trait;
use bridge_core::{ConversationId, TenantId, ThreadId};
use bridge_retry::RemoteError;

/// Creates the contact-center conversation for a thread on the remote platform.
///
/// Supplied by the inbound event handler; the resolver wraps each call in the retry
/// executor, so implementations should perform exactly one remote attempt and return a
/// classified [`RemoteError`] on failure.
#[async_trait]
pub trait ConversationCreator: Send + Sync {
    async fn create_conversation(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
    ) -> Result<ConversationId, RemoteError>;
}

#[async_trait]
impl<F, Fut> ConversationCreator for F
where
    F: Fn(TenantId, ThreadId) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ConversationId, RemoteError>> + Send + 'static,
{
    async fn create_conversation(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
    ) -> Result<ConversationId, RemoteError> {
        (self)(tenant.clone(), thread.clone()).await
    }
}
