use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bridge_core::{ConversationId, TenantId, ThreadId};
use bridge_mapping::ConversationCreator;
use bridge_retry::RemoteError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Creates conversations by POSTing `{tenant, thread_id}` to an HTTP endpoint that
/// answers `{conversation_id}`.
pub struct HttpConversationCreator {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    tenant: &'a str,
    thread_id: &'a str,
}

#[derive(Deserialize)]
struct CreateResponse {
    conversation_id: String,
}

impl HttpConversationCreator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ConversationCreator for HttpConversationCreator {
    async fn create_conversation(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
    ) -> Result<ConversationId, RemoteError> {
        let response = self
            .client
            .post(&self.url)
            .json(&CreateRequest {
                tenant: tenant.as_str(),
                thread_id: thread.as_str(),
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), body));
        }
        let created: CreateResponse = response.json().await?;
        debug!(conversation = %created.conversation_id, "remote conversation created");
        Ok(ConversationId::new(created.conversation_id))
    }
}
