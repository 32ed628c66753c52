use std::time::Duration;

use bridge_core::{
    ConversationId, CoordinationConfig, KeySpace, TenantId, ThreadId, mapping_lock_resource,
};
use bridge_lock::{LockError, LockManager, LockSettings, LockToken};
use bridge_retry::{RemoteError, RetryExecutor, RetryPolicy, TransportFailure};
use bridge_store::SharedTtlStore;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::{ConversationCreator, MappingError, MappingSettings};

const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(100);

/// Get-or-create resolver over the shared store.
#[derive(Clone)]
pub struct ConversationResolver {
    store: SharedTtlStore,
    keys: KeySpace,
    locks: LockManager,
    retry: RetryExecutor,
    settings: MappingSettings,
}

impl ConversationResolver {
    pub fn new(
        store: SharedTtlStore,
        keys: KeySpace,
        locks: LockManager,
        retry: RetryExecutor,
        settings: MappingSettings,
    ) -> Self {
        Self {
            store,
            keys,
            locks,
            retry,
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
            MappingSettings::from_config(cfg),
        )
    }

    /// Returns the conversation mapped to `thread`, creating it through `creator` when no
    /// mapping exists.
    ///
    /// 1. Fast path: read the forward key without locking.
    /// 2. Acquire the mapping lock and re-read; a concurrent holder may have finished.
    /// 3. Create remotely (retried), write reverse then forward key, release.
    ///
    /// While another holder owns the lock the call polls the forward key, taking the lock
    /// over if it frees up, and fails with [`MappingError::CreationTimeout`] once the wait
    /// budget is spent. The lock is released on every exit path and no partial mapping is
    /// left behind.
    #[instrument(
        name = "mapping.resolve",
        skip(self, tenant, thread, creator),
        fields(tenant = %tenant, thread = %thread)
    )]
    pub async fn resolve<C>(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
        creator: &C,
    ) -> Result<ConversationId, MappingError>
    where
        C: ConversationCreator + ?Sized,
    {
        validate(tenant, thread)?;
        if let Some(conversation) = self
            .read_forward(tenant, thread, self.settings.refresh_on_read)
            .await?
        {
            metrics::counter!("mapping_cache_hit_total", "tenant" => tenant.to_string())
                .increment(1);
            return Ok(conversation);
        }

        let resource = mapping_lock_resource(tenant, thread);
        let lock_settings = self.locks.settings().clone();
        let started = Instant::now();
        let deadline = started + self.settings.wait_budget;
        let mut retries = lock_settings.max_retries;
        let mut delay = self.settings.poll_initial;

        loop {
            match self
                .locks
                .acquire(&resource, lock_settings.ttl, retries)
                .await
            {
                Ok(lock) => {
                    let outcome = self.resolve_locked(tenant, thread, creator, &lock).await;
                    self.release_quietly(&lock).await;
                    return outcome;
                }
                Err(LockError::Busy { .. }) => {}
                Err(LockError::Store(err)) => return Err(err.into()),
            }
            // Subsequent attempts are paced by the poll loop below.
            retries = 0;

            if let Some(conversation) = self.read_forward(tenant, thread, false).await? {
                debug!("mapping published by concurrent holder");
                return Ok(conversation);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(self.settings.poll_max);
        }

        metrics::counter!("mapping_wait_timeout_total", "tenant" => tenant.to_string())
            .increment(1);
        let waited = started.elapsed();
        warn!(waited_ms = waited.as_millis() as u64, "gave up waiting for mapping creation");
        Err(MappingError::CreationTimeout {
            tenant: tenant.clone(),
            thread: thread.clone(),
            waited,
        })
    }

    /// Forward lookup without creation.
    pub async fn lookup(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
    ) -> Result<Option<ConversationId>, MappingError> {
        validate(tenant, thread)?;
        self.read_forward(tenant, thread, false).await
    }

    /// Reverse lookup used by the outbound path. Never creates and never locks.
    ///
    /// A reverse entry whose forward key no longer points back at `conversation` is stale
    /// and reported as absent.
    pub async fn resolve_by_conversation_id(
        &self,
        tenant: &TenantId,
        conversation: &ConversationId,
    ) -> Result<Option<ThreadId>, MappingError> {
        if tenant.is_blank() {
            return Err(MappingError::InvalidIdentifier("tenant id"));
        }
        if conversation.is_blank() {
            return Err(MappingError::InvalidIdentifier("conversation id"));
        }
        let reverse = self.keys.mapping_reverse(tenant, conversation);
        let Some(raw) = self.store.get(&reverse).await? else {
            return Ok(None);
        };
        let thread = ThreadId::new(raw);
        let forward = self.keys.mapping_forward(tenant, &thread);
        match self.store.get(&forward).await? {
            Some(current) if current == conversation.as_str() => {
                if self.settings.refresh_on_read {
                    self.refresh(&forward, &reverse).await;
                }
                Ok(Some(thread))
            }
            _ => {
                debug!(%conversation, %thread, "ignoring stale reverse mapping");
                Ok(None)
            }
        }
    }

    /// Removes both directions of the mapping for `thread`, returning the conversation it
    /// pointed to. The next inbound event will create a fresh conversation.
    #[instrument(name = "mapping.invalidate", skip(self, tenant, thread), fields(tenant = %tenant, thread = %thread))]
    pub async fn invalidate(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
    ) -> Result<Option<ConversationId>, MappingError> {
        validate(tenant, thread)?;
        let resource = mapping_lock_resource(tenant, thread);
        let lock = self
            .locks
            .acquire_default(&resource)
            .await
            .map_err(|err| MappingError::from_lock(err, tenant, thread))?;
        let outcome = self.remove_locked(tenant, thread).await;
        self.release_quietly(&lock).await;
        outcome
    }

    async fn remove_locked(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
    ) -> Result<Option<ConversationId>, MappingError> {
        let forward = self.keys.mapping_forward(tenant, thread);
        let Some(raw) = self.store.get(&forward).await? else {
            return Ok(None);
        };
        let conversation = ConversationId::new(raw);
        let reverse = self.keys.mapping_reverse(tenant, &conversation);
        self.store
            .compare_and_delete(&forward, conversation.as_str())
            .await?;
        self.store
            .compare_and_delete(&reverse, thread.as_str())
            .await?;
        info!(%conversation, "conversation mapping invalidated");
        Ok(Some(conversation))
    }

    async fn resolve_locked<C>(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
        creator: &C,
        lock: &LockToken,
    ) -> Result<ConversationId, MappingError>
    where
        C: ConversationCreator + ?Sized,
    {
        if let Some(conversation) = self.read_forward(tenant, thread, false).await? {
            debug!("mapping created while acquiring lock");
            return Ok(conversation);
        }

        let conversation = self
            .create_with_renewal(tenant, thread, creator, lock)
            .await
            .map_err(|source| MappingError::RemoteCreationFailed {
                tenant: tenant.clone(),
                thread: thread.clone(),
                source,
            })?;

        self.write_mapping(tenant, thread, &conversation).await?;
        metrics::counter!("mapping_created_total", "tenant" => tenant.to_string()).increment(1);
        info!(%conversation, "conversation mapping created");
        Ok(conversation)
    }

    /// Runs the retried creation call while renewing the lock every half TTL, for at most
    /// `max_lock_hold`. Each attempt is bounded by `creation_timeout`.
    async fn create_with_renewal<C>(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
        creator: &C,
        lock: &LockToken,
    ) -> Result<ConversationId, RemoteError>
    where
        C: ConversationCreator + ?Sized,
    {
        let ttl = self.locks.settings().ttl;
        let attempt_timeout = self.settings.creation_timeout;
        let creation = self.retry.execute("create_conversation", move || async move {
            let conversation =
                tokio::time::timeout(attempt_timeout, creator.create_conversation(tenant, thread))
                    .await
                    .map_err(|_| {
                        RemoteError::transport(
                            TransportFailure::Timeout,
                            format!("conversation creation exceeded {attempt_timeout:?}"),
                        )
                    })??;
            if conversation.is_blank() {
                return Err(RemoteError::Rejected(
                    "remote platform returned a blank conversation id".into(),
                ));
            }
            Ok(conversation)
        });
        tokio::pin!(creation);

        let every = (ttl / 2).max(MIN_RENEW_INTERVAL);
        let hold_until = Instant::now() + self.settings.max_lock_hold;
        let mut renewing = true;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + every, every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = &mut creation => return result,
                _ = heartbeat.tick(), if renewing => {
                    if Instant::now() >= hold_until {
                        renewing = false;
                        warn!(
                            max_hold_ms = self.settings.max_lock_hold.as_millis() as u64,
                            "mapping lock held past its limit; no longer renewing"
                        );
                    } else {
                        match self.locks.renew(lock, ttl).await {
                            Ok(true) => debug!("mapping lock renewed"),
                            Ok(false) => warn!("mapping lock lost during remote creation; a concurrent creation is possible"),
                            Err(err) => warn!(error = %err, "mapping lock renewal failed"),
                        }
                    }
                }
            }
        }
    }

    /// Reverse key first so that a visible forward key always has its reverse partner.
    async fn write_mapping(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
        conversation: &ConversationId,
    ) -> Result<(), MappingError> {
        let ttl = self.settings.mapping_ttl;
        let forward = self.keys.mapping_forward(tenant, thread);
        let reverse = self.keys.mapping_reverse(tenant, conversation);

        self.store.set(&reverse, thread.as_str(), ttl).await?;
        if let Err(err) = self.store.set(&forward, conversation.as_str(), ttl).await {
            if let Err(cleanup) = self
                .store
                .compare_and_delete(&reverse, thread.as_str())
                .await
            {
                warn!(error = %cleanup, key = %reverse, "could not remove orphaned reverse mapping");
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn read_forward(
        &self,
        tenant: &TenantId,
        thread: &ThreadId,
        refresh: bool,
    ) -> Result<Option<ConversationId>, MappingError> {
        let forward = self.keys.mapping_forward(tenant, thread);
        let Some(raw) = self.store.get(&forward).await? else {
            return Ok(None);
        };
        let conversation = ConversationId::new(raw);
        if refresh {
            let reverse = self.keys.mapping_reverse(tenant, &conversation);
            self.refresh(&forward, &reverse).await;
        }
        Ok(Some(conversation))
    }

    async fn refresh(&self, forward: &str, reverse: &str) {
        let ttl = self.settings.mapping_ttl;
        for key in [forward, reverse] {
            if let Err(err) = self.store.expire(key, ttl).await {
                warn!(error = %err, key, "could not refresh mapping ttl");
            }
        }
    }

    async fn release_quietly(&self, lock: &LockToken) {
        if let Err(err) = self.locks.release(lock).await {
            // The lock expires on its own; nothing else to undo.
            warn!(error = %err, resource = lock.resource(), "mapping lock release failed");
        }
    }
}

fn validate(tenant: &TenantId, thread: &ThreadId) -> Result<(), MappingError> {
    if tenant.is_blank() {
        return Err(MappingError::InvalidIdentifier("tenant id"));
    }
    if thread.is_blank() {
        return Err(MappingError::InvalidIdentifier("thread id"));
    }
    Ok(())
}
