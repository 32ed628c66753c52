//! Conversation mapping resolver.
//!
//! Maps `(tenant, thread)` to the contact-center conversation created for it, creating the
//! remote conversation at most once per mapping lifetime even when several webhook
//! deliveries for the same thread race. Creation runs under a [`bridge_lock`] lock with a
//! double-checked read; waiters poll the mapping key within a bounded budget.
//!
//! When a lock expires mid-creation a second holder may also call the creator. That
//! duplicate is a tolerated degraded outcome; creators should pass an idempotency key to
//! the remote platform where it supports one.

mod creator;
mod error;
mod resolver;

use std::time::Duration;

use bridge_core::CoordinationConfig;

pub use creator::ConversationCreator;
pub use error::MappingError;
pub use resolver::ConversationResolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingSettings {
    /// Inactivity TTL applied to both directions of a mapping.
    pub mapping_ttl: Duration,
    /// Total time a caller waits while another holder creates the mapping.
    pub wait_budget: Duration,
    /// Slide the inactivity TTL forward whenever a mapping is read.
    pub refresh_on_read: bool,
    pub poll_initial: Duration,
    pub poll_max: Duration,
    /// Bound on each creation attempt; an attempt that outlives it counts as a timeout.
    pub creation_timeout: Duration,
    /// Renewal stops after this long, letting the lock lapse even if creation still hangs.
    pub max_lock_hold: Duration,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            mapping_ttl: Duration::from_secs(3600),
            wait_budget: Duration::from_secs(5),
            refresh_on_read: true,
            poll_initial: Duration::from_millis(50),
            poll_max: Duration::from_millis(500),
            creation_timeout: Duration::from_secs(15),
            max_lock_hold: Duration::from_secs(90),
        }
    }
}

impl MappingSettings {
    pub fn from_config(cfg: &CoordinationConfig) -> Self {
        Self {
            mapping_ttl: cfg.mapping_ttl,
            wait_budget: cfg.mapping_wait_budget,
            creation_timeout: cfg.remote_call_timeout,
            max_lock_hold: cfg.lock_max_hold,
            ..Self::default()
        }
    }
}
