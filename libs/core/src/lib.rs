//! Shared contracts for the bridge coordination core.
//!
//! This crate carries the identifiers exchanged between the consumer channel and the
//! contact-center platform, the key layout used in the shared TTL store, the wall clock
//! abstraction used for token expiry, and the environment-driven configuration.
pub mod clock;
pub mod config;
pub mod ids;
pub mod keys;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use config::CoordinationConfig;
pub use ids::{ConversationId, TenantId, ThreadId};
pub use keys::{DEFAULT_TENANT, KeySpace, mapping_lock_resource, token_lock_resource};
