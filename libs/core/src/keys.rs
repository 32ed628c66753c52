//! Key layout inside the shared TTL store.
//!
//! Mapping keys are tenant scoped (`tenant:{tenant}:mapping:wa:{thread}`). The
//! [`DEFAULT_TENANT`] keeps the legacy un-scoped form (`mapping:wa:{thread}`) so that
//! single-tenant deployments continue to read their existing entries.

use crate::ids::{ConversationId, TenantId, ThreadId};

/// Tenant id whose mapping keys use the legacy un-scoped layout.
pub const DEFAULT_TENANT: &str = "default";

/// Renders store keys, optionally prefixed with a deployment namespace.
///
/// ```
/// use bridge_core::{KeySpace, TenantId, ThreadId};
///
/// let keys = KeySpace::default();
/// assert_eq!(
///     keys.mapping_forward(&TenantId::from("t1"), &ThreadId::from("wa-555")),
///     "tenant:t1:mapping:wa:wa-555"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    namespace: Option<String>,
}

impl KeySpace {
    pub fn new(namespace: Option<String>) -> Self {
        let namespace = namespace
            .map(|ns| ns.trim().trim_end_matches(':').to_string())
            .filter(|ns| !ns.is_empty());
        Self { namespace }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn finish(&self, key: String) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{key}"),
            None => key,
        }
    }

    /// Thread → conversation key.
    pub fn mapping_forward(&self, tenant: &TenantId, thread: &ThreadId) -> String {
        if is_default(tenant) {
            self.finish(format!("mapping:wa:{thread}"))
        } else {
            self.finish(format!("tenant:{tenant}:mapping:wa:{thread}"))
        }
    }

    /// Conversation → thread key.
    pub fn mapping_reverse(&self, tenant: &TenantId, conversation: &ConversationId) -> String {
        if is_default(tenant) {
            self.finish(format!("mapping:conv:{conversation}"))
        } else {
            self.finish(format!("tenant:{tenant}:mapping:conv:{conversation}"))
        }
    }

    pub fn lock(&self, resource: &str) -> String {
        self.finish(format!("lock:{resource}"))
    }

    pub fn token(&self, tenant: &TenantId) -> String {
        self.finish(format!("tenant:{tenant}:token"))
    }

    pub fn rate_limit(&self, tenant: &TenantId, resource: &str, window_secs: u64) -> String {
        self.finish(format!("tenant:{tenant}:ratelimit:{resource}:{window_secs}"))
    }
}

fn is_default(tenant: &TenantId) -> bool {
    tenant.as_str() == DEFAULT_TENANT
}

/// Lock resource guarding creation of the mapping for one thread.
pub fn mapping_lock_resource(tenant: &TenantId, thread: &ThreadId) -> String {
    format!("tenant:{tenant}:mapping:{thread}")
}

/// Lock resource guarding the token refresh path of one tenant.
pub fn token_lock_resource(tenant: &TenantId) -> String {
    format!("tenant:{tenant}:token")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_scoped_layout() {
        let keys = KeySpace::default();
        let tenant = TenantId::from("t1");
        assert_eq!(
            keys.mapping_reverse(&tenant, &ConversationId::from("conv-abc")),
            "tenant:t1:mapping:conv:conv-abc"
        );
        assert_eq!(keys.token(&tenant), "tenant:t1:token");
        assert_eq!(
            keys.rate_limit(&tenant, "genesys.messages", 60),
            "tenant:t1:ratelimit:genesys.messages:60"
        );
        assert_eq!(
            keys.lock(&mapping_lock_resource(&tenant, &ThreadId::from("wa-555"))),
            "lock:tenant:t1:mapping:wa-555"
        );
    }

    #[test]
    fn default_tenant_keeps_legacy_mapping_keys() {
        let keys = KeySpace::default();
        let tenant = TenantId::from(DEFAULT_TENANT);
        assert_eq!(
            keys.mapping_forward(&tenant, &ThreadId::from("15551234")),
            "mapping:wa:15551234"
        );
        assert_eq!(
            keys.mapping_reverse(&tenant, &ConversationId::from("c-1")),
            "mapping:conv:c-1"
        );
    }

    #[test]
    fn namespace_prefixes_every_key() {
        let keys = KeySpace::new(Some("prod:".into()));
        assert_eq!(keys.namespace(), Some("prod"));
        assert_eq!(keys.lock("x"), "prod:lock:x");
        assert_eq!(KeySpace::new(Some("  ".into())), KeySpace::default());
    }
}
