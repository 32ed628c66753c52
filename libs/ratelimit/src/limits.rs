use std::{collections::HashMap, time::Duration};

use bridge_core::{CoordinationConfig, TenantId};
use bridge_store::StoreError;
use serde::Deserialize;
use tracing::warn;

use crate::RateLimiter;

const RATE_LIMIT_ENV: &str = "TENANT_RATE_LIMITS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u64,
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Default budget plus per-tenant, per-resource overrides.
#[derive(Debug, Clone, Default)]
pub struct RateLimits {
    default: RateLimit,
    tenants: HashMap<String, HashMap<String, RateLimit>>,
}

#[derive(Debug, Deserialize)]
struct ResourceOverride {
    limit: u64,
    window_seconds: Option<u64>,
}

impl RateLimits {
    pub fn new(default: RateLimit) -> Self {
        Self {
            default,
            tenants: HashMap::new(),
        }
    }

    pub fn from_env(cfg: &CoordinationConfig) -> Self {
        Self::from_lookup(cfg, |name| std::env::var(name).ok())
    }

    /// Reads `TENANT_RATE_LIMITS`:
    /// `{"<tenant>": {"<resource>": {"limit": 10, "window_seconds": 60}}}`.
    /// An unreadable value is logged and ignored.
    pub fn from_lookup<F>(cfg: &CoordinationConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = RateLimit {
            limit: cfg.default_rate_limit,
            window: cfg.rate_limit_window,
        };
        let mut limits = Self::new(default);
        let Some(raw) = lookup(RATE_LIMIT_ENV).filter(|raw| !raw.trim().is_empty()) else {
            return limits;
        };
        match serde_json::from_str::<HashMap<String, HashMap<String, ResourceOverride>>>(&raw) {
            Ok(map) => {
                for (tenant, resources) in map {
                    for (resource, entry) in resources {
                        let window = entry
                            .window_seconds
                            .map(|secs| Duration::from_secs(secs.max(1)))
                            .unwrap_or(default.window);
                        limits = limits.with_override(
                            &tenant,
                            &resource,
                            RateLimit {
                                limit: entry.limit,
                                window,
                            },
                        );
                    }
                }
            }
            Err(err) => warn!(variable = RATE_LIMIT_ENV, error = %err, "ignoring unparseable rate limits"),
        }
        limits
    }

    pub fn with_override(mut self, tenant: &str, resource: &str, limit: RateLimit) -> Self {
        self.tenants
            .entry(tenant.to_string())
            .or_default()
            .insert(resource.to_string(), limit);
        self
    }

    pub fn get(&self, tenant: &TenantId, resource: &str) -> RateLimit {
        self.tenants
            .get(tenant.as_str())
            .and_then(|resources| resources.get(resource))
            .copied()
            .unwrap_or(self.default)
    }

    /// Applies the configured budget for `(tenant, resource)` through `limiter`.
    pub async fn check<L>(
        &self,
        limiter: &L,
        tenant: &TenantId,
        resource: &str,
    ) -> Result<bool, StoreError>
    where
        L: RateLimiter + ?Sized,
    {
        let RateLimit { limit, window } = self.get(tenant, resource);
        limiter.try_acquire(tenant, resource, limit, window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |name| (name == RATE_LIMIT_ENV).then(|| value.to_string())
    }

    #[test]
    fn parses_tenant_overrides() {
        let cfg = CoordinationConfig::default();
        let limits = RateLimits::from_lookup(
            &cfg,
            lookup(r#"{ "t1": { "genesys": { "limit": 10, "window_seconds": 30 }, "wa": { "limit": 5 } } }"#),
        );
        let t1 = TenantId::from("t1");
        assert_eq!(
            limits.get(&t1, "genesys"),
            RateLimit {
                limit: 10,
                window: Duration::from_secs(30)
            }
        );
        assert_eq!(
            limits.get(&t1, "wa"),
            RateLimit {
                limit: 5,
                window: Duration::from_secs(60)
            }
        );
        assert_eq!(limits.get(&t1, "other"), RateLimit::default());
        assert_eq!(limits.get(&TenantId::from("t2"), "genesys"), RateLimit::default());
    }

    #[test]
    fn defaults_follow_configuration() {
        let cfg = CoordinationConfig {
            default_rate_limit: 7,
            rate_limit_window: Duration::from_secs(10),
            ..CoordinationConfig::default()
        };
        let limits = RateLimits::from_lookup(&cfg, |_| None);
        assert_eq!(
            limits.get(&TenantId::from("any"), "any"),
            RateLimit {
                limit: 7,
                window: Duration::from_secs(10)
            }
        );
    }

    #[test]
    fn unparseable_overrides_are_ignored() {
        let cfg = CoordinationConfig::default();
        let limits = RateLimits::from_lookup(&cfg, lookup("{not json"));
        assert_eq!(limits.get(&TenantId::from("t1"), "genesys"), RateLimit::default());
    }
}
