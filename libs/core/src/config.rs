//! Environment-driven settings for the coordination core.

use std::time::Duration;

use tracing::warn;

const MAPPING_TTL_ENV: &str = "MAPPING_TTL_SECONDS";
const TOKEN_BUFFER_ENV: &str = "TOKEN_BUFFER_SECONDS";
const RATE_LIMIT_WINDOW_ENV: &str = "RATE_LIMIT_WINDOW_SECONDS";
const DEFAULT_RATE_LIMIT_ENV: &str = "DEFAULT_RATE_LIMIT";
const LOCK_TTL_ENV: &str = "LOCK_TTL_SECONDS";
const LOCK_RETRY_COUNT_ENV: &str = "LOCK_RETRY_COUNT";
const LOCK_RETRY_DELAY_ENV: &str = "LOCK_RETRY_DELAY_MS";
const MAPPING_WAIT_BUDGET_ENV: &str = "MAPPING_WAIT_BUDGET_MS";
const RETRY_MAX_ATTEMPTS_ENV: &str = "RETRY_MAX_ATTEMPTS";
const RETRY_BASE_DELAY_ENV: &str = "RETRY_BASE_DELAY_MS";
const RETRY_MAX_DELAY_ENV: &str = "RETRY_MAX_DELAY_MS";
const REMOTE_CALL_TIMEOUT_ENV: &str = "REMOTE_CALL_TIMEOUT_MS";
const LOCK_MAX_HOLD_ENV: &str = "LOCK_MAX_HOLD_MS";
const NAMESPACE_ENV: &str = "STORE_NAMESPACE";
const REDIS_URL_ENV: &str = "REDIS_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationConfig {
    /// Inactivity TTL of a thread ↔ conversation mapping.
    pub mapping_ttl: Duration,
    /// Safety margin subtracted from a token's expiry before it is considered stale.
    pub token_buffer: Duration,
    pub rate_limit_window: Duration,
    /// Admissions per window when no tenant override exists.
    pub default_rate_limit: u64,
    pub lock_ttl: Duration,
    pub lock_retry_count: u32,
    pub lock_retry_delay: Duration,
    /// Total time a resolver waits for another holder to publish a mapping.
    pub mapping_wait_budget: Duration,
    pub retry_max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Upper bound on a single remote attempt (conversation creation, token fetch).
    pub remote_call_timeout: Duration,
    /// Longest a holder keeps renewing a lock while its remote call is in flight.
    pub lock_max_hold: Duration,
    pub namespace: Option<String>,
    pub redis_url: Option<String>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            mapping_ttl: Duration::from_secs(3600),
            token_buffer: Duration::from_secs(300),
            rate_limit_window: Duration::from_secs(60),
            default_rate_limit: 100,
            lock_ttl: Duration::from_secs(5),
            lock_retry_count: 3,
            lock_retry_delay: Duration::from_millis(100),
            mapping_wait_budget: Duration::from_millis(5_000),
            retry_max_retries: 3,
            retry_base_delay: Duration::from_millis(1_000),
            retry_max_delay: Duration::from_millis(30_000),
            remote_call_timeout: Duration::from_millis(15_000),
            lock_max_hold: Duration::from_millis(90_000),
            namespace: None,
            redis_url: None,
        }
    }
}

impl CoordinationConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let number = |name: &str| -> Option<u64> {
            let raw = lookup(name)?;
            match raw.trim().parse::<u64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(variable = name, value = %raw, "ignoring unparseable setting");
                    None
                }
            }
        };

        if let Some(secs) = number(MAPPING_TTL_ENV) {
            cfg.mapping_ttl = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = number(TOKEN_BUFFER_ENV) {
            cfg.token_buffer = Duration::from_secs(secs);
        }
        if let Some(secs) = number(RATE_LIMIT_WINDOW_ENV) {
            cfg.rate_limit_window = Duration::from_secs(secs.max(1));
        }
        if let Some(limit) = number(DEFAULT_RATE_LIMIT_ENV) {
            cfg.default_rate_limit = limit.max(1);
        }
        if let Some(secs) = number(LOCK_TTL_ENV) {
            cfg.lock_ttl = Duration::from_secs(secs.max(1));
        }
        if let Some(count) = number(LOCK_RETRY_COUNT_ENV) {
            cfg.lock_retry_count = count.min(u64::from(u32::MAX)) as u32;
        }
        if let Some(ms) = number(LOCK_RETRY_DELAY_ENV) {
            cfg.lock_retry_delay = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = number(MAPPING_WAIT_BUDGET_ENV) {
            cfg.mapping_wait_budget = Duration::from_millis(ms.max(1));
        }
        if let Some(count) = number(RETRY_MAX_ATTEMPTS_ENV) {
            cfg.retry_max_retries = count.min(16) as u32;
        }
        if let Some(ms) = number(RETRY_BASE_DELAY_ENV) {
            cfg.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = number(RETRY_MAX_DELAY_ENV) {
            cfg.retry_max_delay = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = number(REMOTE_CALL_TIMEOUT_ENV) {
            cfg.remote_call_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = number(LOCK_MAX_HOLD_ENV) {
            cfg.lock_max_hold = Duration::from_millis(ms.max(1));
        }
        if cfg.retry_max_delay < cfg.retry_base_delay {
            cfg.retry_max_delay = cfg.retry_base_delay;
        }
        cfg.namespace = lookup(NAMESPACE_ENV).filter(|ns| !ns.trim().is_empty());
        cfg.redis_url = lookup(REDIS_URL_ENV).filter(|url| !url.trim().is_empty());
        cfg
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_observed_constants() {
        let cfg = CoordinationConfig::from_lookup(|_| None);
        assert_eq!(cfg, CoordinationConfig::default());
        assert_eq!(cfg.mapping_ttl, Duration::from_secs(3600));
        assert_eq!(cfg.token_buffer, Duration::from_secs(300));
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(60));
        assert_eq!(cfg.lock_ttl, Duration::from_secs(5));
        assert_eq!(cfg.lock_retry_count, 3);
        assert_eq!(cfg.remote_call_timeout, Duration::from_secs(15));
        assert_eq!(cfg.lock_max_hold, Duration::from_secs(90));
    }

    #[test]
    fn overrides_and_clamps() {
        let cfg = CoordinationConfig::from_lookup(lookup_from(&[
            ("LOCK_TTL_SECONDS", "0"),
            ("LOCK_RETRY_COUNT", "7"),
            ("MAPPING_WAIT_BUDGET_MS", "8000"),
            ("RETRY_BASE_DELAY_MS", "2000"),
            ("RETRY_MAX_DELAY_MS", "500"),
            ("REMOTE_CALL_TIMEOUT_MS", "0"),
            ("LOCK_MAX_HOLD_MS", "45000"),
            ("STORE_NAMESPACE", "bridge"),
            ("REDIS_URL", " "),
        ]));
        assert_eq!(cfg.lock_ttl, Duration::from_secs(1));
        assert_eq!(cfg.lock_retry_count, 7);
        assert_eq!(cfg.mapping_wait_budget, Duration::from_secs(8));
        assert_eq!(cfg.retry_max_delay, Duration::from_millis(2000));
        assert_eq!(cfg.remote_call_timeout, Duration::from_millis(1));
        assert_eq!(cfg.lock_max_hold, Duration::from_secs(45));
        assert_eq!(cfg.namespace.as_deref(), Some("bridge"));
        assert!(cfg.redis_url.is_none());
    }

    #[test]
    fn garbage_values_fall_back_to_defaults() {
        let cfg = CoordinationConfig::from_lookup(lookup_from(&[("MAPPING_TTL_SECONDS", "soon")]));
        assert_eq!(cfg.mapping_ttl, Duration::from_secs(3600));
    }
}
