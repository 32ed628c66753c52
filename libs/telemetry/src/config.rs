use std::env;

const SERVICE_NAME_ENV: &str = "SERVICE_NAME";
const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// JSON lines unless `LOG_FORMAT` is `text`, `pretty` or `plain`.
    pub json_logs: bool,
    /// Directive used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str) -> Self {
        Self::from_lookup(default_service_name, |name| env::var(name).ok())
    }

    pub fn from_lookup<F>(default_service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name = lookup(SERVICE_NAME_ENV)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_service_name.to_string());
        let json_logs = lookup(LOG_FORMAT_ENV)
            .map(|v| !matches!(v.to_lowercase().as_str(), "text" | "pretty" | "plain"))
            .unwrap_or(true);
        Self {
            service_name,
            json_logs,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }

    pub fn plain(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            json_logs: false,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}
