//! Logging setup shared by bridge binaries.
//!
//! Library crates only emit through `tracing` and the `metrics` facade; binaries call
//! [`install`] once at startup to get an `EnvFilter`-driven JSON or plain subscriber.

mod config;
mod tracing_init;

use anyhow::Result;

pub use config::TelemetryConfig;
pub use tracing_init::init_telemetry;

/// Installs the subscriber configured from `RUST_LOG` and `LOG_FORMAT`.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(TelemetryConfig::from_env(service_name))
}
