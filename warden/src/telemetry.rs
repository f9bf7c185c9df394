//! Tracing initialization.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] (default `info`, overridden by
//! `RUST_LOG`) and a fmt layer. The fmt layer writes human-readable lines or, with
//! `log_format: json`, one JSON object per event for log shippers.

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogFormat;

/// Initialize the global tracing subscriber. Fails if one is already installed.
pub fn init_telemetry(log_format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }

    info!(?log_format, "Telemetry initialized");
    Ok(())
}
