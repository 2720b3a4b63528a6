//! # Logging
//!
//! Tracing subscriber initialization.
//!
//! `RUST_LOG` overrides the configured filter. Initialization happens at
//! most once per process; later calls are no-ops.

use crate::config::{LogConfig, LogFormat};
use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Installs the global tracing subscriber.
///
/// # Examples
///
/// ```
/// use rfq_dispatch::config::LogConfig;
/// use rfq_dispatch::logging::init_tracing;
///
/// init_tracing(&LogConfig::default());
/// init_tracing(&LogConfig::default()); // no-op
/// ```
pub fn init_tracing(config: &LogConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));
        let registry = tracing_subscriber::registry().with(filter);

        let result = match config.format {
            LogFormat::Json => registry
                .with(fmt::layer().json().with_current_span(false))
                .try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        };
        if let Err(e) = result {
            eprintln!("tracing subscriber already installed: {e}");
        }
    });
}
