//! Diagnostic logging setup.
//!
//! Components log through `tracing` macros; the binary installs a single fmt
//! subscriber here. `RUST_LOG` always wins over the configured level.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::config::LoggingConfig;
use crate::core::errors::{LfwError, Result};

/// Filter directive used when `RUST_LOG` is unset.
#[must_use]
pub fn default_directive(config: &LoggingConfig) -> &'static str {
    if config.debug {
        "info,log_file_watcher=debug"
    } else {
        "info"
    }
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|error| LfwError::Runtime {
            details: format!("failed to install log subscriber: {error}"),
        })
}
