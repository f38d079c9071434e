//! Logging initialization for the prism binary.
//!
//! The `[logging]` config section picks the base level and format;
//! the global CLI flags override it, and `RUST_LOG` overrides both.
//! Logs go to stderr so stdout stays reserved for command output.

use prism_core::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Fold the CLI flags into the configured settings. Flags win.
pub fn effective(config: &LoggingConfig, verbose: bool, json_logs: bool) -> LoggingConfig {
    LoggingConfig {
        level: if verbose {
            "debug".to_string()
        } else {
            config.level.clone()
        },
        format: if json_logs {
            "json".to_string()
        } else {
            config.format.clone()
        },
    }
}

/// Install the global subscriber.
pub fn init(settings: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));
    let stderr = fmt::layer().with_writer(std::io::stderr);
    if settings.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr.with_target(false).with_ansi(true))
            .init();
    }
}
