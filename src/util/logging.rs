//! Logging initialization and configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system.
///
/// The `"production"` environment selects structured JSON output with
/// RFC3339 timestamps; any other environment selects human-readable
/// output with ANSI colors.
///
/// # Arguments
///
/// * `level` - Log level filter (e.g., "info", "debug")
/// * `environment` - Deployment environment name from configuration
pub fn init_logging(level: &str, environment: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if environment == "production" {
        registry
            .with(fmt::layer().json())
            .init();
    } else {
        registry
            .with(fmt::layer().pretty())
            .init();
    }
}
