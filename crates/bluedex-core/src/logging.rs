/*!
 * Logging functionality for bluedex.
 *
 * This module provides tracing setup and the spans used around scans and
 * discovery sessions.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// `RUST_LOG` takes precedence over `filter` when it is set.
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "bluedex_devices=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    init_layers(filter, true)
}

/// Initialize the logging system from the `[logging]` configuration section
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_layers(&config.level, config.with_target)
}

fn init_layers(filter: &str, with_target: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(with_target))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a span for an adapter, keyed by its interface name and address
pub fn adapter_span(name: &str, address: Option<&str>) -> Span {
    match address {
        Some(address) => tracing::info_span!("adapter", name = %name, address = %address),
        None => tracing::info_span!("adapter", name = %name),
    }
}

/// Create a span for a manager operation
///
/// # Arguments
///
/// * `name` - The name of the operation
/// * `component` - The component performing the operation
pub fn operation_span(name: &str, component: &str) -> Span {
    tracing::info_span!("operation", name = %name, component = %component)
}
