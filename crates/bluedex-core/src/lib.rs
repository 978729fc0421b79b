/*!
 * bluedex Core
 *
 * This crate provides the shared foundation of bluedex: errors, configuration,
 * logging, bus path and property types, and the interruptible wait used by
 * discovery.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use anyhow;
    pub use serde;
    pub use tokio;
    pub use tracing;
}

/// bluedex core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("bluedex core {} initialized", VERSION);
    Ok(())
}
