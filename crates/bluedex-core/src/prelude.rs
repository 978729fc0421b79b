/*!
 * Prelude module for bluedex core.
 *
 * This module re-exports commonly used types and functions from the core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{canonical_address, is_hardware_address, BusPath, Properties, Value};

// Re-export config types
pub use crate::config::{BusConfig, Config, ConfigBuilder, DiscoveryConfig, SharedConfig};

// Re-export utility functions
pub use crate::utils::{interruptible_wait, millis_to_duration, WaitOutcome};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
