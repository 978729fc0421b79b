/*!
 * Error types for the device manager.
 */
use thiserror::Error;

use bluedex_core::error::Error as CoreError;

/// Error type for device manager operations
#[derive(Error, Debug)]
pub enum ManagerError {
    /// No adapter matches the requested identifier, even after a rescan
    #[error("Could not find bluetooth adapter: {0}")]
    AdapterNotFound(String),

    /// A required identifier was empty or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Error reported by the bus gateway, propagated unchanged
    #[error("Bus error: {0}")]
    Bus(#[from] CoreError),
}

/// Result type for device manager operations
pub type Result<T> = std::result::Result<T, ManagerError>;

impl ManagerError {
    /// Create a new adapter not found error
    pub fn adapter_not_found<S: AsRef<str>>(ident: S) -> Self {
        ManagerError::AdapterNotFound(ident.as_ref().to_string())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument<S: AsRef<str>>(msg: S) -> Self {
        ManagerError::InvalidArgument(msg.as_ref().to_string())
    }

    /// Whether this error came from the underlying transport
    pub fn is_transport(&self) -> bool {
        matches!(self, ManagerError::Bus(CoreError::Transport(_)))
    }
}
