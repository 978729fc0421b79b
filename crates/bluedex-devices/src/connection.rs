/*!
 * Shared bus connection handle.
 */
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use bluedex_core::error::{Error, Result};
use bluedex_core::types::BusPath;

use crate::bus::{AdapterProxy, BusGateway, DeviceProxy, PropertyHandler};

/// A cloneable, read-only view of the bus connection.
///
/// Every adapter and device carries a clone. Only the manager can close it,
/// and only the first close reaches the gateway; later calls on any clone
/// fail with a transport error.
#[derive(Debug, Clone)]
pub struct BusConnection {
    gateway: Arc<dyn BusGateway>,
    closed: Arc<AtomicBool>,
}

impl BusConnection {
    /// Wrap an established gateway
    pub fn new(gateway: Arc<dyn BusGateway>) -> Self {
        Self {
            gateway,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::transport("bus connection is closed"));
        }
        Ok(())
    }

    /// Enumerate the child node names under `path`
    pub async fn list_children(&self, path: &BusPath) -> Result<BTreeSet<String>> {
        self.ensure_open()?;
        self.gateway.list_children(path).await
    }

    /// Obtain an adapter proxy, `None` if `path` is not an adapter
    pub async fn adapter_proxy(&self, path: &BusPath) -> Result<Option<Arc<dyn AdapterProxy>>> {
        self.ensure_open()?;
        self.gateway.adapter_proxy(path).await
    }

    /// Obtain a device proxy, `None` if `path` is not a device
    pub async fn device_proxy(&self, path: &BusPath) -> Result<Option<Arc<dyn DeviceProxy>>> {
        self.ensure_open()?;
        self.gateway.device_proxy(path).await
    }

    pub(crate) async fn add_property_handler(&self, handler: Arc<dyn PropertyHandler>) -> Result<()> {
        self.ensure_open()?;
        self.gateway.add_property_handler(handler).await
    }

    /// Disconnect from the bus. Returns `false` if it was already closed.
    ///
    /// A failed disconnect leaves the connection open so it can be retried.
    pub(crate) async fn close(&self) -> Result<bool> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Bus connection already closed");
            return Ok(false);
        }
        if let Err(e) = self.gateway.disconnect().await {
            self.closed.store(false, Ordering::Release);
            return Err(e);
        }
        info!("Bus connection closed");
        Ok(true)
    }
}
