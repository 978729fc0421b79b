/*!
 * Timed device discovery.
 *
 * A [`DiscoverySession`] runs the discovery protocol against one adapter:
 * start discovery, wait, stop discovery, then enumerate the device nodes
 * under the adapter and record them in the [`DeviceIndex`].
 */
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn, Instrument};

use bluedex_core::error::Result;
use bluedex_core::logging::adapter_span;
use bluedex_core::types::BusPath;
use bluedex_core::utils::interruptible_wait;

use crate::adapter::Adapter;
use crate::connection::BusConnection;
use crate::device::Device;
use crate::registry::DeviceIndex;

/// Outcome of one discovery session
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    /// Address of the adapter that ran the session
    pub adapter_address: String,
    /// Whether the radio accepted the start request
    pub started: bool,
    /// Whether the wait was cut short by an interrupt
    pub interrupted: bool,
    /// Devices recorded by this session, in enumeration order
    pub devices: Vec<Arc<Device>>,
}

impl DiscoveryReport {
    fn not_started(adapter: &Adapter) -> Self {
        Self {
            adapter_address: adapter.address().to_string(),
            started: false,
            interrupted: false,
            devices: Vec::new(),
        }
    }
}

/// One run of the start/wait/stop/enumerate protocol
#[derive(Debug)]
pub struct DiscoverySession<'a> {
    connection: &'a BusConnection,
    devices: &'a DeviceIndex,
    root: &'a BusPath,
    interrupt: &'a Notify,
}

impl<'a> DiscoverySession<'a> {
    /// Create a session recording into `devices`
    ///
    /// `interrupt` may be notified from elsewhere to shorten the wait.
    pub fn new(
        connection: &'a BusConnection,
        devices: &'a DeviceIndex,
        root: &'a BusPath,
        interrupt: &'a Notify,
    ) -> Self {
        Self {
            connection,
            devices,
            root,
            interrupt,
        }
    }

    /// Bus path of a device node found under `adapter`
    pub fn device_path(&self, adapter: &Adapter, node: &str) -> BusPath {
        self.root.join(adapter.name()).join(node)
    }

    /// Discover devices on `adapter` for `timeout`.
    ///
    /// If the radio refuses to start discovery the session ends there and
    /// reports no devices. Once started, discovery is always stopped, even
    /// when the wait was interrupted or this future is dropped mid-wait.
    /// Device nodes that do not implement the
    /// device capability, or vanish before their properties can be read, are
    /// left out. Results accumulate: devices are appended to whatever is
    /// already recorded for the adapter, but only once enumeration has
    /// completed. A transport failure while enumerating records nothing.
    pub async fn run(&self, adapter: &Arc<Adapter>, timeout: Duration) -> Result<DiscoveryReport> {
        let span = adapter_span(adapter.name(), Some(adapter.address()));
        self.run_inner(adapter, timeout).instrument(span).await
    }

    async fn run_inner(&self, adapter: &Arc<Adapter>, timeout: Duration) -> Result<DiscoveryReport> {
        if !adapter.start_discovery().await {
            return Ok(DiscoveryReport::not_started(adapter));
        }

        let guard = adapter.discovery_guard();
        let outcome = interruptible_wait(timeout, self.interrupt).await;
        adapter.stop_discovery().await;
        guard.disarm();

        let mut found = Vec::new();
        for node in self.connection.list_children(adapter.path()).await? {
            let path = self.device_path(adapter, &node);
            let Some(proxy) = self.connection.device_proxy(&path).await? else {
                debug!("Skipping {}: not a device", path);
                continue;
            };
            let device = match Device::from_proxy(
                proxy,
                adapter.clone(),
                path.clone(),
                self.connection.clone(),
            )
            .await
            {
                Ok(device) => Arc::new(device),
                Err(e) => {
                    warn!("Skipping {}: {}", path, e);
                    continue;
                }
            };
            found.push(device);
        }

        for device in &found {
            self.devices.append(adapter.address(), device.clone());
        }

        info!(
            "Discovery on {} found {} devices{}",
            adapter.name(),
            found.len(),
            if outcome.is_interrupted() { " (interrupted)" } else { "" }
        );

        Ok(DiscoveryReport {
            adapter_address: adapter.address().to_string(),
            started: true,
            interrupted: outcome.is_interrupted(),
            devices: found,
        })
    }
}
