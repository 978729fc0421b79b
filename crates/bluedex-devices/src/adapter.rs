/*!
 * Local radio adapters.
 */
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use bluedex_core::error::Result;
use bluedex_core::types::{canonical_address, BusPath, Properties};

use crate::bus::AdapterProxy;
use crate::connection::BusConnection;

/// One local radio controller, e.g. `hci0`.
///
/// Adapters are built fresh by every adapter scan and never updated in place;
/// only the discovery flag changes, mirroring the start/stop calls made
/// through this object.
#[derive(Debug)]
pub struct Adapter {
    name: String,
    address: String,
    path: BusPath,
    proxy: Arc<dyn AdapterProxy>,
    connection: BusConnection,
    discovering: AtomicBool,
}

impl Adapter {
    /// Wrap an adapter proxy found at `path`, reading its hardware address
    pub async fn from_proxy(
        proxy: Arc<dyn AdapterProxy>,
        path: BusPath,
        connection: BusConnection,
    ) -> Result<Self> {
        let address = canonical_address(&proxy.address().await?);
        Ok(Self {
            name: path.last_segment().to_string(),
            address,
            path,
            proxy,
            connection,
            discovering: AtomicBool::new(false),
        })
    }

    /// Interface name, the last segment of the bus path
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hardware address in canonical form
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Bus path of this adapter
    pub fn path(&self) -> &BusPath {
        &self.path
    }

    /// The shared bus connection this adapter was found on
    pub fn connection(&self) -> &BusConnection {
        &self.connection
    }

    /// Whether discovery was started through this object and not yet stopped
    pub fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::Acquire)
    }

    /// Start discovery. Returns `false` if the radio refused.
    pub async fn start_discovery(&self) -> bool {
        match self.proxy.start_discovery().await {
            Ok(()) => {
                self.discovering.store(true, Ordering::Release);
                debug!("Discovery started on {}", self.name);
                true
            }
            Err(e) => {
                warn!("Could not start discovery on {}: {}", self.name, e);
                false
            }
        }
    }

    /// Stop discovery. Returns `false` if the radio reported an error.
    pub async fn stop_discovery(&self) -> bool {
        let stopped = match self.proxy.stop_discovery().await {
            Ok(()) => {
                debug!("Discovery stopped on {}", self.name);
                true
            }
            Err(e) => {
                warn!("Could not stop discovery on {}: {}", self.name, e);
                false
            }
        };
        self.discovering.store(false, Ordering::Release);
        stopped
    }

    /// Guard that stops discovery on this adapter if dropped while armed
    pub(crate) fn discovery_guard(self: &Arc<Self>) -> DiscoveryGuard {
        DiscoveryGuard {
            adapter: self.clone(),
            armed: true,
        }
    }

    /// Read the adapter's current remote properties
    pub async fn properties(&self) -> Result<Properties> {
        self.proxy.properties().await
    }
}

/// Releases a started discovery when the session owning it is dropped.
///
/// The session disarms it after its own stop call. If the session future is
/// dropped first (an outer timeout, a lost `select!` branch), the stop is
/// sent from a task on the current runtime instead.
#[derive(Debug)]
#[must_use]
pub(crate) struct DiscoveryGuard {
    adapter: Arc<Adapter>,
    armed: bool,
}

impl DiscoveryGuard {
    /// The session stopped discovery itself
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DiscoveryGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let adapter = &self.adapter;
        adapter.discovering.store(false, Ordering::Release);
        let Ok(handle) = Handle::try_current() else {
            warn!(
                "Discovery on {} abandoned outside a runtime, radio left discovering",
                adapter.name
            );
            return;
        };
        warn!("Discovery on {} abandoned, stopping it", adapter.name);
        let proxy = adapter.proxy.clone();
        let name = adapter.name.clone();
        handle.spawn(async move {
            if let Err(e) = proxy.stop_discovery().await {
                warn!("Could not stop discovery on {}: {}", name, e);
            }
        });
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.address)
    }
}
