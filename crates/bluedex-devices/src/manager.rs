/*!
 * The device manager facade.
 *
 * [`DeviceManager`] owns the bus connection, the adapter and device indices
 * and the default-adapter choice, and exposes the public operations. It is an
 * ordinary value: construct one and pass it (or a [`SharedDeviceManager`])
 * to whoever needs it.
 */
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, Instrument};

use bluedex_core::config::{Config, DiscoveryConfig};
use bluedex_core::error::Error as CoreError;
use bluedex_core::logging::operation_span;
use bluedex_core::types::{canonical_address, is_hardware_address, BusPath};

use crate::adapter::Adapter;
use crate::bus::{BusAddress, BusConnector, BusGateway, PropertyHandler};
use crate::connection::BusConnection;
use crate::device::Device;
use crate::discovery::{DiscoveryReport, DiscoverySession};
use crate::error::{ManagerError, Result};
use crate::registry::{AdapterIndex, DeviceIndex};
use crate::resolver::AdapterResolver;

/// Manager settings
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Namespace root the adapters live under
    pub root: BusPath,
    /// Discovery duration for cached lookups that must scan first
    pub default_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for ManagerOptions {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            root: config.root(),
            default_timeout: config.default_timeout(),
        }
    }
}

/// Entry point to adapters and devices on the bus
#[derive(Debug)]
pub struct DeviceManager {
    connection: BusConnection,
    adapters: AdapterIndex,
    devices: DeviceIndex,
    options: ManagerOptions,
    interrupt: Notify,
}

impl DeviceManager {
    /// Create a manager over an established gateway
    pub fn new(gateway: Arc<dyn BusGateway>, options: ManagerOptions) -> Self {
        Self {
            connection: BusConnection::new(gateway),
            adapters: AdapterIndex::new(options.root.clone()),
            devices: DeviceIndex::new(),
            options,
            interrupt: Notify::new(),
        }
    }

    /// Connect to the bus named in `config` and create a manager over it
    pub async fn connect(connector: &dyn BusConnector, config: &Config) -> Result<Self> {
        let address: BusAddress = config
            .bus
            .address
            .parse()
            .map_err(|e: CoreError| ManagerError::invalid_argument(e.to_string()))?;
        info!("Connecting to {} bus", address);
        let gateway = connector.connect(&address).await?;
        Ok(Self::new(gateway, ManagerOptions::from(&config.discovery)))
    }

    /// The manager's settings
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// The shared bus connection
    pub fn connection(&self) -> &BusConnection {
        &self.connection
    }

    /// The adapter index
    pub fn adapter_index(&self) -> &AdapterIndex {
        &self.adapters
    }

    /// The device index
    pub fn device_index(&self) -> &DeviceIndex {
        &self.devices
    }

    fn resolver(&self) -> AdapterResolver<'_> {
        AdapterResolver::new(&self.adapters, &self.connection)
    }

    fn session(&self) -> DiscoverySession<'_> {
        DiscoverySession::new(
            &self.connection,
            &self.devices,
            self.adapters.root(),
            &self.interrupt,
        )
    }

    /// Search the bus for adapters.
    ///
    /// Replaces the cached adapters. The first adapter found becomes the
    /// default if none has been chosen yet.
    pub async fn scan_for_adapters(&self) -> Result<Vec<Arc<Adapter>>> {
        let span = operation_span("scan_for_adapters", "manager");
        Ok(self
            .adapters
            .rebuild(&self.connection)
            .instrument(span)
            .await?)
    }

    /// Discover devices on the adapter named by `ident` (address or interface
    /// name), or on the default adapter when `ident` is `None`.
    ///
    /// Returns the devices recorded by this run. An adapter that cannot be
    /// resolved, or that refuses to start discovery, yields an empty list.
    pub async fn scan_for_devices(
        &self,
        ident: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<Arc<Device>>> {
        Ok(self.discover(ident, timeout).await?.map_or_else(Vec::new, |r| r.devices))
    }

    /// Discover devices on the default adapter
    pub async fn scan_for_devices_on_default(&self, timeout: Duration) -> Result<Vec<Arc<Device>>> {
        self.scan_for_devices(None, timeout).await
    }

    /// Run a discovery session and return its full report, or `None` if no
    /// adapter matches `ident`
    pub async fn discover(
        &self,
        ident: Option<&str>,
        timeout: Duration,
    ) -> Result<Option<DiscoveryReport>> {
        let span = operation_span("scan_for_devices", "manager");
        self.discover_inner(ident, timeout).instrument(span).await
    }

    async fn discover_inner(
        &self,
        ident: Option<&str>,
        timeout: Duration,
    ) -> Result<Option<DiscoveryReport>> {
        let Some(adapter) = self.resolver().resolve(ident).await? else {
            debug!("No adapter matches {:?}, nothing to scan", ident);
            return Ok(None);
        };
        Ok(Some(self.session().run(&adapter, timeout).await?))
    }

    /// Cut any in-progress discovery wait short.
    ///
    /// The interrupted session still stops discovery and records what it
    /// found so far.
    pub fn interrupt_discovery(&self) {
        self.interrupt.notify_waiters();
    }

    /// Cached adapters, scanning first if none are cached
    pub async fn get_adapters(&self) -> Result<Vec<Arc<Adapter>>> {
        if self.adapters.is_empty() {
            self.scan_for_adapters().await?;
        }
        Ok(self.adapters.snapshot().adapters().to_vec())
    }

    /// Cached devices of the adapter with `address` (or interface name), or
    /// of the default adapter when `address` is `None`.
    ///
    /// If no devices have been recorded for any adapter, a discovery with the
    /// configured default timeout runs first.
    pub async fn get_devices(&self, address: Option<&str>) -> Result<Vec<Arc<Device>>> {
        if self.devices.is_empty() {
            self.scan_for_devices(address, self.options.default_timeout)
                .await?;
        }
        let address = match address {
            // an interface name of a cached adapter maps to its address
            Some(ident) => self
                .adapters
                .lookup(ident)
                .map_or_else(|| ident.to_string(), |a| a.address().to_string()),
            None => match self.adapters.default_address() {
                Some(address) => address,
                None => return Ok(Vec::new()),
            },
        };
        Ok(self.devices.devices_for(&address))
    }

    /// Devices recorded for the default adapter
    pub async fn get_default_devices(&self) -> Result<Vec<Arc<Device>>> {
        self.get_devices(None).await
    }

    /// Address of the default adapter, if one has been chosen
    pub fn default_adapter(&self) -> Option<String> {
        self.adapters.default_address()
    }

    /// Make the adapter with `address` the default.
    ///
    /// Scans for adapters first if none are cached. Fails with
    /// [`ManagerError::InvalidArgument`] if `address` is not a hardware
    /// address, and [`ManagerError::AdapterNotFound`] if no cached adapter
    /// has it.
    pub async fn set_default_adapter(&self, address: &str) -> Result<()> {
        if !is_hardware_address(address) {
            return Err(ManagerError::invalid_argument(format!(
                "{:?} is not a hardware address",
                address
            )));
        }
        if self.adapters.is_empty() {
            self.scan_for_adapters().await?;
        }
        let snapshot = self.adapters.snapshot();
        let Some(adapter) = snapshot.by_address(address) else {
            return Err(ManagerError::adapter_not_found(canonical_address(address)));
        };
        info!("Default adapter set to {}", adapter);
        self.adapters.set_default_address(adapter.address().to_string());
        Ok(())
    }

    /// Make `adapter` the default
    pub async fn set_default_adapter_to(&self, adapter: &Adapter) -> Result<()> {
        self.set_default_adapter(adapter.address()).await
    }

    /// Subscribe `handler` to remote property-change notifications
    pub async fn register_property_handler(&self, handler: Arc<dyn PropertyHandler>) -> Result<()> {
        Ok(self.connection.add_property_handler(handler).await?)
    }

    /// Disconnect from the bus.
    ///
    /// Only the first call reaches the bus; afterwards every bus operation
    /// fails with a transport error.
    pub async fn close_connection(&self) -> Result<()> {
        self.connection.close().await?;
        Ok(())
    }
}

/// A shared device manager that can be cloned
#[derive(Debug, Clone)]
pub struct SharedDeviceManager(Arc<DeviceManager>);

impl SharedDeviceManager {
    /// Share `manager`
    pub fn new(manager: DeviceManager) -> Self {
        Self(Arc::new(manager))
    }

    /// Get a reference to the device manager
    pub fn manager(&self) -> &DeviceManager {
        &self.0
    }
}

impl From<DeviceManager> for SharedDeviceManager {
    fn from(manager: DeviceManager) -> Self {
        Self::new(manager)
    }
}

impl AsRef<DeviceManager> for SharedDeviceManager {
    fn as_ref(&self) -> &DeviceManager {
        self.manager()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBus;

    fn manager(bus: &MemoryBus) -> DeviceManager {
        DeviceManager::new(Arc::new(bus.clone()), ManagerOptions::default())
    }

    #[tokio::test]
    async fn test_connect_uses_configured_address() {
        let bus = MemoryBus::new();
        let mut config = Config::default();
        config.bus.address = "session".to_string();

        let manager = DeviceManager::connect(&bus, &config).await.unwrap();

        assert_eq!(bus.last_address(), Some(BusAddress::Session));
        assert_eq!(manager.options().root.as_str(), "/org/bluez");
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_address() {
        let bus = MemoryBus::new();
        let mut config = Config::default();
        config.bus.address = String::new();

        let err = DeviceManager::connect(&bus, &config).await.unwrap_err();
        assert!(matches!(err, ManagerError::InvalidArgument(_)));
        assert!(bus.last_address().is_none());
    }

    #[tokio::test]
    async fn test_connect_propagates_transport_failure() {
        let bus = MemoryBus::new();
        bus.refuse_connections(true);

        let err = DeviceManager::connect(&bus, &Config::default()).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_set_default_adapter_scans_when_empty() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");
        bus.add_adapter("hci1", "66:77:88:99:AA:BB");
        let manager = manager(&bus);

        manager.set_default_adapter("66:77:88:99:aa:bb").await.unwrap();

        assert_eq!(manager.default_adapter().as_deref(), Some("66:77:88:99:AA:BB"));
        assert_eq!(bus.root_listings(), 1);
    }

    #[tokio::test]
    async fn test_set_default_adapter_not_found() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");
        let manager = manager(&bus);

        let err = manager.set_default_adapter("66:77:88:99:AA:BB").await.unwrap_err();
        assert!(matches!(err, ManagerError::AdapterNotFound(_)));
        assert_eq!(manager.default_adapter().as_deref(), Some("00:11:22:33:44:55"));

        // interface names are not addresses
        let err = manager.set_default_adapter("hci0").await.unwrap_err();
        assert!(matches!(err, ManagerError::InvalidArgument(_)));
        let err = manager.set_default_adapter("").await.unwrap_err();
        assert!(matches!(err, ManagerError::InvalidArgument(_)));
        assert_eq!(bus.root_listings(), 1);
    }

    #[tokio::test]
    async fn test_set_default_adapter_to_object() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");
        bus.add_adapter("hci1", "66:77:88:99:AA:BB");
        let manager = manager(&bus);

        let adapters = manager.get_adapters().await.unwrap();
        manager.set_default_adapter_to(&adapters[1]).await.unwrap();

        assert_eq!(manager.default_adapter().as_deref(), Some("66:77:88:99:AA:BB"));
    }

    #[tokio::test]
    async fn test_close_connection_once() {
        let bus = MemoryBus::new();
        let manager = manager(&bus);

        manager.close_connection().await.unwrap();
        manager.close_connection().await.unwrap();

        assert_eq!(bus.disconnect_calls(), 1);
        assert!(manager.connection().is_closed());
        assert!(manager.scan_for_adapters().await.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn test_failed_close_can_be_retried() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");
        let manager = manager(&bus);
        bus.fail_disconnect(true);

        assert!(manager.close_connection().await.unwrap_err().is_transport());
        assert!(!manager.connection().is_closed());
        assert_eq!(manager.scan_for_adapters().await.unwrap().len(), 1);

        bus.fail_disconnect(false);
        manager.close_connection().await.unwrap();
        assert_eq!(bus.disconnect_calls(), 2);
        assert!(manager.connection().is_closed());
        assert!(!bus.is_connected());
    }

    #[tokio::test]
    async fn test_shared_manager() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");
        let shared = SharedDeviceManager::new(manager(&bus));
        let clone = shared.clone();

        shared.manager().scan_for_adapters().await.unwrap();
        assert_eq!(clone.as_ref().default_adapter().as_deref(), Some("00:11:22:33:44:55"));
    }
}
