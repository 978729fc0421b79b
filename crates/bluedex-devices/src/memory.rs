/*!
 * In-process bus gateway.
 *
 * [`MemoryBus`] implements [`BusGateway`] and [`BusConnector`] over a
 * scriptable object tree shaped like BlueZ's: adapters under the namespace
 * root, devices under their adapter. It lets the manager run without a
 * system bus, and records enough call counts for tests to assert on the
 * manager's protocol.
 *
 * Devices queued with [`MemoryBus::queue_discovery`] only appear once
 * discovery is started on their adapter, the way a radio only learns about
 * peripherals while it is scanning.
 */
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use bluedex_core::config::DEFAULT_NAMESPACE_ROOT;
use bluedex_core::error::{Error, Result};
use bluedex_core::types::{BusPath, Properties, Value};

use crate::bus::{
    AdapterProxy, BusAddress, BusConnector, BusGateway, DeviceProxy, PropertiesChanged,
    PropertyHandler,
};

const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";

#[derive(Debug)]
struct MemoryAdapter {
    address: String,
    powered: bool,
    discovering: bool,
    start_calls: usize,
    stop_calls: usize,
    /// Number of root listings that must complete before this adapter shows up
    hidden_for: usize,
    pending: Vec<(String, Properties)>,
}

struct MemoryState {
    root: BusPath,
    adapters: BTreeMap<String, MemoryAdapter>,
    devices: BTreeMap<BusPath, Properties>,
    plain_nodes: BTreeSet<BusPath>,
    failing_devices: BTreeSet<BusPath>,
    root_listings: usize,
    fail_listings: bool,
    fail_disconnect: bool,
    connected: bool,
    refuse_connections: bool,
    disconnect_calls: usize,
    last_address: Option<BusAddress>,
    handlers: Vec<Arc<dyn PropertyHandler>>,
}

impl MemoryState {
    fn ensure_connected(&self) -> Result<()> {
        if !self.connected {
            return Err(Error::transport("org.freedesktop.DBus.Error.Disconnected"));
        }
        Ok(())
    }

    fn visible_adapter(&self, name: &str) -> Option<&MemoryAdapter> {
        self.adapters
            .get(name)
            .filter(|a| self.root_listings >= a.hidden_for)
    }

    fn adapter_mut(&mut self, name: &str) -> Result<&mut MemoryAdapter> {
        self.adapters
            .get_mut(name)
            .ok_or_else(|| Error::transport("org.freedesktop.DBus.Error.UnknownObject"))
    }

    fn adapter_path(&self, name: &str) -> BusPath {
        self.root.join(name)
    }

    fn all_paths(&self) -> Vec<BusPath> {
        let mut paths: Vec<BusPath> = self
            .adapters
            .keys()
            .filter(|name| self.visible_adapter(name).is_some())
            .map(|name| self.adapter_path(name))
            .collect();
        paths.extend(self.devices.keys().cloned());
        paths.extend(self.plain_nodes.iter().cloned());
        paths
    }
}

fn parent_of(path: &BusPath) -> BusPath {
    match path.as_str().rsplit_once('/') {
        Some((parent, _)) => BusPath::new(parent),
        None => BusPath::new("/"),
    }
}

fn adapter_event(path: BusPath, discovering: bool) -> PropertiesChanged {
    let mut changed = Properties::new();
    changed.insert("Discovering".to_string(), Value::Bool(discovering));
    PropertiesChanged {
        path,
        interface: ADAPTER_INTERFACE.to_string(),
        changed,
        invalidated: Vec::new(),
    }
}

/// A scriptable in-memory bus
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBus {
    /// Create an empty bus rooted at `/org/bluez`
    pub fn new() -> Self {
        Self::with_root(BusPath::new(DEFAULT_NAMESPACE_ROOT))
    }

    /// Create an empty bus rooted at `root`
    pub fn with_root(root: BusPath) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                root,
                adapters: BTreeMap::new(),
                devices: BTreeMap::new(),
                plain_nodes: BTreeSet::new(),
                failing_devices: BTreeSet::new(),
                root_listings: 0,
                fail_listings: false,
                fail_disconnect: false,
                connected: true,
                refuse_connections: false,
                disconnect_calls: 0,
                last_address: None,
                handlers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a powered adapter that is visible immediately
    pub fn add_adapter(&self, name: &str, address: &str) {
        self.hotplug_adapter(name, address, 0);
    }

    /// Add an adapter that only shows up after `after_listings` listings of
    /// the namespace root have happened
    pub fn hotplug_adapter(&self, name: &str, address: &str, after_listings: usize) {
        let mut state = self.lock();
        let hidden_for = state.root_listings + after_listings;
        state.adapters.insert(
            name.to_string(),
            MemoryAdapter {
                address: address.to_string(),
                powered: true,
                discovering: false,
                start_calls: 0,
                stop_calls: 0,
                hidden_for,
                pending: Vec::new(),
            },
        );
    }

    /// Unplug an adapter together with its devices
    pub fn remove_adapter(&self, name: &str) {
        let mut state = self.lock();
        let path = state.adapter_path(name);
        state.adapters.remove(name);
        state.devices.retain(|p, _| parent_of(p) != path);
    }

    /// Power an adapter's radio on or off
    pub fn set_powered(&self, name: &str, powered: bool) {
        if let Some(adapter) = self.lock().adapters.get_mut(name) {
            adapter.powered = powered;
        }
    }

    /// Add a node that implements neither capability
    pub fn add_plain_node(&self, path: &str) {
        self.lock().plain_nodes.insert(BusPath::new(path));
    }

    /// Add a device that is already known to the adapter
    pub fn add_device(&self, adapter: &str, node: &str, properties: Properties) {
        let mut state = self.lock();
        let path = state.adapter_path(adapter).join(node);
        state.devices.insert(path, properties);
    }

    /// Queue a device that appears the next time discovery starts on `adapter`
    pub fn queue_discovery(&self, adapter: &str, node: &str, properties: Properties) {
        if let Some(adapter) = self.lock().adapters.get_mut(adapter) {
            adapter.pending.push((node.to_string(), properties));
        }
    }

    /// Forget every device under `adapter`
    pub fn clear_devices(&self, adapter: &str) {
        let mut state = self.lock();
        let path = state.adapter_path(adapter);
        state.devices.retain(|p, _| parent_of(p) != path);
    }

    /// Make every listing fail with a transport error
    pub fn fail_listings(&self, fail: bool) {
        self.lock().fail_listings = fail;
    }

    /// Make proxy lookups for one device node fail with a transport error
    pub fn fail_device_lookup(&self, adapter: &str, node: &str) {
        let mut state = self.lock();
        let path = state.adapter_path(adapter).join(node);
        state.failing_devices.insert(path);
    }

    /// Make [`BusGateway::disconnect`] fail with a transport error
    pub fn fail_disconnect(&self, fail: bool) {
        self.lock().fail_disconnect = fail;
    }

    /// Make [`BusConnector::connect`] fail with a transport error
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Number of times the namespace root has been listed
    pub fn root_listings(&self) -> usize {
        self.lock().root_listings
    }

    /// Number of start-discovery calls made on `adapter`
    pub fn start_calls(&self, adapter: &str) -> usize {
        self.lock().adapters.get(adapter).map_or(0, |a| a.start_calls)
    }

    /// Number of stop-discovery calls made on `adapter`
    pub fn stop_calls(&self, adapter: &str) -> usize {
        self.lock().adapters.get(adapter).map_or(0, |a| a.stop_calls)
    }

    /// Whether `adapter` is currently discovering
    pub fn is_discovering(&self, adapter: &str) -> bool {
        self.lock().adapters.get(adapter).map_or(false, |a| a.discovering)
    }

    /// Number of disconnect calls received
    pub fn disconnect_calls(&self) -> usize {
        self.lock().disconnect_calls
    }

    /// Whether the bus is connected
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// The address of the most recent successful connect
    pub fn last_address(&self) -> Option<BusAddress> {
        self.lock().last_address.clone()
    }

    /// Deliver a property-change notification to every registered handler
    pub fn emit_properties_changed(&self, event: &PropertiesChanged) {
        let handlers = self.lock().handlers.clone();
        for handler in handlers {
            handler.on_properties_changed(event);
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryBus")
            .field("root", &state.root)
            .field("adapters", &state.adapters.len())
            .field("devices", &state.devices.len())
            .field("connected", &state.connected)
            .finish()
    }
}

#[async_trait]
impl BusGateway for MemoryBus {
    async fn list_children(&self, path: &BusPath) -> Result<BTreeSet<String>> {
        let mut state = self.lock();
        state.ensure_connected()?;
        if state.fail_listings {
            return Err(Error::transport("org.freedesktop.DBus.Error.NoReply"));
        }
        let children = state
            .all_paths()
            .into_iter()
            .filter(|p| parent_of(p) == *path)
            .map(|p| p.last_segment().to_string())
            .collect();
        if *path == state.root {
            state.root_listings += 1;
        }
        Ok(children)
    }

    async fn adapter_proxy(&self, path: &BusPath) -> Result<Option<Arc<dyn AdapterProxy>>> {
        let state = self.lock();
        state.ensure_connected()?;
        if parent_of(path) != state.root {
            return Ok(None);
        }
        let name = path.last_segment();
        Ok(state.visible_adapter(name).map(|_| {
            Arc::new(MemoryAdapterProxy {
                bus: self.clone(),
                name: name.to_string(),
            }) as Arc<dyn AdapterProxy>
        }))
    }

    async fn device_proxy(&self, path: &BusPath) -> Result<Option<Arc<dyn DeviceProxy>>> {
        let state = self.lock();
        state.ensure_connected()?;
        if state.failing_devices.contains(path) {
            return Err(Error::transport("org.freedesktop.DBus.Error.NoReply"));
        }
        Ok(state.devices.contains_key(path).then(|| {
            Arc::new(MemoryDeviceProxy {
                bus: self.clone(),
                path: path.clone(),
            }) as Arc<dyn DeviceProxy>
        }))
    }

    async fn add_property_handler(&self, handler: Arc<dyn PropertyHandler>) -> Result<()> {
        let mut state = self.lock();
        state.ensure_connected()?;
        state.handlers.push(handler);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.lock();
        state.disconnect_calls += 1;
        if state.fail_disconnect {
            return Err(Error::transport("org.freedesktop.DBus.Error.NoReply"));
        }
        state.connected = false;
        Ok(())
    }
}

#[async_trait]
impl BusConnector for MemoryBus {
    async fn connect(&self, address: &BusAddress) -> Result<Arc<dyn BusGateway>> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(Error::transport(format!(
                "Failed to connect to bus {}: connection refused",
                address
            )));
        }
        state.connected = true;
        state.last_address = Some(address.clone());
        Ok(Arc::new(self.clone()))
    }
}

#[derive(Debug)]
struct MemoryAdapterProxy {
    bus: MemoryBus,
    name: String,
}

#[async_trait]
impl AdapterProxy for MemoryAdapterProxy {
    async fn address(&self) -> Result<String> {
        let mut state = self.bus.lock();
        state.ensure_connected()?;
        Ok(state.adapter_mut(&self.name)?.address.clone())
    }

    async fn start_discovery(&self) -> Result<()> {
        let event = {
            let mut state = self.bus.lock();
            state.ensure_connected()?;
            let path = state.adapter_path(&self.name);
            let adapter = state.adapter_mut(&self.name)?;
            adapter.start_calls += 1;
            if !adapter.powered {
                return Err(Error::transport("org.bluez.Error.NotReady: Resource Not Ready"));
            }
            if adapter.discovering {
                return Err(Error::transport("org.bluez.Error.InProgress: Operation already in progress"));
            }
            adapter.discovering = true;
            let pending = std::mem::take(&mut adapter.pending);
            for (node, properties) in pending {
                state.devices.insert(path.join(node), properties);
            }
            adapter_event(path, true)
        };
        self.bus.emit_properties_changed(&event);
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        let event = {
            let mut state = self.bus.lock();
            state.ensure_connected()?;
            let path = state.adapter_path(&self.name);
            let adapter = state.adapter_mut(&self.name)?;
            adapter.stop_calls += 1;
            if !adapter.discovering {
                return Err(Error::transport("org.bluez.Error.Failed: No discovery started"));
            }
            adapter.discovering = false;
            adapter_event(path, false)
        };
        self.bus.emit_properties_changed(&event);
        Ok(())
    }

    async fn properties(&self) -> Result<Properties> {
        let mut state = self.bus.lock();
        state.ensure_connected()?;
        let adapter = state.adapter_mut(&self.name)?;
        let mut properties = Properties::new();
        properties.insert("Address".to_string(), Value::from(adapter.address.as_str()));
        properties.insert("Powered".to_string(), Value::Bool(adapter.powered));
        properties.insert("Discovering".to_string(), Value::Bool(adapter.discovering));
        properties.insert("Name".to_string(), Value::from(self.name.as_str()));
        Ok(properties)
    }
}

#[derive(Debug)]
struct MemoryDeviceProxy {
    bus: MemoryBus,
    path: BusPath,
}

#[async_trait]
impl DeviceProxy for MemoryDeviceProxy {
    async fn properties(&self) -> Result<Properties> {
        let state = self.bus.lock();
        state.ensure_connected()?;
        state
            .devices
            .get(&self.path)
            .cloned()
            .ok_or_else(|| Error::transport("org.freedesktop.DBus.Error.UnknownObject"))
    }
}
