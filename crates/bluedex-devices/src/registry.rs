/*!
 * Adapter and device indices.
 *
 * [`AdapterIndex`] is the single source of truth for which adapters exist. It
 * publishes immutable [`AdapterSnapshot`]s: a rebuild assembles a complete new
 * snapshot off to the side and swaps it in, so readers always see the
 * by-address and by-name mappings from the same scan.
 *
 * [`DeviceIndex`] records, per adapter address, the devices discovered through
 * that adapter in enumeration order. It only ever grows.
 */
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use bluedex_core::error::Result;
use bluedex_core::types::{canonical_address, BusPath};

use crate::adapter::Adapter;
use crate::connection::BusConnection;
use crate::device::Device;

/// An immutable view of the adapters reported by one scan
#[derive(Debug, Default)]
pub struct AdapterSnapshot {
    /// Adapters in the order their nodes were enumerated
    adapters: Vec<Arc<Adapter>>,
    by_address: HashMap<String, Arc<Adapter>>,
    by_name: HashMap<String, Arc<Adapter>>,
}

impl AdapterSnapshot {
    fn insert(&mut self, adapter: Arc<Adapter>) {
        self.by_address
            .insert(adapter.address().to_string(), adapter.clone());
        self.by_name.insert(adapter.name().to_string(), adapter.clone());
        self.adapters.push(adapter);
    }

    /// All adapters, in enumeration order
    pub fn adapters(&self) -> &[Arc<Adapter>] {
        &self.adapters
    }

    /// Look up an adapter by hardware address (any accepted spelling)
    ///
    /// When two adapters report the same address, the one enumerated later
    /// holds the address slot.
    pub fn by_address(&self, address: &str) -> Option<&Arc<Adapter>> {
        self.by_address.get(&canonical_address(address))
    }

    /// Look up an adapter by interface name
    pub fn by_name(&self, name: &str) -> Option<&Arc<Adapter>> {
        self.by_name.get(name)
    }

    /// Look up by address first, then by name
    pub fn lookup(&self, ident: &str) -> Option<&Arc<Adapter>> {
        self.by_address(ident).or_else(|| self.by_name(ident))
    }

    /// Addresses present in the by-address mapping
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.by_address.keys().map(String::as_str)
    }

    /// Names present in the by-name mapping
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Number of adapters
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the scan found no adapters
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Index of local adapters, together with the default-adapter slot
#[derive(Debug)]
pub struct AdapterIndex {
    root: BusPath,
    snapshot: RwLock<Arc<AdapterSnapshot>>,
    default_address: RwLock<Option<String>>,
}

impl AdapterIndex {
    /// Create an empty index for adapters under `root`
    pub fn new(root: BusPath) -> Self {
        Self {
            root,
            snapshot: RwLock::new(Arc::new(AdapterSnapshot::default())),
            default_address: RwLock::new(None),
        }
    }

    /// Namespace root the adapters live under
    pub fn root(&self) -> &BusPath {
        &self.root
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<AdapterSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the published snapshot holds no adapters
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Look up by address first, then by name, in the published snapshot
    pub fn lookup(&self, ident: &str) -> Option<Arc<Adapter>> {
        self.snapshot().lookup(ident).cloned()
    }

    /// The default adapter's address, if one has been chosen
    pub fn default_address(&self) -> Option<String> {
        self.default_address
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_default_address(&self, address: String) {
        *self
            .default_address
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(address);
    }

    /// Scan the bus for adapters and publish the result.
    ///
    /// Children of the namespace root that do not implement the adapter
    /// capability are excluded from the snapshot; that is not an error. When
    /// no default adapter has been chosen yet, the first adapter found
    /// becomes the default.
    pub async fn rebuild(&self, connection: &BusConnection) -> Result<Vec<Arc<Adapter>>> {
        let mut snapshot = AdapterSnapshot::default();

        for child in connection.list_children(&self.root).await? {
            let path = self.root.join(&child);
            let Some(proxy) = connection.adapter_proxy(&path).await? else {
                debug!("Skipping {}: not an adapter", path);
                continue;
            };
            let adapter = Adapter::from_proxy(proxy, path, connection.clone()).await?;
            debug!("Found adapter {}", adapter);
            snapshot.insert(Arc::new(adapter));
        }

        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();

        if let Some(first) = snapshot.adapters().first() {
            let mut default = self
                .default_address
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if default.is_none() {
                info!("Using {} as default adapter", first);
                *default = Some(first.address().to_string());
            }
        }

        info!("Adapter scan found {} adapters", snapshot.len());
        Ok(snapshot.adapters().to_vec())
    }
}

/// Devices discovered per adapter address
#[derive(Debug, Default)]
pub struct DeviceIndex {
    devices: RwLock<HashMap<String, Vec<Arc<Device>>>>,
}

impl DeviceIndex {
    /// Create an empty device index
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices recorded for the adapter with `address`, empty if none
    pub fn devices_for(&self, address: &str) -> Vec<Arc<Device>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&canonical_address(address))
            .cloned()
            .unwrap_or_default()
    }

    /// Record `device` under the adapter with `address`
    pub fn append(&self, address: &str, device: Arc<Device>) {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(canonical_address(address))
            .or_default()
            .push(device);
    }

    /// Adapter addresses with at least one recorded device
    pub fn addresses(&self) -> Vec<String> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Total number of recorded devices
    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Whether nothing has been recorded for any adapter
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBus;
    use std::sync::Arc;

    fn connection(bus: &MemoryBus) -> BusConnection {
        BusConnection::new(Arc::new(bus.clone()))
    }

    #[tokio::test]
    async fn test_rebuild_indexes_by_address_and_name() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");
        bus.add_adapter("hci1", "66:77:88:99:AA:BB");

        let index = AdapterIndex::new(BusPath::new("/org/bluez"));
        let adapters = index.rebuild(&connection(&bus)).await.unwrap();

        assert_eq!(adapters.len(), 2);
        let snapshot = index.snapshot();
        let by_address = snapshot.by_address("00:11:22:33:44:55").unwrap();
        let by_name = snapshot.by_name("hci0").unwrap();
        assert!(Arc::ptr_eq(by_address, by_name));
        assert_eq!(by_name.path().as_str(), "/org/bluez/hci0");
    }

    #[tokio::test]
    async fn test_rebuild_skips_nodes_without_adapter_capability() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");
        bus.add_plain_node("/org/bluez/agent");

        let index = AdapterIndex::new(BusPath::new("/org/bluez"));
        let adapters = index.rebuild(&connection(&bus)).await.unwrap();

        assert_eq!(adapters.len(), 1);
        assert!(index.lookup("agent").is_none());
    }

    #[tokio::test]
    async fn test_rebuild_sets_first_adapter_as_default() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci1", "66:77:88:99:AA:BB");
        bus.add_adapter("hci0", "00:11:22:33:44:55");

        let index = AdapterIndex::new(BusPath::new("/org/bluez"));
        index.rebuild(&connection(&bus)).await.unwrap();

        // children are enumerated in name order
        assert_eq!(index.default_address().as_deref(), Some("00:11:22:33:44:55"));
    }

    #[tokio::test]
    async fn test_rebuild_replaces_adapter_objects() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");

        let index = AdapterIndex::new(BusPath::new("/org/bluez"));
        let conn = connection(&bus);
        let first = index.rebuild(&conn).await.unwrap();
        let second = index.rebuild(&conn).await.unwrap();

        assert!(!Arc::ptr_eq(&first[0], &second[0]));
        assert!(Arc::ptr_eq(&index.lookup("hci0").unwrap(), &second[0]));
    }

    #[tokio::test]
    async fn test_duplicate_address_keeps_later_adapter() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");
        bus.add_adapter("hci1", "00:11:22:33:44:55");

        let index = AdapterIndex::new(BusPath::new("/org/bluez"));
        let adapters = index.rebuild(&connection(&bus)).await.unwrap();
        let snapshot = index.snapshot();

        assert_eq!(adapters.len(), 2);
        assert_eq!(snapshot.names().count(), 2);
        assert_eq!(snapshot.addresses().count(), 1);

        let by_address = snapshot.by_address("00:11:22:33:44:55").unwrap();
        assert_eq!(by_address.name(), "hci1");
        assert!(Arc::ptr_eq(by_address, snapshot.by_name("hci1").unwrap()));

        // the earlier adapter stays reachable by name only
        let shadowed = snapshot.by_name("hci0").unwrap();
        assert!(!Arc::ptr_eq(shadowed, by_address));
        assert!(Arc::ptr_eq(shadowed, &adapters[0]));
        assert_eq!(index.lookup("hci0").unwrap().name(), "hci0");
        assert_eq!(index.default_address().as_deref(), Some("00:11:22:33:44:55"));
    }

    #[tokio::test]
    async fn test_lookup_accepts_lowercase_address() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:1A:7D:DA:71:13");

        let index = AdapterIndex::new(BusPath::new("/org/bluez"));
        index.rebuild(&connection(&bus)).await.unwrap();

        assert!(index.lookup("00:1a:7d:da:71:13").is_some());
    }

    #[tokio::test]
    async fn test_rebuild_propagates_transport_failure() {
        let bus = MemoryBus::new();
        bus.add_adapter("hci0", "00:11:22:33:44:55");
        let conn = connection(&bus);
        bus.fail_listings(true);

        let index = AdapterIndex::new(BusPath::new("/org/bluez"));
        let err = index.rebuild(&conn).await.unwrap_err();
        assert!(matches!(err, bluedex_core::error::Error::Transport(_)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_device_index_empty_lookup() {
        let index = DeviceIndex::new();
        assert!(index.devices_for("00:11:22:33:44:55").is_empty());
        assert!(index.is_empty());
        assert!(index.addresses().is_empty());
    }
}
