//! End-to-end behaviour of the device manager against the in-memory bus.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bluedex_core::types::{Properties, Value};
use bluedex_devices::{
    DeviceManager, ManagerError, ManagerOptions, MemoryBus, PropertiesChanged,
    SharedDeviceManager,
};

fn device(address: &str, name: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert("Address".to_string(), Value::from(address));
    properties.insert("Name".to_string(), Value::from(name));
    properties
}

fn manager(bus: &MemoryBus) -> DeviceManager {
    DeviceManager::new(Arc::new(bus.clone()), ManagerOptions::default())
}

fn fast_manager(bus: &MemoryBus) -> DeviceManager {
    let options = ManagerOptions {
        default_timeout: Duration::from_millis(5),
        ..ManagerOptions::default()
    };
    DeviceManager::new(Arc::new(bus.clone()), options)
}

#[test_log::test(tokio::test)]
async fn empty_bus_yields_empty_results_without_default() {
    let bus = MemoryBus::new();
    let manager = manager(&bus);

    assert!(manager.scan_for_adapters().await.unwrap().is_empty());
    assert!(manager.get_adapters().await.unwrap().is_empty());
    assert!(manager.default_adapter().is_none());
}

#[tokio::test]
async fn adapter_index_mappings_stay_consistent() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    bus.add_adapter("hci1", "66:77:88:99:AA:BB");
    bus.add_plain_node("/org/bluez/agent");
    let manager = manager(&bus);

    manager.scan_for_adapters().await.unwrap();
    let snapshot = manager.adapter_index().snapshot();

    assert_eq!(snapshot.addresses().count(), 2);
    assert_eq!(snapshot.names().count(), 2);
    for address in snapshot.addresses() {
        let adapter = snapshot.by_address(address).unwrap();
        let named = snapshot.by_name(adapter.name()).unwrap();
        assert!(Arc::ptr_eq(adapter, named));
    }
    for name in snapshot.names() {
        let adapter = snapshot.by_name(name).unwrap();
        let addressed = snapshot.by_address(adapter.address()).unwrap();
        assert!(Arc::ptr_eq(adapter, addressed));
    }
}

#[tokio::test]
async fn default_adapter_survives_rescans() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    let manager = manager(&bus);

    manager.scan_for_adapters().await.unwrap();
    assert_eq!(manager.default_adapter().as_deref(), Some("00:11:22:33:44:55"));

    bus.remove_adapter("hci0");
    bus.add_adapter("hci1", "66:77:88:99:AA:BB");
    let adapters = manager.scan_for_adapters().await.unwrap();

    assert_eq!(adapters.len(), 1);
    assert_eq!(adapters[0].name(), "hci1");
    assert_eq!(manager.default_adapter().as_deref(), Some("00:11:22:33:44:55"));
}

#[tokio::test]
async fn hotplugged_adapter_is_found_by_fallback_rescan() {
    let bus = MemoryBus::new();
    bus.hotplug_adapter("hci0", "AA:BB:CC:DD:EE:FF", 1);
    bus.queue_discovery("hci0", "dev_11_22_33_44_55_66", device("11:22:33:44:55:66", "Speaker"));
    let manager = manager(&bus);

    assert!(manager.scan_for_adapters().await.unwrap().is_empty());

    let devices = manager
        .scan_for_devices(Some("AA:BB:CC:DD:EE:FF"), Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].adapter_address(), "AA:BB:CC:DD:EE:FF");
    assert_eq!(bus.root_listings(), 2);
}

#[tokio::test]
async fn unknown_adapter_costs_one_rescan() {
    let bus = MemoryBus::new();
    let manager = manager(&bus);

    let devices = manager
        .scan_for_devices(Some("anything"), Duration::ZERO)
        .await
        .unwrap();

    assert!(devices.is_empty());
    assert_eq!(bus.root_listings(), 1);
}

#[tokio::test]
async fn discovery_results_accumulate_per_adapter() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    let manager = manager(&bus);

    for i in 0..4 {
        bus.queue_discovery("hci0", &format!("dev_N{}", i), device(&format!("AA:AA:AA:AA:AA:0{}", i), "n"));
    }
    let first = manager.scan_for_devices(Some("hci0"), Duration::ZERO).await.unwrap();

    bus.clear_devices("hci0");
    for i in 0..3 {
        bus.queue_discovery("hci0", &format!("dev_M{}", i), device(&format!("BB:BB:BB:BB:BB:0{}", i), "m"));
    }
    let second = manager.scan_for_devices(Some("hci0"), Duration::ZERO).await.unwrap();

    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 3);
    assert_eq!(manager.get_devices(Some("00:11:22:33:44:55")).await.unwrap().len(), 7);
    assert_eq!(manager.get_devices(Some("hci0")).await.unwrap().len(), 7);
}

#[tokio::test]
async fn device_paths_follow_adapter_name() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    bus.queue_discovery("hci0", "dev_AA_BB", device("AA:BB:00:00:00:00", "Tag"));
    let manager = manager(&bus);

    let devices = manager.scan_for_devices(None, Duration::ZERO).await.unwrap();

    assert_eq!(devices[0].path().as_str(), "/org/bluez/hci0/dev_AA_BB");
}

#[tokio::test]
async fn zero_timeout_still_runs_full_protocol() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    bus.add_device("hci0", "dev_01", device("AA:BB:CC:DD:EE:01", "Watch"));
    let manager = manager(&bus);

    let report = manager.discover(None, Duration::ZERO).await.unwrap().unwrap();

    assert!(report.started);
    assert_eq!(report.devices.len(), 1);
    assert_eq!(bus.start_calls("hci0"), 1);
    assert_eq!(bus.stop_calls("hci0"), 1);
    assert!(!bus.is_discovering("hci0"));
}

#[tokio::test]
async fn scan_returns_devices_of_the_scanned_adapter() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    bus.add_adapter("hci1", "66:77:88:99:AA:BB");
    bus.queue_discovery("hci0", "dev_01", device("AA:BB:CC:DD:EE:01", "on hci0"));
    bus.queue_discovery("hci1", "dev_02", device("AA:BB:CC:DD:EE:02", "on hci1"));
    let manager = manager(&bus);

    manager.scan_for_devices(Some("hci0"), Duration::ZERO).await.unwrap();
    let devices = manager.scan_for_devices(Some("hci1"), Duration::ZERO).await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name(), Some("on hci1"));
}

#[tokio::test]
async fn refused_discovery_returns_nothing() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    bus.add_device("hci0", "dev_01", device("AA:BB:CC:DD:EE:01", "Watch"));
    bus.set_powered("hci0", false);
    let manager = manager(&bus);

    let devices = manager.scan_for_devices(None, Duration::ZERO).await.unwrap();

    assert!(devices.is_empty());
    assert!(manager.device_index().is_empty());
}

#[tokio::test]
async fn get_devices_scans_once_when_nothing_is_recorded() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    bus.queue_discovery("hci0", "dev_01", device("AA:BB:CC:DD:EE:01", "Watch"));
    let manager = fast_manager(&bus);

    let devices = manager.get_default_devices().await.unwrap();
    assert_eq!(devices.len(), 1);

    let again = manager.get_devices(None).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(bus.start_calls("hci0"), 1);
}

#[tokio::test]
async fn get_devices_for_unknown_adapter_is_empty() {
    let bus = MemoryBus::new();
    let manager = fast_manager(&bus);

    assert!(manager.get_devices(Some("00:00:00:00:00:00")).await.unwrap().is_empty());
    assert!(manager.get_devices(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_device_entries_outlive_their_adapter() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    bus.queue_discovery("hci0", "dev_01", device("AA:BB:CC:DD:EE:01", "Watch"));
    let manager = manager(&bus);
    manager.scan_for_devices(None, Duration::ZERO).await.unwrap();

    bus.remove_adapter("hci0");
    assert!(manager.scan_for_adapters().await.unwrap().is_empty());

    let devices = manager.get_devices(Some("00:11:22:33:44:55")).await.unwrap();
    assert_eq!(devices.len(), 1);
}

#[tokio::test]
async fn set_default_adapter_requires_known_address() {
    let bus = MemoryBus::new();
    let manager = manager(&bus);

    let err = manager.set_default_adapter("00:11:22:33:44:55").await.unwrap_err();
    assert!(matches!(err, ManagerError::AdapterNotFound(_)));
    assert!(manager.default_adapter().is_none());
}

#[tokio::test]
async fn interrupt_shortens_discovery() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    bus.queue_discovery("hci0", "dev_01", device("AA:BB:CC:DD:EE:01", "Watch"));
    let shared = SharedDeviceManager::new(manager(&bus));

    let interrupter = shared.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        interrupter.manager().interrupt_discovery();
    });

    let started = Instant::now();
    let report = shared
        .manager()
        .discover(Some("hci0"), Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(report.interrupted);
    assert_eq!(report.devices.len(), 1);
    assert_eq!(bus.stop_calls("hci0"), 1);
}

#[tokio::test]
async fn cancelled_scan_releases_the_radio() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    let manager = manager(&bus);

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        manager.scan_for_devices(None, Duration::from_secs(10)),
    )
    .await;
    assert!(cancelled.is_err());

    for _ in 0..100 {
        if bus.stop_calls("hci0") > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(bus.stop_calls("hci0"), 1);
    assert!(!bus.is_discovering("hci0"));

    bus.queue_discovery("hci0", "dev_01", device("AA:BB:CC:DD:EE:01", "Watch"));
    let devices = manager.scan_for_devices(None, Duration::ZERO).await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(bus.start_calls("hci0"), 2);
}

#[tokio::test]
async fn property_handlers_receive_notifications() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    let manager = manager(&bus);

    let seen: Arc<Mutex<Vec<PropertiesChanged>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager
        .register_property_handler(Arc::new(move |event: &PropertiesChanged| {
            sink.lock().unwrap().push(event.clone());
        }))
        .await
        .unwrap();

    manager.scan_for_devices(None, Duration::ZERO).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].path.as_str(), "/org/bluez/hci0");
    assert_eq!(seen[0].changed["Discovering"], Value::Bool(true));
    assert_eq!(seen[1].changed["Discovering"], Value::Bool(false));
}

#[tokio::test]
async fn device_info_serializes() {
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:11:22:33:44:55");
    let mut properties = device("aa:bb:cc:dd:ee:01", "Watch");
    properties.insert("RSSI".to_string(), Value::from(-71i16));
    properties.insert("Paired".to_string(), Value::Bool(true));
    bus.queue_discovery("hci0", "dev_01", properties);
    let manager = manager(&bus);

    let devices = manager.scan_for_devices(None, Duration::ZERO).await.unwrap();
    let info = devices[0].info();
    let json = serde_json::to_value(&info).unwrap();

    assert_eq!(json["address"], "AA:BB:CC:DD:EE:01");
    assert_eq!(json["rssi"], -71);
    assert_eq!(json["paired"], true);
    assert_eq!(json["adapter_address"], "00:11:22:33:44:55");
}
