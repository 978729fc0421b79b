use std::sync::Arc;
use std::time::Duration;

use bluedex_core::config::ConfigBuilder;
use bluedex_core::logging;
use bluedex_core::types::{Properties, Value};
use bluedex_devices::{DeviceManager, MemoryBus, PropertiesChanged};

use tracing::info;

fn peripheral(address: &str, name: &str, rssi: i16) -> Properties {
    let mut properties = Properties::new();
    properties.insert("Address".to_string(), Value::from(address));
    properties.insert("Name".to_string(), Value::from(name));
    properties.insert("RSSI".to_string(), Value::from(rssi));
    properties
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration, letting BLUEDEX__* variables override the defaults
    let config = ConfigBuilder::new()
        .with_environment_prefix("BLUEDEX")
        .build()?;
    logging::init_from_config(&config.logging)?;

    // Stand up an in-memory bus with two radios
    let bus = MemoryBus::new();
    bus.add_adapter("hci0", "00:1A:7D:DA:71:13");
    bus.add_adapter("hci1", "5C:F3:70:8B:12:04");
    bus.queue_discovery(
        "hci0",
        "dev_F4_5E_AB_27_91_0C",
        peripheral("F4:5E:AB:27:91:0C", "Heart Rate Strap", -62),
    );
    bus.queue_discovery(
        "hci1",
        "dev_C8_69_CD_10_3A_7F",
        peripheral("C8:69:CD:10:3A:7F", "Desk Speaker", -48),
    );

    let manager = DeviceManager::connect(&bus, &config).await?;

    manager
        .register_property_handler(Arc::new(|event: &PropertiesChanged| {
            info!("{} changed {:?}", event.path, event.changed);
        }))
        .await?;

    for adapter in manager.scan_for_adapters().await? {
        info!("Found adapter {}", adapter);
    }
    info!("Default adapter: {:?}", manager.default_adapter());

    // Scan the default adapter, then the second one by interface name
    let timeout = Duration::from_millis(200);
    for device in manager.scan_for_devices(None, timeout).await? {
        info!("Default adapter saw {}", device);
    }
    for device in manager.scan_for_devices(Some("hci1"), timeout).await? {
        info!("hci1 saw {}", device);
    }

    manager.set_default_adapter("5c:f3:70:8b:12:04").await?;
    for device in manager.get_default_devices().await? {
        info!("Cached on new default: {:?}", device.info());
    }

    manager.close_connection().await?;
    Ok(())
}
