/*!
 * bluedex Devices
 *
 * This crate discovers and indexes local Bluetooth adapters and the
 * peripherals they find, talking to the radio subsystem through a
 * [`BusGateway`].
 *
 * ```no_run
 * use std::sync::Arc;
 * use std::time::Duration;
 *
 * use bluedex_devices::{DeviceManager, ManagerOptions, MemoryBus};
 *
 * # async fn example() -> bluedex_devices::Result<()> {
 * let bus = MemoryBus::new();
 * bus.add_adapter("hci0", "00:1A:7D:DA:71:13");
 *
 * let manager = DeviceManager::new(Arc::new(bus), ManagerOptions::default());
 * for device in manager.scan_for_devices(Some("hci0"), Duration::from_secs(5)).await? {
 *     println!("{}", device);
 * }
 * # Ok(())
 * # }
 * ```
 */

#![warn(missing_docs)]

// Re-export core types
pub use bluedex_core::prelude;

pub mod adapter;
pub mod bus;
pub mod connection;
pub mod device;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod registry;
pub mod resolver;

#[cfg(any(test, feature = "memory-bus"))]
pub mod memory;

pub use adapter::Adapter;
pub use bus::{
    AdapterProxy, BusAddress, BusConnector, BusGateway, DeviceProxy, PropertiesChanged,
    PropertyHandler,
};
pub use connection::BusConnection;
pub use device::{Device, DeviceInfo};
pub use discovery::{DiscoveryReport, DiscoverySession};
pub use error::{ManagerError, Result};
pub use manager::{DeviceManager, ManagerOptions, SharedDeviceManager};
pub use registry::{AdapterIndex, AdapterSnapshot, DeviceIndex};
pub use resolver::AdapterResolver;

#[cfg(any(test, feature = "memory-bus"))]
pub use memory::MemoryBus;

/// bluedex devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging and report the crate version
pub fn init() -> std::result::Result<(), bluedex_core::error::Error> {
    bluedex_core::init()?;
    tracing::info!("bluedex devices {} initialized", VERSION);
    Ok(())
}
