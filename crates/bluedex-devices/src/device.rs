/*!
 * Discovered peripheral devices.
 *
 * A [`Device`] wraps the remote device proxy together with the properties
 * captured when it was enumerated, the adapter it was found through, and the
 * shared bus connection.
 */
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bluedex_core::error::Result;
use bluedex_core::types::{canonical_address, BusPath, Properties, Value};

use crate::adapter::Adapter;
use crate::bus::DeviceProxy;
use crate::connection::BusConnection;

/// A serializable summary of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Bus path of the device
    pub path: BusPath,
    /// Address of the adapter that discovered it
    pub adapter_address: String,
    /// Hardware address of the device
    pub address: Option<String>,
    /// Remote name, falling back to the alias
    pub name: Option<String>,
    /// Received signal strength in dBm
    pub rssi: Option<i64>,
    /// Whether the device is paired
    pub paired: bool,
    /// Whether the device is connected
    pub connected: bool,
}

/// One peripheral found by a discovery session
#[derive(Debug)]
pub struct Device {
    path: BusPath,
    adapter: Arc<Adapter>,
    proxy: Arc<dyn DeviceProxy>,
    properties: Properties,
    connection: BusConnection,
}

impl Device {
    /// Wrap a device proxy found at `path`, capturing its current properties
    pub async fn from_proxy(
        proxy: Arc<dyn DeviceProxy>,
        adapter: Arc<Adapter>,
        path: BusPath,
        connection: BusConnection,
    ) -> Result<Self> {
        let properties = proxy.properties().await?;
        Ok(Self {
            path,
            adapter,
            proxy,
            properties,
            connection,
        })
    }

    /// Bus path of this device
    pub fn path(&self) -> &BusPath {
        &self.path
    }

    /// The adapter this device was discovered through
    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }

    /// Address of the owning adapter
    pub fn adapter_address(&self) -> &str {
        self.adapter.address()
    }

    /// The shared bus connection
    pub fn connection(&self) -> &BusConnection {
        &self.connection
    }

    /// Properties captured at enumeration time
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// A single captured property
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    fn string_property(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(Value::as_str)
    }

    /// Hardware address of the device
    pub fn address(&self) -> Option<String> {
        self.string_property("Address").map(canonical_address)
    }

    /// Remote name, falling back to the alias
    pub fn name(&self) -> Option<&str> {
        self.string_property("Name")
            .or_else(|| self.string_property("Alias"))
    }

    /// Received signal strength in dBm, if the radio reported one
    pub fn rssi(&self) -> Option<i64> {
        self.property("RSSI").and_then(Value::as_integer)
    }

    /// Whether the device is paired
    pub fn is_paired(&self) -> bool {
        self.property("Paired").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Whether the device is connected
    pub fn is_connected(&self) -> bool {
        self.property("Connected").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Read the device's properties again from the bus.
    ///
    /// The captured snapshot is left untouched.
    pub async fn fetch_properties(&self) -> Result<Properties> {
        self.proxy.properties().await
    }

    /// Summarise the device
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            path: self.path.clone(),
            adapter_address: self.adapter_address().to_string(),
            address: self.address(),
            name: self.name().map(str::to_string),
            rssi: self.rssi(),
            paired: self.is_paired(),
            connected: self.is_connected(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name(), self.address()) {
            (Some(name), Some(address)) => write!(f, "{} [{}]", name, address),
            (None, Some(address)) => write!(f, "[{}]", address),
            _ => write!(f, "{}", self.path),
        }
    }
}
