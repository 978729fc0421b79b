/*!
 * Bus gateway abstractions.
 *
 * The manager never talks to the system bus directly. It consumes a
 * [`BusGateway`], which enumerates child nodes under an object path and hands
 * out typed proxies for the two capabilities the manager understands:
 * [`AdapterProxy`] and [`DeviceProxy`].
 */
use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use bluedex_core::error::{Error, Result};
use bluedex_core::types::{BusPath, Properties};

/// Remote adapter capability (BlueZ `org.bluez.Adapter1`)
#[async_trait]
pub trait AdapterProxy: Send + Sync + Debug {
    /// Read the adapter's hardware address
    async fn address(&self) -> Result<String>;

    /// Ask the radio to start discovering devices
    ///
    /// An error means discovery could not be started (already running,
    /// radio powered off, ...).
    async fn start_discovery(&self) -> Result<()>;

    /// Ask the radio to stop discovering devices
    async fn stop_discovery(&self) -> Result<()>;

    /// Read all adapter properties
    async fn properties(&self) -> Result<Properties>;
}

/// Remote device capability (BlueZ `org.bluez.Device1`)
#[async_trait]
pub trait DeviceProxy: Send + Sync + Debug {
    /// Read all device properties
    async fn properties(&self) -> Result<Properties>;
}

/// A `PropertiesChanged` notification emitted by a remote object
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesChanged {
    /// Path of the object whose properties changed
    pub path: BusPath,
    /// Interface the properties belong to
    pub interface: String,
    /// Properties with their new values
    pub changed: Properties,
    /// Properties that were invalidated without a new value
    pub invalidated: Vec<String>,
}

/// Receiver of remote property-change notifications
pub trait PropertyHandler: Send + Sync {
    /// Called once per notification
    fn on_properties_changed(&self, event: &PropertiesChanged);
}

impl<F> PropertyHandler for F
where
    F: Fn(&PropertiesChanged) + Send + Sync,
{
    fn on_properties_changed(&self, event: &PropertiesChanged) {
        self(event)
    }
}

/// An established connection to the bus hosting the radio subsystem
#[async_trait]
pub trait BusGateway: Send + Sync + Debug {
    /// Enumerate the immediate child node names under `path`
    ///
    /// Returns an empty set when the node has no children.
    async fn list_children(&self, path: &BusPath) -> Result<BTreeSet<String>>;

    /// Obtain an adapter proxy for `path`, or `None` if the object does not
    /// implement the adapter capability
    async fn adapter_proxy(&self, path: &BusPath) -> Result<Option<Arc<dyn AdapterProxy>>>;

    /// Obtain a device proxy for `path`, or `None` if the object does not
    /// implement the device capability
    async fn device_proxy(&self, path: &BusPath) -> Result<Option<Arc<dyn DeviceProxy>>>;

    /// Subscribe `handler` to property-change notifications
    async fn add_property_handler(&self, handler: Arc<dyn PropertyHandler>) -> Result<()>;

    /// Terminate the connection
    async fn disconnect(&self) -> Result<()>;
}

/// Which bus to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusAddress {
    /// The system-wide bus
    System,
    /// The current user's session bus
    Session,
    /// An explicit address, e.g. `unix:path=/run/dbus/system_bus_socket`
    Address(String),
}

impl BusAddress {
    /// Whether connecting requires a local unix socket
    pub fn is_unix_socket(&self) -> bool {
        match self {
            BusAddress::System | BusAddress::Session => true,
            BusAddress::Address(address) => address.starts_with("unix:"),
        }
    }
}

impl FromStr for BusAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "" => Err(Error::invalid_argument("an empty string is not a valid bus address")),
            "system" => Ok(BusAddress::System),
            "session" => Ok(BusAddress::Session),
            other if other.contains(':') => Ok(BusAddress::Address(other.to_string())),
            other => Err(Error::invalid_argument(format!(
                "{:?} is not a bus address; expected system, session or transport:key=value",
                other
            ))),
        }
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusAddress::System => write!(f, "system"),
            BusAddress::Session => write!(f, "session"),
            BusAddress::Address(address) => write!(f, "{}", address),
        }
    }
}

/// Opens a [`BusGateway`] for an address
#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Connect to the bus at `address`
    async fn connect(&self, address: &BusAddress) -> Result<Arc<dyn BusGateway>>;
}
