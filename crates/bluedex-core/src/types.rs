/*!
 * Core data types for bluedex.
 *
 * This module defines the bus paths, hardware addresses and property values
 * shared by the adapter and device layers.
 */
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An absolute object path on the system bus, e.g. `/org/bluez/hci0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusPath(String);

impl BusPath {
    /// Create a path, dropping any trailing separator
    pub fn new<S: AsRef<str>>(path: S) -> Self {
        let path = path.as_ref();
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            Self("/".to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Append one node segment to this path
    pub fn join<S: AsRef<str>>(&self, segment: S) -> Self {
        let segment = segment.as_ref().trim_matches('/');
        if self.0 == "/" {
            Self(format!("/{}", segment))
        } else {
            Self(format!("{}/{}", self.0, segment))
        }
    }

    /// The last node segment, e.g. `hci0` for `/org/bluez/hci0`
    pub fn last_segment(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Get the string representation of the path
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BusPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BusPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for BusPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Bring a hardware address into canonical form: upper-case hex pairs joined by `:`.
///
/// `aa-bb-cc-dd-ee-ff` and `aa_bb_cc_dd_ee_ff` both become `AA:BB:CC:DD:EE:FF`.
/// Anything else is only trimmed and upper-cased.
pub fn canonical_address(address: &str) -> String {
    address.trim().replace(['-', '_'], ":").to_ascii_uppercase()
}

/// Check whether a string is a six-octet hardware address
pub fn is_hardware_address(address: &str) -> bool {
    let canonical = canonical_address(address);
    let octets: Vec<&str> = canonical.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

/// A property value exposed by a remote object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Map of string keys to values
    Object(HashMap<String, Value>),
    /// Binary data
    Binary(Vec<u8>),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get binary data
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i16> for Value {
    fn from(i: i16) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Remote properties keyed by property name (`Address`, `Name`, `RSSI`, ...)
pub type Properties = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_path_join() {
        let root = BusPath::new("/org/bluez");
        let adapter = root.join("hci0");
        assert_eq!(adapter.as_str(), "/org/bluez/hci0");
        assert_eq!(adapter.join("dev_AA_BB").as_str(), "/org/bluez/hci0/dev_AA_BB");
    }

    #[test]
    fn test_bus_path_normalises_trailing_separator() {
        assert_eq!(BusPath::new("/org/bluez/").as_str(), "/org/bluez");
        assert_eq!(BusPath::new("/").join("org").as_str(), "/org");
        assert_eq!(BusPath::new("").as_str(), "/");
    }

    #[test]
    fn test_bus_path_last_segment() {
        assert_eq!(BusPath::new("/org/bluez/hci1").last_segment(), "hci1");
        assert_eq!(BusPath::new("/").last_segment(), "");
    }

    #[test]
    fn test_canonical_address() {
        assert_eq!(canonical_address("aa:bb:cc:dd:ee:ff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(canonical_address(" aa-bb-cc-dd-ee-ff "), "AA:BB:CC:DD:EE:FF");
        assert_eq!(canonical_address("hci0"), "HCI0");
    }

    #[test]
    fn test_is_hardware_address() {
        assert!(is_hardware_address("00:1A:7D:DA:71:13"));
        assert!(is_hardware_address("00_1a_7d_da_71_13"));
        assert!(!is_hardware_address("hci0"));
        assert!(!is_hardware_address("00:1A:7D:DA:71"));
        assert!(!is_hardware_address("00:1A:7D:DA:71:ZZ"));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from(-60i16).as_integer(), Some(-60));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from("Keyboard").as_str(), Some("Keyboard"));
        assert_eq!(Value::Float(3.0).as_integer(), Some(3));
        assert_eq!(Value::Float(3.5).as_integer(), None);
        assert!(Value::default().is_null());
    }

    #[test]
    fn test_value_from_json() {
        let json = serde_json::json!({"RSSI": -42, "Paired": false, "UUIDs": ["180f"]});
        let value = Value::from(json);
        match value {
            Value::Object(map) => {
                assert_eq!(map["RSSI"].as_integer(), Some(-42));
                assert_eq!(map["Paired"].as_bool(), Some(false));
                assert_eq!(map["UUIDs"].as_array().map(|a| a.len()), Some(1));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}
