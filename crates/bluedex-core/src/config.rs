/*!
 * Configuration management for bluedex.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings for the adapter and device manager.
 */
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::BusPath;
use crate::utils::millis_to_duration;

/// Namespace root under which BlueZ publishes its adapters
pub const DEFAULT_NAMESPACE_ROOT: &str = "/org/bluez";

/// Discovery timeout used when a cached device lookup has to scan first
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 5000;

/// Core configuration for bluedex
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bus connection configuration
    #[serde(default)]
    pub bus: BusConfig,

    /// Discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to include the event target in log lines
    #[serde(default = "default_log_target")]
    pub with_target: bool,
}

/// Bus connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bus to connect to: `system`, `session`, or an explicit address
    /// such as `unix:path=/run/dbus/system_bus_socket` or `tcp:host=127.0.0.1,port=13245`
    #[serde(default = "default_bus_address")]
    pub address: String,
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Root path of the radio subsystem's object namespace
    #[serde(default = "default_namespace_root")]
    pub namespace_root: String,

    /// Discovery duration used by cached lookups that have nothing recorded yet
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl DiscoveryConfig {
    /// The namespace root as a bus path
    pub fn root(&self) -> BusPath {
        BusPath::new(&self.namespace_root)
    }

    /// The default discovery duration
    pub fn default_timeout(&self) -> Duration {
        millis_to_duration(self.default_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            logging: LoggingConfig::default(),
            bus: BusConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: default_log_target(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address: default_bus_address(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            namespace_root: default_namespace_root(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Config {
    /// Check the values that cannot be expressed through serde defaults
    pub fn validate(&self) -> Result<()> {
        if self.bus.address.trim().is_empty() {
            return Err(Error::config("bus.address must not be empty"));
        }
        if !self.discovery.namespace_root.starts_with('/') {
            return Err(Error::config(format!(
                "discovery.namespace_root must be an absolute path, got {:?}",
                self.discovery.namespace_root
            )));
        }
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }
}

fn default_app_name() -> String {
    "bluedex".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_target() -> bool {
    true
}

fn default_bus_address() -> String {
    "system".to_string()
}

fn default_namespace_root() -> String {
    DEFAULT_NAMESPACE_ROOT.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_DISCOVERY_TIMEOUT_MS
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    override_with: Option<Config>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Override with an existing config
    pub fn override_with(mut self, config: Config) -> Self {
        self.override_with = Some(config);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        if let Some(config) = self.override_with {
            config.validate()?;
            return Ok(config);
        }

        let mut config_builder = ConfigLib::builder();

        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}
