//! Configuration loading and validation

use anyhow::{Context, Result};
use huebridge_core::profile::DEFAULT_BRIDGE_UUID;
use huebridge_core::{BridgeProfile, DeviceState, DeviceType, Settings, SettingsError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub emulator: EmulatorConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default, rename = "virtual_device")]
    pub virtual_devices: Vec<VirtualDeviceConfig>,
}

/// Which half of the emulator this process runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Authoritative registry fed by the device hub
    Master,
    /// Hue API and SSDP, mirrors the master
    Worker,
    /// Master and worker in one process over the local bus
    #[default]
    Standalone,
}

impl Role {
    pub fn runs_master(self) -> bool {
        matches!(self, Role::Master | Role::Standalone)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, Role::Worker | Role::Standalone)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub role: Role,
    /// Bind address for the Hue API (defaults to all interfaces on the
    /// advertised port)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Address Hue clients are told to connect to (IPv4 host:port)
    #[serde(default = "default_advertised_address")]
    pub advertised_address: String,
    /// Device ID glob filters
    #[serde(default)]
    pub devices: Vec<String>,
    /// Device types to emulate
    #[serde(default)]
    pub types: Vec<DeviceType>,
    /// Display names by device ID
    #[serde(default)]
    pub name_overrides: HashMap<String, String>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            advertised_address: default_advertised_address(),
            devices: Vec::new(),
            types: Vec::new(),
            name_overrides: HashMap::new(),
        }
    }
}

fn default_advertised_address() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_friendly_name")]
    pub friendly_name: String,
    #[serde(default = "default_uuid")]
    pub uuid: Uuid,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            friendly_name: default_friendly_name(),
            uuid: default_uuid(),
        }
    }
}

fn default_friendly_name() -> String {
    "huebridge".to_string()
}

fn default_uuid() -> Uuid {
    DEFAULT_BRIDGE_UUID
}

/// A device simulated in-process, useful without a real device hub
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualDeviceConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub name: Option<String>,
    #[serde(default)]
    pub state: DeviceState,
}

impl Config {
    /// Validate the emulator section
    pub fn to_settings(&self) -> Result<Settings, SettingsError> {
        Settings::new(
            &self.emulator.advertised_address,
            &self.emulator.devices,
            &self.emulator.types,
            self.emulator.name_overrides.clone(),
        )
    }

    /// Bridge identity for validated settings
    pub fn to_profile(&self, settings: &Settings) -> BridgeProfile {
        BridgeProfile::new(settings.advertised_address())
            .with_friendly_name(self.bridge.friendly_name.clone())
            .with_uuid(self.bridge.uuid)
    }

    /// Address the Hue API listens on
    pub fn bind_address(&self, settings: &Settings) -> String {
        self.daemon
            .bind
            .clone()
            .unwrap_or_else(|| format!("0.0.0.0:{}", settings.advertised_address().port()))
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Annotated example configuration
pub fn sample_config() -> Result<String> {
    let mut name_overrides = HashMap::new();
    name_overrides.insert("light.kitchen".to_string(), "Kitchen".to_string());

    let mut state = DeviceState::new();
    state.insert("on".to_string(), serde_json::Value::Bool(false));
    state.insert("brightness".to_string(), serde_json::Value::from(60));

    let config = Config {
        daemon: DaemonConfig::default(),
        emulator: EmulatorConfig {
            advertised_address: "192.168.1.10:8080".to_string(),
            devices: vec!["light.*".to_string(), "vacuum.*".to_string()],
            types: vec![DeviceType::Light, DeviceType::Vacuum],
            name_overrides,
        },
        bridge: BridgeConfig::default(),
        virtual_devices: vec![VirtualDeviceConfig {
            id: "light.kitchen".to_string(),
            device_type: DeviceType::Light,
            name: Some("kitchen".to_string()),
            state,
        }],
    };

    Ok(toml::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/huebridge.toml")).unwrap();
        assert_eq!(config.daemon.role, Role::Standalone);
        assert_eq!(config.emulator.advertised_address, "127.0.0.1:8080");
        assert_eq!(config.bridge.uuid, DEFAULT_BRIDGE_UUID);

        let settings = config.to_settings().unwrap();
        assert_eq!(config.bind_address(&settings), "0.0.0.0:8080");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[daemon]
role = "worker"
bind = "127.0.0.1:9000"

[emulator]
advertised_address = "10.1.2.3:80"
devices = ["light.*"]
types = ["light", "sensor"]

[emulator.name_overrides]
"light.kitchen" = "Kitchen"

[bridge]
friendly_name = "Attic"

[[virtual_device]]
id = "light.kitchen"
type = "light"
state = {{ on = true, brightness = 40 }}
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.daemon.role, Role::Worker);
        assert!(!config.daemon.role.runs_master());
        assert_eq!(config.virtual_devices.len(), 1);
        assert_eq!(config.virtual_devices[0].state["brightness"], 40);

        let settings = config.to_settings().unwrap();
        assert_eq!(settings.types(), &[DeviceType::Light]);
        assert_eq!(config.bind_address(&settings), "127.0.0.1:9000");

        let profile = config.to_profile(&settings);
        assert_eq!(profile.friendly_name, "Attic");
        assert_eq!(profile.location(), "http://10.1.2.3:80/upnp/setup.xml");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[emulator\nadvertised_address = 1").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_sample_config_round_trips() {
        let sample = sample_config().unwrap();
        let config: Config = toml::from_str(&sample).unwrap();
        assert_eq!(config.emulator.devices, vec!["light.*", "vacuum.*"]);
        assert!(config.to_settings().is_ok());
    }
}
