//! Generic device model shared with the rest of the hub
//!
//! These are the types the emulator sees on the generic device-update fan-out
//! and hands to the generic device-command dispatcher. Property values stay
//! untyped (`serde_json::Value`) because every adapter encodes its own state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Stable external identifier of a device (e.g. `light.kitchen`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Kind of device as reported by the owning adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Light,
    Switch,
    Group,
    Vacuum,
    Sensor,
    Lock,
    Camera,
    Weather,
    Hub,
    #[serde(other)]
    Unknown,
}

impl DeviceType {
    /// Device types the Hue emulator knows how to present as lights
    pub const SUPPORTED: [DeviceType; 4] = [
        DeviceType::Light,
        DeviceType::Switch,
        DeviceType::Group,
        DeviceType::Vacuum,
    ];

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Light => "light",
            DeviceType::Switch => "switch",
            DeviceType::Group => "group",
            DeviceType::Vacuum => "vacuum",
            DeviceType::Sensor => "sensor",
            DeviceType::Lock => "lock",
            DeviceType::Camera => "camera",
            DeviceType::Weather => "weather",
            DeviceType::Hub => "hub",
            DeviceType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Well-known device state property keys
pub mod property {
    pub const ON: &str = "on";
    pub const BRIGHTNESS: &str = "brightness";
    pub const VAC_STATUS: &str = "vacStatus";
    pub const FAN_SPEED: &str = "fanSpeed";

    /// Properties the master merges into its registry; everything else is ignored
    pub const MERGED: [&str; 4] = [ON, BRIGHTNESS, VAC_STATUS, FAN_SPEED];

    /// Value of `vacStatus` while a vacuum is running
    pub const VAC_CLEANING: &str = "cleaning";

    pub fn is_merged(key: &str) -> bool {
        MERGED.contains(&key)
    }
}

/// Device state as a key/value map
pub type DeviceState = Map<String, Value>;

/// Command understood by the generic device-command dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    On,
    Off,
    Toggle,
    SetBrightness,
    SetFanSpeed,
    SetColor,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::On => "on",
            Command::Off => "off",
            Command::Toggle => "toggle",
            Command::SetBrightness => "set-brightness",
            Command::SetFanSpeed => "set-fan-speed",
            Command::SetColor => "set-color",
        };
        f.write_str(name)
    }
}

/// Typed command payload.
///
/// Serialized untagged so the dispatcher receives plain objects:
/// `{}`, `{"value": 50}` or `{"r": 255, "g": 0, "b": 0}`. Decoding is strict:
/// an object with unknown keys or out-of-range values matches no variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, try_from = "StrictAttributes")]
pub enum CommandAttributes {
    Color { r: u8, g: u8, b: u8 },
    Percent { value: u8 },
    OnOff {},
}

/// Decoding form of [`CommandAttributes`], rejecting unknown keys per variant
#[derive(Deserialize)]
#[serde(untagged)]
enum StrictAttributes {
    Color(ColorFields),
    Percent(PercentFields),
    OnOff(EmptyFields),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ColorFields {
    r: u8,
    g: u8,
    b: u8,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PercentFields {
    value: u8,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptyFields {}

impl TryFrom<StrictAttributes> for CommandAttributes {
    type Error = String;

    fn try_from(attributes: StrictAttributes) -> Result<Self, Self::Error> {
        match attributes {
            StrictAttributes::Color(ColorFields { r, g, b }) => {
                Ok(CommandAttributes::Color { r, g, b })
            }
            StrictAttributes::Percent(PercentFields { value }) if value <= 100 => {
                Ok(CommandAttributes::Percent { value })
            }
            StrictAttributes::Percent(PercentFields { value }) => {
                Err(format!("percent value {} out of range 0..=100", value))
            }
            StrictAttributes::OnOff(EmptyFields {}) => Ok(CommandAttributes::OnOff {}),
        }
    }
}

impl Default for CommandAttributes {
    fn default() -> Self {
        CommandAttributes::OnOff {}
    }
}

/// Device update delivered by the generic fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub id: DeviceId,
    pub device_type: DeviceType,
    pub name: String,
    pub state: DeviceState,
    pub first_seen: DateTime<Utc>,
}

impl DeviceUpdate {
    /// Create an update stamped with the current time
    pub fn new(
        id: impl Into<DeviceId>,
        device_type: DeviceType,
        name: impl Into<String>,
        state: DeviceState,
    ) -> Self {
        Self {
            id: id.into(),
            device_type,
            name: name.into(),
            state,
            first_seen: Utc::now(),
        }
    }
}

/// Read a percent property, accepting either `50` or `{"value": 50}`.
///
/// Values are clamped to 0..=100. Anything else yields `None`.
pub fn percent_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Object(map) => map.get("value")?.as_f64()?,
        _ => return None,
    };
    Some(raw.round().clamp(0.0, 100.0) as u8)
}
