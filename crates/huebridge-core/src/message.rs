//! Cluster bus wire messages
//!
//! JSON with the compact keys used on the bus since the first emulator
//! release, so mixed-version nodes keep talking to each other.

use serde::{Deserialize, Serialize};

use crate::device::{Command, CommandAttributes, DeviceId, DeviceState, DeviceType};

/// Merged device state, produced by the master for the workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceUpdateMessage {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "t")]
    pub device_type: DeviceType,
    #[serde(rename = "i")]
    pub device_id: DeviceId,
    #[serde(rename = "s", default)]
    pub state: DeviceState,
}

impl DeviceUpdateMessage {
    pub fn new(device_id: DeviceId, device_type: DeviceType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_type,
            device_id,
            state: DeviceState::new(),
        }
    }
}

/// Device command produced by a worker.
///
/// `is_discovery` asks the master to replay its whole registry; such a
/// message carries no target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommandMessage {
    #[serde(rename = "d", default)]
    pub is_discovery: bool,
    /// Target device ID, may be a glob pattern
    #[serde(rename = "i", default)]
    pub device_id: String,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<CommandAttributes>,
}

impl DeviceCommandMessage {
    /// Full-resync request sent by a worker on startup
    pub fn discovery() -> Self {
        Self {
            is_discovery: true,
            device_id: String::new(),
            command: None,
            attributes: None,
        }
    }

    pub fn command(
        device_id: impl Into<String>,
        command: Command,
        attributes: CommandAttributes,
    ) -> Self {
        Self {
            is_discovery: false,
            device_id: device_id.into(),
            command: Some(command),
            attributes: Some(attributes),
        }
    }
}
