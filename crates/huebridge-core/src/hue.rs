//! Hue Bridge v1 wire format and translation from the generic device model
//!
//! Everything here is pure. Per-type behavior lives in a fixed table of
//! [`DeviceProfile`]s selected by [`DeviceType`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::device::{
    percent_value, property, Command, CommandAttributes, DeviceId, DeviceState, DeviceType,
};
use crate::message::{DeviceCommandMessage, DeviceUpdateMessage};
use crate::profile::LightIdentity;

/// Maximum Hue brightness
pub const BRIGHTNESS_MAX: u8 = 254;

/// Internal percent (0..=100) to Hue brightness (0..=254)
pub fn percent_to_hue(percent: u8) -> u8 {
    let percent = f64::from(percent.min(100));
    (percent * f64::from(BRIGHTNESS_MAX) / 100.0).round() as u8
}

/// Hue brightness to internal percent. Out-of-range input is clamped.
pub fn hue_to_percent(bri: i64) -> u8 {
    let bri = bri.clamp(0, i64::from(BRIGHTNESS_MAX)) as f64;
    (bri * 100.0 / f64::from(BRIGHTNESS_MAX)).round() as u8
}

/// How a device type maps onto a Hue light
pub struct DeviceProfile {
    pub is_on: fn(&DeviceState) -> bool,
    /// Brightness on the Hue scale
    pub brightness: fn(&DeviceState) -> u8,
    /// Command for a brightness write (percent), `None` if the type ignores it
    pub set_brightness: fn(&DeviceId, u8) -> Option<DeviceCommandMessage>,
}

static GENERIC: DeviceProfile = DeviceProfile {
    is_on: on_flag,
    brightness: brightness_property,
    set_brightness: set_brightness_command,
};

static SWITCH: DeviceProfile = DeviceProfile {
    is_on: on_flag,
    brightness: brightness_property,
    set_brightness: ignore_brightness,
};

static VACUUM: DeviceProfile = DeviceProfile {
    is_on: vacuum_cleaning,
    brightness: vacuum_fan_speed,
    set_brightness: set_fan_speed_command,
};

impl DeviceProfile {
    pub fn for_type(device_type: DeviceType) -> &'static DeviceProfile {
        match device_type {
            DeviceType::Vacuum => &VACUUM,
            DeviceType::Switch => &SWITCH,
            _ => &GENERIC,
        }
    }
}

fn on_flag(state: &DeviceState) -> bool {
    state
        .get(property::ON)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Missing or unreadable brightness reads as fully bright
fn percent_property_as_hue(state: &DeviceState, key: &str) -> u8 {
    state
        .get(key)
        .and_then(percent_value)
        .map(percent_to_hue)
        .unwrap_or(BRIGHTNESS_MAX)
}

fn brightness_property(state: &DeviceState) -> u8 {
    percent_property_as_hue(state, property::BRIGHTNESS)
}

fn vacuum_cleaning(state: &DeviceState) -> bool {
    state.get(property::VAC_STATUS).and_then(Value::as_str) == Some(property::VAC_CLEANING)
}

fn vacuum_fan_speed(state: &DeviceState) -> u8 {
    percent_property_as_hue(state, property::FAN_SPEED)
}

fn set_brightness_command(device_id: &DeviceId, percent: u8) -> Option<DeviceCommandMessage> {
    Some(DeviceCommandMessage::command(
        device_id.as_str(),
        Command::SetBrightness,
        CommandAttributes::Percent { value: percent },
    ))
}

fn ignore_brightness(_: &DeviceId, _: u8) -> Option<DeviceCommandMessage> {
    None
}

fn set_fan_speed_command(device_id: &DeviceId, percent: u8) -> Option<DeviceCommandMessage> {
    Some(DeviceCommandMessage::command(
        device_id.as_str(),
        Command::SetFanSpeed,
        CommandAttributes::Percent { value: percent },
    ))
}

/// Hue light state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    pub hue: u16,
    pub sat: u8,
    pub ct: u16,
    pub xy: [f64; 2],
    pub reachable: bool,
    pub on: bool,
    pub bri: u8,
    pub effect: String,
    pub alert: String,
    pub colormode: String,
}

/// Point symbols, always empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSymbol {
    #[serde(rename = "1")]
    pub one: String,
    #[serde(rename = "2")]
    pub two: String,
    #[serde(rename = "3")]
    pub three: String,
    #[serde(rename = "4")]
    pub four: String,
    #[serde(rename = "5")]
    pub five: String,
    #[serde(rename = "6")]
    pub six: String,
    #[serde(rename = "7")]
    pub seven: String,
    #[serde(rename = "8")]
    pub eight: String,
}

/// Hue light object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub state: LightState,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub modelid: String,
    pub manufacturername: String,
    pub uniqueid: String,
    pub swversion: String,
    pub pointsymbol: PointSymbol,
}

/// Response of `GET /api/{user}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightsList {
    pub lights: BTreeMap<String, Light>,
}

/// Body of `PUT /api/{user}/lights/{id}/state`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRequest {
    #[serde(default)]
    pub on: Option<bool>,
    #[serde(default)]
    pub bri: Option<i64>,
}

/// One element of the Hue success envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessEntry {
    pub success: Map<String, Value>,
}

/// Translate a registry entry into a Hue light.
///
/// Reachability is not modelled: every known light reports reachable.
pub fn light_object(entry: &DeviceUpdateMessage, identity: &LightIdentity) -> Light {
    let profile = DeviceProfile::for_type(entry.device_type);
    Light {
        state: LightState {
            hue: 0,
            sat: 0,
            ct: 0,
            xy: [0.0, 0.0],
            reachable: true,
            on: (profile.is_on)(&entry.state),
            bri: (profile.brightness)(&entry.state),
            effect: String::new(),
            alert: String::new(),
            colormode: String::new(),
        },
        kind: identity.kind.clone(),
        name: entry.name.clone(),
        modelid: identity.model_id.clone(),
        manufacturername: identity.manufacturer_name.clone(),
        uniqueid: entry.device_id.to_string(),
        swversion: identity.sw_version.clone(),
        pointsymbol: PointSymbol::default(),
    }
}

/// Commands implied by a state change request, on/off first
pub fn state_commands(
    device_id: &DeviceId,
    device_type: DeviceType,
    request: &StateRequest,
) -> Vec<DeviceCommandMessage> {
    let mut commands = Vec::with_capacity(2);

    if let Some(on) = request.on {
        let command = if on { Command::On } else { Command::Off };
        commands.push(DeviceCommandMessage::command(
            device_id.as_str(),
            command,
            CommandAttributes::OnOff {},
        ));
    }

    if let Some(bri) = request.bri {
        let profile = DeviceProfile::for_type(device_type);
        if let Some(cmd) = (profile.set_brightness)(device_id, hue_to_percent(bri)) {
            commands.push(cmd);
        }
    }

    commands
}

/// Success envelope echoing the requested values
pub fn success_envelope(light_id: &str, request: &StateRequest) -> Vec<SuccessEntry> {
    let mut success = Map::new();
    if let Some(on) = request.on {
        success.insert(format!("/lights/{}/state/on", light_id), Value::Bool(on));
    }
    if let Some(bri) = request.bri {
        success.insert(format!("/lights/{}/state/bri", light_id), Value::from(bri));
    }
    vec![SuccessEntry { success }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(device_type: DeviceType, state: Value) -> DeviceUpdateMessage {
        let mut msg = DeviceUpdateMessage::new(DeviceId::from("dev.one"), device_type, "One");
        if let Value::Object(map) = state {
            msg.state = map;
        }
        msg
    }

    #[test]
    fn test_brightness_scale() {
        assert_eq!(percent_to_hue(0), 0);
        assert_eq!(percent_to_hue(100), 254);
        assert_eq!(percent_to_hue(80), 203);
        assert_eq!(percent_to_hue(50), 127);
        assert_eq!(hue_to_percent(254), 100);
        assert_eq!(hue_to_percent(127), 50);
        assert_eq!(hue_to_percent(50), 20);
        assert_eq!(hue_to_percent(-10), 0);
        assert_eq!(hue_to_percent(1000), 100);
    }

    #[test]
    fn test_brightness_round_trip_is_stable() {
        for p in 0..=100u8 {
            let hue = percent_to_hue(p);
            assert_eq!(percent_to_hue(hue_to_percent(i64::from(hue))), hue, "percent {}", p);
        }
    }

    #[test]
    fn test_missing_brightness_reads_full() {
        let kitchen = entry(DeviceType::Light, json!({"on": true}));
        let light = light_object(&kitchen, &LightIdentity::default());
        assert_eq!(light.state.bri, BRIGHTNESS_MAX);
        assert!(light.state.on);
        assert!(light.state.reachable);
    }

    #[test]
    fn test_light_object_fields() {
        let light = light_object(
            &entry(DeviceType::Light, json!({"on": false, "brightness": {"value": 80}})),
            &LightIdentity::default(),
        );
        assert_eq!(light.state.bri, 203);
        assert!(!light.state.on);
        assert_eq!(light.uniqueid, "dev.one");
        assert_eq!(light.modelid, "LCT001");

        let value = serde_json::to_value(&light).unwrap();
        assert_eq!(value["type"], "Extended color light");
        assert_eq!(value["pointsymbol"]["8"], "");
        assert_eq!(value["state"]["xy"], json!([0.0, 0.0]));
    }

    #[test]
    fn test_vacuum_reads_status_and_fan_speed() {
        let identity = LightIdentity::default();
        let cleaning = light_object(
            &entry(DeviceType::Vacuum, json!({"vacStatus": "cleaning", "fanSpeed": 50})),
            &identity,
        );
        assert!(cleaning.state.on);
        assert_eq!(cleaning.state.bri, 127);

        let docked = light_object(
            &entry(DeviceType::Vacuum, json!({"vacStatus": "docked", "on": true})),
            &identity,
        );
        assert!(!docked.state.on);
        assert_eq!(docked.state.bri, BRIGHTNESS_MAX);
    }

    #[test]
    fn test_state_commands_per_type() {
        let id = DeviceId::from("dev.one");
        let request = StateRequest { on: Some(true), bri: Some(127) };

        let light = state_commands(&id, DeviceType::Light, &request);
        assert_eq!(light.len(), 2);
        assert_eq!(light[0].command, Some(Command::On));
        assert_eq!(light[1].command, Some(Command::SetBrightness));
        assert_eq!(light[1].attributes, Some(CommandAttributes::Percent { value: 50 }));

        let dim = StateRequest {
            on: None,
            bri: Some(50),
        };
        let vacuum = state_commands(&id, DeviceType::Vacuum, &dim);
        assert_eq!(vacuum.len(), 1);
        assert_eq!(vacuum[0].command, Some(Command::SetFanSpeed));

        let switch = state_commands(&id, DeviceType::Switch, &dim);
        assert!(switch.is_empty());

        let off_request = StateRequest {
            on: Some(false),
            bri: None,
        };
        let off = state_commands(&id, DeviceType::Group, &off_request);
        assert_eq!(off[0].command, Some(Command::Off));
        assert_eq!(off[0].attributes, Some(CommandAttributes::OnOff {}));
    }

    #[test]
    fn test_success_envelope() {
        let envelope = success_envelope("42", &StateRequest { on: Some(true), bri: Some(200) });
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!([{"success": {"/lights/42/state/on": true, "/lights/42/state/bri": 200}}])
        );

        let only_on = success_envelope("42", &StateRequest { on: Some(false), bri: None });
        assert_eq!(only_on[0].success.len(), 1);
    }
}
