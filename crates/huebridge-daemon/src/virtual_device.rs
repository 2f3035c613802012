//! In-process device adapter for devices declared in the configuration
//!
//! Each virtual device announces itself on the fan-out at startup and applies
//! the commands addressed to it, re-announcing its new state. This lets the
//! emulator run end to end without a real device hub.

use huebridge_core::device::percent_value;
use huebridge_core::{
    property, Command, CommandBus, DeviceCommandEvent, DeviceId, DeviceState, DeviceType,
    DeviceUpdate, FanOut,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::VirtualDeviceConfig;

const VAC_DOCKED: &str = "docked";

#[derive(Debug, Clone)]
struct VirtualDevice {
    id: DeviceId,
    device_type: DeviceType,
    name: String,
    state: DeviceState,
}

impl VirtualDevice {
    fn to_update(&self) -> DeviceUpdate {
        DeviceUpdate::new(
            self.id.clone(),
            self.device_type,
            self.name.clone(),
            self.state.clone(),
        )
    }
}

pub struct VirtualDevices {
    devices: Mutex<Vec<VirtualDevice>>,
    fan_out: Arc<FanOut>,
}

impl VirtualDevices {
    pub fn new(configs: &[VirtualDeviceConfig], fan_out: Arc<FanOut>) -> Arc<Self> {
        let devices = configs
            .iter()
            .map(|c| VirtualDevice {
                id: DeviceId::from(c.id.as_str()),
                device_type: c.device_type,
                name: c.name.clone().unwrap_or_else(|| c.id.clone()),
                state: c.state.clone(),
            })
            .collect();

        Arc::new(Self {
            devices: Mutex::new(devices),
            fan_out,
        })
    }

    /// Publish every device's current state on the fan-out
    pub async fn announce(&self) {
        let devices = self.devices.lock().await;
        for device in devices.iter() {
            self.fan_out.publish(device.to_update());
        }
        info!(devices = devices.len(), "Announced virtual devices");
    }

    /// Apply dispatched commands until the command bus goes away
    pub fn start(self: &Arc<Self>, commands: &CommandBus) -> JoinHandle<()> {
        let mut rx = commands.subscribe();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        this.apply(&event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Virtual devices missed commands");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Apply one command, returns how many devices changed state
    pub async fn apply(&self, event: &DeviceCommandEvent) -> usize {
        let mut changed = 0;
        let mut devices = self.devices.lock().await;
        for device in devices.iter_mut().filter(|d| event.targets(d.id.as_str())) {
            if apply_command(device.device_type, &mut device.state, event) {
                debug!(device = %device.id, command = %event.command, "Virtual device changed");
                self.fan_out.publish(device.to_update());
                changed += 1;
            }
        }
        changed
    }
}

fn apply_command(
    device_type: DeviceType,
    state: &mut DeviceState,
    event: &DeviceCommandEvent,
) -> bool {
    let percent = || percent_value(&Value::Object(event.attributes.clone()));

    let (key, value) = match (device_type, event.command) {
        (DeviceType::Vacuum, Command::On) => {
            (property::VAC_STATUS, Value::from(property::VAC_CLEANING))
        }
        (DeviceType::Vacuum, Command::Off) => (property::VAC_STATUS, Value::from(VAC_DOCKED)),
        (DeviceType::Vacuum, Command::Toggle) => {
            let cleaning = state.get(property::VAC_STATUS).and_then(Value::as_str)
                == Some(property::VAC_CLEANING);
            let next = if cleaning { VAC_DOCKED } else { property::VAC_CLEANING };
            (property::VAC_STATUS, Value::from(next))
        }
        (_, Command::On) => (property::ON, Value::Bool(true)),
        (_, Command::Off) => (property::ON, Value::Bool(false)),
        (_, Command::Toggle) => {
            let on = state.get(property::ON).and_then(Value::as_bool).unwrap_or(false);
            (property::ON, Value::Bool(!on))
        }
        (_, Command::SetBrightness) => match percent() {
            Some(p) => (property::BRIGHTNESS, Value::from(p)),
            None => return false,
        },
        (_, Command::SetFanSpeed) => match percent() {
            Some(p) => (property::FAN_SPEED, Value::from(p)),
            None => return false,
        },
        (_, Command::SetColor) => return false,
    };

    if state.get(key) == Some(&value) {
        return false;
    }
    state.insert(key.to_string(), value);
    true
}
