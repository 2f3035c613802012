//! Contracts with the generic device hub
//!
//! The emulator consumes device updates from the hub's fan-out and hands
//! commands back to its dispatcher. Both are plain broadcast channels here so
//! device adapters can be attached on either side.

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::device::{Command, DeviceUpdate};
use crate::glob::Glob;

/// Default capacity of the hub broadcast channels
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Fan-out of device updates to any number of subscribers
pub struct FanOut {
    tx: broadcast::Sender<DeviceUpdate>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe_device_updates(&self) -> broadcast::Receiver<DeviceUpdate> {
        self.tx.subscribe()
    }

    /// Deliver an update, returns how many subscribers received it
    pub fn publish(&self, update: DeviceUpdate) -> usize {
        trace!(device = %update.id, "Fan-out device update");
        // No receivers is not an error for a fan-out
        self.tx.send(update).unwrap_or(0)
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new()
    }
}

/// Untyped device-command entry point of the hub
pub trait CommandDispatcher: Send + Sync {
    fn invoke_device_command(
        &self,
        target: &Glob,
        command: Command,
        attributes: Map<String, Value>,
    );
}

/// A command as seen by device adapters
#[derive(Debug, Clone)]
pub struct DeviceCommandEvent {
    pub target: Glob,
    pub command: Command,
    pub attributes: Map<String, Value>,
}

impl DeviceCommandEvent {
    /// Whether this command addresses the given device
    pub fn targets(&self, device_id: &str) -> bool {
        self.target.is_match(device_id)
    }
}

/// Dispatcher that rebroadcasts every command to subscribed adapters
pub struct CommandBus {
    tx: broadcast::Sender<DeviceCommandEvent>,
}

impl CommandBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceCommandEvent> {
        self.tx.subscribe()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDispatcher for CommandBus {
    fn invoke_device_command(
        &self,
        target: &Glob,
        command: Command,
        attributes: Map<String, Value>,
    ) {
        debug!(pattern = %target, command = %command, "Dispatching device command");
        let event = DeviceCommandEvent {
            target: target.clone(),
            command,
            attributes,
        };
        // Without subscribed adapters nothing can act on the command
        if self.tx.send(event).is_err() {
            debug!(pattern = %target, command = %command, "No device adapter for command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceState, DeviceType};

    #[tokio::test]
    async fn test_fan_out_reaches_all_subscribers() {
        let fan_out = FanOut::new();
        let mut a = fan_out.subscribe_device_updates();
        let mut b = fan_out.subscribe_device_updates();

        let update = DeviceUpdate::new("light.a", DeviceType::Light, "A", DeviceState::new());
        assert_eq!(fan_out.publish(update), 2);
        assert_eq!(a.recv().await.unwrap().id.as_str(), "light.a");
        assert_eq!(b.recv().await.unwrap().id.as_str(), "light.a");
    }

    #[test]
    fn test_fan_out_without_subscribers() {
        let fan_out = FanOut::new();
        let update = DeviceUpdate::new("light.a", DeviceType::Light, "A", DeviceState::new());
        assert_eq!(fan_out.publish(update), 0);
    }

    #[test]
    fn test_command_bus_without_adapters() {
        let bus = CommandBus::new();
        let glob = Glob::compile("light.*").unwrap();
        bus.invoke_device_command(&glob, Command::Off, Map::new());

        // A later subscriber does not see earlier commands
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_command_bus_rebroadcasts() {
        let bus = CommandBus::new();
        let mut rx = bus.subscribe();
        let glob = Glob::compile("light.*").unwrap();

        bus.invoke_device_command(&glob, Command::On, Map::new());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.command, Command::On);
        assert!(event.targets("light.kitchen"));
        assert!(!event.targets("vacuum.main"));
    }
}
