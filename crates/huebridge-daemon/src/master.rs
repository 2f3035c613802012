//! Master coordinator
//!
//! Consumes the device hub's fan-out, keeps the authoritative registry of
//! emulated devices and publishes merged state to the workers. Commands
//! coming back from workers are handed to the hub's dispatcher.

use huebridge_core::{
    property, publish_json, BusError, ClusterBus, CommandAttributes, CommandDispatcher,
    DeviceCommandMessage, DeviceId, DeviceUpdate, DeviceUpdateMessage, FanOut, Glob, Settings,
    COMMANDS_CHANNEL, UPDATES_CHANNEL,
};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

#[derive(Default)]
struct Registry {
    devices: HashMap<DeviceId, DeviceUpdateMessage>,
    /// Devices rejected by the filters, never evaluated again
    unsupported: HashSet<DeviceId>,
}

#[derive(Default)]
struct Counters {
    filter_evaluations: AtomicU64,
    published: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the coordinator counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterStats {
    pub devices: usize,
    pub unsupported: usize,
    pub filter_evaluations: u64,
    pub published: u64,
    pub dispatched: u64,
    pub dropped: u64,
}

pub struct MasterCoordinator {
    settings: Arc<Settings>,
    bus: Arc<dyn ClusterBus>,
    dispatcher: Arc<dyn CommandDispatcher>,
    registry: Mutex<Registry>,
    counters: Counters,
}

impl MasterCoordinator {
    pub fn new(
        settings: Arc<Settings>,
        bus: Arc<dyn ClusterBus>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            bus,
            dispatcher,
            registry: Mutex::new(Registry::default()),
            counters: Counters::default(),
        })
    }

    /// Subscribe to the fan-out and the commands channel and start handling
    /// both. The task ends when the commands channel closes.
    pub fn start(self: &Arc<Self>, fan_out: &FanOut) -> Result<JoinHandle<()>, BusError> {
        let updates = fan_out.subscribe_device_updates();
        let commands = self.bus.subscribe(COMMANDS_CHANNEL)?;
        info!(
            filters = self.settings.filters().len(),
            types = ?self.settings.types(),
            "Master coordinator started"
        );
        Ok(tokio::spawn(Arc::clone(self).run(updates, commands)))
    }

    async fn run(
        self: Arc<Self>,
        mut updates: broadcast::Receiver<DeviceUpdate>,
        mut commands: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let mut updates_open = true;
        loop {
            tokio::select! {
                update = updates.recv(), if updates_open => match update {
                    Ok(update) => {
                        let this = Arc::clone(&self);
                        tokio::spawn(async move {
                            this.on_device_update(update).await;
                        });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Master fell behind the device fan-out");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Device fan-out closed");
                        updates_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(payload) => {
                        let this = Arc::clone(&self);
                        tokio::spawn(async move {
                            this.on_worker_command(&payload).await;
                        });
                    }
                    None => break,
                },
            }
        }
        info!("Master coordinator stopped");
    }

    /// Handle one update from the fan-out.
    ///
    /// Returns true when merged state was published to the workers.
    pub async fn on_device_update(&self, update: DeviceUpdate) -> bool {
        let merged = {
            let mut registry = self.registry.lock().await;
            self.merge(&mut registry, update)
        };

        match merged {
            Some(entry) => self.publish_update(&entry),
            None => false,
        }
    }

    fn merge(&self, registry: &mut Registry, update: DeviceUpdate) -> Option<DeviceUpdateMessage> {
        if registry.unsupported.contains(&update.id) {
            return None;
        }

        if !registry.devices.contains_key(&update.id) {
            self.counters.filter_evaluations.fetch_add(1, Ordering::Relaxed);
            if !self.settings.accepts(&update.id, update.device_type) {
                debug!(
                    device = %update.id,
                    device_type = %update.device_type,
                    "Device not emulated"
                );
                registry.unsupported.insert(update.id);
                return None;
            }

            let name = self.settings.display_name(&update.id, &update.name).to_string();
            info!(device = %update.id, name = %name, "Emulating device");
            registry.devices.insert(
                update.id.clone(),
                DeviceUpdateMessage::new(update.id.clone(), update.device_type, name),
            );
        }

        let entry = registry.devices.get_mut(&update.id)?;
        let mut changed = false;
        for (key, value) in update.state {
            if !property::is_merged(&key) || entry.state.get(&key) == Some(&value) {
                continue;
            }
            entry.state.insert(key, value);
            changed = true;
        }

        changed.then(|| entry.clone())
    }

    fn publish_update(&self, entry: &DeviceUpdateMessage) -> bool {
        match publish_json(self.bus.as_ref(), UPDATES_CHANNEL, entry) {
            Ok(receivers) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                trace!(device = %entry.device_id, receivers, "Published device state");
                true
            }
            Err(e) => {
                error!(device = %entry.device_id, error = %e, "Failed to publish device state");
                false
            }
        }
    }

    /// Handle one raw message from the commands channel
    pub async fn on_worker_command(&self, payload: &[u8]) {
        let message: DeviceCommandMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Received corrupted message from worker");
                return;
            }
        };

        if message.is_discovery {
            let entries: Vec<DeviceUpdateMessage> =
                self.registry.lock().await.devices.values().cloned().collect();
            info!(devices = entries.len(), "Worker requested a full resync");
            for entry in &entries {
                self.publish_update(entry);
            }
            return;
        }

        let Some(command) = message.command else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(pattern = %message.device_id, "Worker message carries no command");
            return;
        };

        let target = match Glob::compile(&message.device_id) {
            Ok(target) => target,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                error!(pattern = %message.device_id, error = %e, "Invalid command target");
                return;
            }
        };

        let attributes = match flatten_attributes(message.attributes.as_ref()) {
            Ok(attributes) => attributes,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Failed to convert command attributes");
                return;
            }
        };

        debug!(pattern = %target, command = %command, "Forwarding worker command");
        self.dispatcher.invoke_device_command(&target, command, attributes);
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(test)]
    /// Current registry entry for a device
    pub async fn entry(&self, device_id: &str) -> Option<DeviceUpdateMessage> {
        self.registry
            .lock()
            .await
            .devices
            .get(&DeviceId::from(device_id))
            .cloned()
    }

    pub async fn stats(&self) -> MasterStats {
        let registry = self.registry.lock().await;
        MasterStats {
            devices: registry.devices.len(),
            unsupported: registry.unsupported.len(),
            filter_evaluations: self.counters.filter_evaluations.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Attributes as the plain object the dispatcher expects, `{}` when absent
fn flatten_attributes(
    attributes: Option<&CommandAttributes>,
) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(attributes)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}
