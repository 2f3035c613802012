//! Worker gateway
//!
//! Mirrors the master's registry from the updates channel and serves it to
//! Hue clients. State changes requested by clients become device commands on
//! the commands channel; the worker never touches devices itself.

use huebridge_core::hue::{self, light_object, state_commands, success_envelope};
use huebridge_core::{
    publish_json, stable_id, BridgeProfile, BusError, ClusterBus, DeviceCommandMessage, DeviceId,
    DeviceUpdateMessage, Light, LightsList, StateRequest, SuccessEntry, COMMANDS_CHANNEL,
    UPDATES_CHANNEL,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A mirrored device and the Hue light ID it is exposed under
#[derive(Debug, Clone)]
pub struct WorkerEntry {
    pub light_id: String,
    pub device: DeviceUpdateMessage,
}

pub struct WorkerGateway {
    profile: Arc<BridgeProfile>,
    bus: Arc<dyn ClusterBus>,
    registry: RwLock<HashMap<DeviceId, WorkerEntry>>,
}

impl WorkerGateway {
    pub fn new(profile: Arc<BridgeProfile>, bus: Arc<dyn ClusterBus>) -> Arc<Self> {
        Arc::new(Self {
            profile,
            bus,
            registry: RwLock::new(HashMap::new()),
        })
    }

    /// Subscribe to master updates, then ask the master for a full resync
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, BusError> {
        let updates = self.bus.subscribe(UPDATES_CHANNEL)?;
        let handle = tokio::spawn(Arc::clone(self).run(updates));

        publish_json(
            self.bus.as_ref(),
            COMMANDS_CHANNEL,
            &DeviceCommandMessage::discovery(),
        )?;
        info!(address = %self.profile.advertised_address, "Worker gateway started");
        Ok(handle)
    }

    async fn run(self: Arc<Self>, mut updates: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(payload) = updates.recv().await {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.on_master_update(&payload).await;
            });
        }
        info!("Worker gateway stopped");
    }

    /// Apply one message from the updates channel.
    ///
    /// The entry is replaced wholesale; the light ID is computed on first
    /// sight and kept afterwards.
    pub async fn on_master_update(&self, payload: &[u8]) -> bool {
        let device: DeviceUpdateMessage = match serde_json::from_slice(payload) {
            Ok(device) => device,
            Err(e) => {
                error!(error = %e, "Received corrupted message from master");
                return false;
            }
        };

        let mut registry = self.registry.write().await;
        match registry.get_mut(&device.device_id) {
            Some(entry) => entry.device = device,
            None => {
                let light_id = stable_id(device.device_id.as_str());
                debug!(device = %device.device_id, light_id = %light_id, "New light");
                registry.insert(device.device_id.clone(), WorkerEntry { light_id, device });
            }
        }
        true
    }

    /// Every mirrored device as a Hue light, keyed by light ID
    pub async fn lights(&self) -> LightsList {
        let registry = self.registry.read().await;
        let lights = registry
            .values()
            .map(|entry| {
                (
                    entry.light_id.clone(),
                    light_object(&entry.device, &self.profile.light),
                )
            })
            .collect();
        LightsList { lights }
    }

    pub async fn light(&self, light_id: &str) -> Option<Light> {
        self.find(light_id)
            .await
            .map(|entry| light_object(&entry.device, &self.profile.light))
    }

    /// Translate a Hue state change into device commands.
    ///
    /// Returns `None` for an unknown light. Commands are published on the
    /// commands channel and the success envelope is returned right away.
    pub async fn set_state(
        &self,
        light_id: &str,
        request: &StateRequest,
    ) -> Option<Vec<SuccessEntry>> {
        let entry = self.find(light_id).await?;

        for command in state_commands(&entry.device.device_id, entry.device.device_type, request) {
            if let Err(e) = publish_json(self.bus.as_ref(), COMMANDS_CHANNEL, &command) {
                warn!(light_id, error = %e, "Failed to publish device command");
            }
        }

        debug!(
            light_id,
            device = %entry.device.device_id,
            on = ?request.on,
            bri = ?request.bri.map(hue::hue_to_percent),
            "Requested light state change"
        );
        Some(success_envelope(light_id, request))
    }

    #[cfg(test)]
    pub async fn entry(&self, device_id: &str) -> Option<WorkerEntry> {
        self.registry
            .read()
            .await
            .get(&DeviceId::from(device_id))
            .cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.registry.read().await.len()
    }

    async fn find(&self, light_id: &str) -> Option<WorkerEntry> {
        self.registry
            .read()
            .await
            .values()
            .find(|entry| entry.light_id == light_id)
            .cloned()
    }
}
