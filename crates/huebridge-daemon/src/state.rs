//! Application state management

use anyhow::Result;
use huebridge_core::{BridgeProfile, ClusterBus, CommandBus, FanOut, LocalBus, Settings};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::master::MasterCoordinator;
use crate::virtual_device::VirtualDevices;
use crate::worker::WorkerGateway;

/// How long shutdown waits for the bus loops to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Shared state of the Hue API handlers
pub struct AppState {
    pub worker: Arc<WorkerGateway>,
    pub profile: Arc<BridgeProfile>,
}

impl AppState {
    pub fn new(worker: Arc<WorkerGateway>, profile: Arc<BridgeProfile>) -> Arc<Self> {
        Arc::new(Self { worker, profile })
    }
}

/// Everything one emulator process runs, wired over a shared bus
pub struct Node {
    pub settings: Arc<Settings>,
    pub profile: Arc<BridgeProfile>,
    pub bus: Arc<LocalBus>,
    pub master: Option<Arc<MasterCoordinator>>,
    pub worker: Option<Arc<WorkerGateway>>,
    loops: Vec<JoinHandle<()>>,
    adapters: Vec<JoinHandle<()>>,
}

impl Node {
    /// Build and start the components for the configured role.
    ///
    /// The master subscribes before the worker so the worker's resync request
    /// is answered.
    pub async fn start(config: &Config) -> Result<Self> {
        let role = config.daemon.role;
        let settings = Arc::new(config.to_settings()?);
        let profile = Arc::new(config.to_profile(&settings));
        let bus = Arc::new(LocalBus::new());
        let fan_out = Arc::new(FanOut::new());
        let commands = Arc::new(CommandBus::new());
        let cluster: Arc<dyn ClusterBus> = bus.clone();

        let mut loops = Vec::new();
        let mut adapters = Vec::new();

        let master = if role.runs_master() {
            let master =
                MasterCoordinator::new(settings.clone(), cluster.clone(), commands.clone());
            loops.push(master.start(&fan_out)?);
            Some(master)
        } else {
            None
        };

        let worker = if role.runs_worker() {
            let worker = WorkerGateway::new(profile.clone(), cluster.clone());
            loops.push(worker.start()?);
            Some(worker)
        } else {
            None
        };

        if !config.virtual_devices.is_empty() {
            if master.is_some() {
                let devices = VirtualDevices::new(&config.virtual_devices, fan_out.clone());
                adapters.push(devices.start(&commands));
                devices.announce().await;
            } else {
                warn!(
                    devices = config.virtual_devices.len(),
                    "Virtual devices need the master role, ignoring them"
                );
            }
        }

        info!(
            role = ?role,
            advertised = %settings.advertised_address(),
            "Emulator node started"
        );

        Ok(Self {
            settings,
            profile,
            bus,
            master,
            worker,
            loops,
            adapters,
        })
    }

    /// State for the Hue API, present when this node runs a worker
    pub fn app_state(&self) -> Option<Arc<AppState>> {
        self.worker
            .clone()
            .map(|worker| AppState::new(worker, self.profile.clone()))
    }

    /// Close the bus and wait for the master and worker loops to finish
    pub async fn shutdown(self) {
        self.bus.close();
        for handle in self.adapters {
            handle.abort();
        }
        for handle in self.loops {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Bus loop did not stop in time");
            }
        }
        info!("Emulator node stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Role, VirtualDeviceConfig};
    use huebridge_core::{stable_id, DeviceType};
    use serde_json::{json, Value};
    use tokio::time::sleep;

    fn standalone_config() -> Config {
        let mut config = Config::default();
        config.virtual_devices = vec![VirtualDeviceConfig {
            id: "light.kitchen".to_string(),
            device_type: DeviceType::Light,
            name: Some("Kitchen".to_string()),
            state: match json!({"on": true, "brightness": 80}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        }];
        config
    }

    async fn wait_for_light(worker: &WorkerGateway, light_id: &str) {
        for _ in 0..100 {
            if worker.light(light_id).await.is_some() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("light {} never reached the worker", light_id);
    }

    #[tokio::test]
    async fn test_standalone_node_mirrors_virtual_device() {
        let node = Node::start(&standalone_config()).await.unwrap();
        let worker = node.worker.clone().unwrap();

        let light_id = stable_id("light.kitchen");
        wait_for_light(&worker, &light_id).await;
        let light = worker.light(&light_id).await.unwrap();
        assert_eq!(light.name, "Kitchen");
        assert_eq!(light.state.bri, 203);

        let app = node.app_state().unwrap();
        assert!(Arc::ptr_eq(&app.profile, &node.profile));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_master_only_node_has_no_api() {
        let mut config = Config::default();
        config.daemon.role = Role::Master;
        let node = Node::start(&config).await.unwrap();

        assert!(node.master.is_some());
        assert!(node.worker.is_none());
        assert!(node.app_state().is_none());
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let mut config = Config::default();
        config.emulator.advertised_address = "localhost".to_string();
        assert!(Node::start(&config).await.is_err());
    }
}
