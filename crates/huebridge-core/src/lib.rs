//! huebridge core - device model, stable IDs and Hue protocol translation
//!
//! This crate provides the building blocks shared by the master and worker
//! halves of the Hue bridge emulator:
//! - Generic device model as exchanged with the device hub
//! - Stable light ID hashing and device ID glob filters
//! - Cluster bus contracts and wire messages
//! - Validated settings and the bridge identity profile
//! - Pure translation between the device model and the Hue v1 API

pub mod bus;
pub mod device;
pub mod glob;
pub mod hash;
pub mod hub;
pub mod hue;
pub mod message;
pub mod profile;
pub mod settings;

pub use bus::{publish_json, BusError, ClusterBus, LocalBus, COMMANDS_CHANNEL, UPDATES_CHANNEL};
pub use device::{
    property, Command, CommandAttributes, DeviceId, DeviceState, DeviceType, DeviceUpdate,
};
pub use glob::{Glob, GlobError};
pub use hash::stable_id;
pub use hub::{CommandBus, CommandDispatcher, DeviceCommandEvent, FanOut};
pub use hue::{Light, LightsList, StateRequest, SuccessEntry};
pub use message::{DeviceCommandMessage, DeviceUpdateMessage};
pub use profile::{BridgeProfile, LightIdentity};
pub use settings::{Settings, SettingsError};
