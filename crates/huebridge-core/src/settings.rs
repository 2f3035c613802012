//! Validated emulator settings

use std::collections::HashMap;
use std::net::SocketAddrV4;
use thiserror::Error;

use crate::device::{DeviceId, DeviceType};
use crate::glob::{Glob, GlobError};

/// Filter used when no device filter is configured
pub const MATCH_ALL_FILTER: &str = "**";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("advertised address {0:?} must be an IPv4 host:port")]
    InvalidAdvertisedAddress(String),
    #[error("invalid device filter: {0}")]
    InvalidFilter(#[from] GlobError),
}

/// Immutable emulator settings, built once at startup
#[derive(Debug, Clone)]
pub struct Settings {
    advertised_address: SocketAddrV4,
    filters: Vec<Glob>,
    types: Vec<DeviceType>,
    name_overrides: HashMap<String, String>,
}

impl Settings {
    /// Validate raw settings.
    ///
    /// An empty filter list matches every device. Unsupported device types are
    /// dropped, and an empty type list means every supported type.
    pub fn new(
        advertised_address: &str,
        filters: &[String],
        types: &[DeviceType],
        name_overrides: HashMap<String, String>,
    ) -> Result<Self, SettingsError> {
        let advertised_address: SocketAddrV4 = advertised_address
            .parse()
            .map_err(|_| SettingsError::InvalidAdvertisedAddress(advertised_address.to_string()))?;

        let filters = if filters.is_empty() {
            vec![Glob::compile(MATCH_ALL_FILTER)?]
        } else {
            filters
                .iter()
                .map(|f| Glob::compile(f))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut supported: Vec<DeviceType> = Vec::new();
        for t in types.iter().copied().filter(|t| t.is_supported()) {
            if !supported.contains(&t) {
                supported.push(t);
            }
        }
        if supported.is_empty() {
            supported = DeviceType::SUPPORTED.to_vec();
        }

        Ok(Self {
            advertised_address,
            filters,
            types: supported,
            name_overrides,
        })
    }

    pub fn advertised_address(&self) -> SocketAddrV4 {
        self.advertised_address
    }

    pub fn filters(&self) -> &[Glob] {
        &self.filters
    }

    pub fn types(&self) -> &[DeviceType] {
        &self.types
    }

    /// Whether a device qualifies for emulation: type allow-listed and ID
    /// matching at least one filter
    pub fn accepts(&self, device_id: &DeviceId, device_type: DeviceType) -> bool {
        self.types.contains(&device_type)
            && self.filters.iter().any(|f| f.is_match(device_id.as_str()))
    }

    /// Configured display name, falling back to the reported one
    pub fn display_name<'a>(&'a self, device_id: &DeviceId, reported: &'a str) -> &'a str {
        self.name_overrides
            .get(device_id.as_str())
            .map(String::as_str)
            .unwrap_or(reported)
    }
}
