//! Identity the emulated bridge presents to Hue clients
//!
//! Clients auto-detect a bridge by these exact strings, so the defaults mirror
//! a first-generation Philips bridge. Built once at startup and shared by the
//! SSDP responder and the HTTP API.

use std::net::{Ipv4Addr, SocketAddrV4};
use uuid::Uuid;

/// SSDP multicast group
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
/// SSDP port
pub const SSDP_PORT: u16 = 1900;
/// Default bridge UUID advertised in USN/UDN
pub const DEFAULT_BRIDGE_UUID: Uuid = Uuid::from_u128(0xf6543a06_800d_48ba_8d8f_bc2949eddc33);

/// Bridge identity and protocol constants
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeProfile {
    /// Address advertised in SSDP `Location` and descriptor `URLBase`
    pub advertised_address: SocketAddrV4,
    pub multicast_group: SocketAddrV4,
    /// Search target answered by the responder
    pub search_target: String,
    pub uuid: Uuid,
    /// Device type in the UPnP descriptor
    pub descriptor_device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub model_number: String,
    pub ssdp_max_age_secs: u32,
    pub light: LightIdentity,
}

/// Fixed fields reported for every emulated light
#[derive(Debug, Clone, PartialEq)]
pub struct LightIdentity {
    pub kind: String,
    pub model_id: String,
    pub manufacturer_name: String,
    pub sw_version: String,
}

impl Default for LightIdentity {
    fn default() -> Self {
        Self {
            kind: "Extended color light".to_string(),
            model_id: "LCT001".to_string(),
            manufacturer_name: "Philips".to_string(),
            sw_version: "65003148".to_string(),
        }
    }
}

impl BridgeProfile {
    pub fn new(advertised_address: SocketAddrV4) -> Self {
        Self {
            advertised_address,
            multicast_group: SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT),
            search_target: "urn:schemas-upnp-org:device:basic:1".to_string(),
            uuid: DEFAULT_BRIDGE_UUID,
            descriptor_device_type: "urn:schemas-upnp-org:device:Basic:1".to_string(),
            friendly_name: "huebridge".to_string(),
            manufacturer: "Royal Philips Electronics".to_string(),
            model_name: "Philips hue bridge 2012".to_string(),
            model_number: "929000226503".to_string(),
            ssdp_max_age_secs: 300,
            light: LightIdentity::default(),
        }
    }

    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = name.into();
        self
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    /// `uuid:<uuid>` as used in USN and UDN
    pub fn usn(&self) -> String {
        format!("uuid:{}", self.uuid)
    }

    /// Descriptor URL advertised over SSDP
    pub fn location(&self) -> String {
        format!("http://{}/upnp/setup.xml", self.advertised_address)
    }

    pub fn url_base(&self) -> String {
        format!("http://{}/", self.advertised_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_follow_advertised_address() {
        let profile = BridgeProfile::new("10.0.0.5:8080".parse().unwrap());
        assert_eq!(profile.location(), "http://10.0.0.5:8080/upnp/setup.xml");
        assert_eq!(profile.url_base(), "http://10.0.0.5:8080/");
    }

    #[test]
    fn test_default_uuid() {
        let profile = BridgeProfile::new("10.0.0.5:80".parse().unwrap());
        assert_eq!(profile.usn(), "uuid:f6543a06-800d-48ba-8d8f-bc2949eddc33");
        assert_eq!(profile.multicast_group.to_string(), "239.255.255.250:1900");
    }
}
