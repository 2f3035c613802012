//! UPnP device descriptor served at `/upnp/setup.xml`

use huebridge_core::BridgeProfile;
use quick_xml::se::to_string;
use serde::Serialize;

use crate::DiscoveryError;

const UPNP_DEVICE_NAMESPACE: &str = "urn:schemas-upnp-org:device-1-0";

#[derive(Debug, Serialize)]
#[serde(rename = "root")]
struct Root<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'a str,
    #[serde(rename = "specVersion")]
    spec_version: SpecVersion,
    #[serde(rename = "URLBase")]
    url_base: String,
    device: Device<'a>,
}

#[derive(Debug, Serialize)]
struct SpecVersion {
    major: u32,
    minor: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Device<'a> {
    device_type: &'a str,
    friendly_name: &'a str,
    manufacturer: &'a str,
    model_name: &'a str,
    model_number: &'a str,
    #[serde(rename = "UDN")]
    udn: String,
}

/// Render the descriptor for this bridge
pub fn setup_xml(profile: &BridgeProfile) -> Result<String, DiscoveryError> {
    let root = Root {
        xmlns: UPNP_DEVICE_NAMESPACE,
        spec_version: SpecVersion { major: 1, minor: 0 },
        url_base: profile.url_base(),
        device: Device {
            device_type: &profile.descriptor_device_type,
            friendly_name: &profile.friendly_name,
            manufacturer: &profile.manufacturer,
            model_name: &profile.model_name,
            model_number: &profile.model_number,
            udn: profile.usn(),
        },
    };

    let xml = to_string(&root).map_err(|e| DiscoveryError::Descriptor(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n", xml))
}
