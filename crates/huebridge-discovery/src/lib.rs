//! huebridge discovery - UPnP/SSDP presence of the emulated bridge
//!
//! This crate provides:
//! - An SSDP responder answering M-SEARCH for the UPnP basic device
//! - The UPnP XML descriptor the SSDP reply points at

pub mod descriptor;
pub mod ssdp;

use std::net::SocketAddr;
use thiserror::Error;

pub use descriptor::setup_xml;
pub use ssdp::{search_response, SsdpRequest, SsdpResponder};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to bind SSDP socket on {0}: {1}")]
    Bind(SocketAddr, #[source] std::io::Error),
    #[error("SSDP socket error: {0}")]
    Socket(#[source] std::io::Error),
    #[error("failed to list network interfaces: {0}")]
    Interfaces(String),
    #[error("no available multicast interfaces")]
    NoMulticastInterfaces,
    #[error("failed to render UPnP descriptor: {0}")]
    Descriptor(String),
}
