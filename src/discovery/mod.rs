//! Gateway discovery collaborator boundary.
//!
//! The crate never parses SSDP/UPnP traffic itself. An embedding
//! application implements [`Discovery`] (typically over an SSDP library)
//! and hands back [`GatewayDescriptor`] candidates; the core only
//! consumes those to seed a [`Gateway`](crate::gateway::Gateway).

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One candidate gateway reported by network discovery.
///
/// Everything is optional: a manually configured gateway may carry only
/// an address and port, while an SSDP hit fills in the UPnP description
/// fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayDescriptor {
    /// Network address, when known.
    pub address: Option<String>,
    /// TCP port, when known.
    pub port: Option<u16>,
    /// OPEN password supplied by the user.
    pub password: Option<String>,
    /// Serial number / unique id.
    pub serial: Option<String>,
    /// Model name from the UPnP device description.
    pub model_name: Option<String>,
    /// Model number (firmware revision).
    pub model_number: Option<String>,
    /// Manufacturer name.
    pub manufacturer: Option<String>,
    /// Manufacturer URL.
    pub manufacturer_url: Option<String>,
    /// SSDP location URL the device announced.
    pub ssdp_location: Option<String>,
    /// SSDP search target that matched.
    pub ssdp_st: Option<String>,
    /// UPnP device type.
    pub device_type: Option<String>,
    /// UPnP friendly name.
    pub friendly_name: Option<String>,
    /// UPnP unique device name.
    pub udn: Option<String>,
}

impl GatewayDescriptor {
    /// The address, falling back to the host of the SSDP location URL
    /// when the address itself was not announced.
    pub fn address_or_ssdp_host(&self) -> Option<String> {
        if let Some(address) = &self.address {
            return Some(address.clone());
        }
        self.ssdp_location.as_deref().and_then(host_of_url)
    }
}

/// Extract the host portion of an http URL without a full URL parser.
fn host_of_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?']).next()?;
    let host = authority.rsplit_once(':').map_or(authority, |(h, port)| {
        if port.bytes().all(|b| b.is_ascii_digit()) {
            h
        } else {
            authority
        }
    });
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Produces candidate gateways found on the local network.
pub trait Discovery: Send + Sync {
    /// Run one discovery pass and return every candidate found.
    fn discover(&self) -> Pin<Box<dyn Future<Output = Result<Vec<GatewayDescriptor>>> + Send + '_>>;
}
