//! Gateway identity.
//!
//! A [`Gateway`] describes one remote bus controller: where to reach it,
//! how to authenticate, and the metadata discovery reported about it. It
//! is constructed once from a [`GatewayDescriptor`] and shared by
//! reference with every session opened against it.
//!
//! Only two fields are legitimately mutable after construction - the
//! password and the address, both of which interactive setup may fill in
//! late - and both mutate through explicit methods rather than aliased
//! property setters.

use crate::discovery::GatewayDescriptor;

/// Default OpenWebNet gateway port.
pub const DEFAULT_PORT: u16 = 20000;

/// Manufacturer reported by gateways that omit the UPnP field.
const DEFAULT_MANUFACTURER: &str = "BTicino S.p.A.";

/// Identity of one remote OpenWebNet gateway.
#[derive(Debug, Clone)]
pub struct Gateway {
    address: String,
    port: u16,
    password: Option<String>,
    serial: Option<String>,
    model_name: String,
    firmware: Option<String>,
    manufacturer: String,
    // Discovery provenance, kept for device registry hand-off.
    ssdp_location: Option<String>,
    ssdp_st: Option<String>,
    device_type: Option<String>,
    friendly_name: Option<String>,
    manufacturer_url: Option<String>,
    udn: Option<String>,
    log_id: String,
}

impl Gateway {
    /// Build a gateway from a discovery descriptor.
    pub fn new(descriptor: GatewayDescriptor) -> Self {
        let address = descriptor.address_or_ssdp_host().unwrap_or_default();
        let model_name = descriptor
            .model_name
            .unwrap_or_else(|| "Unknown model".to_string());
        let log_id = derive_log_id(&model_name, &address);
        Self {
            address,
            port: descriptor.port.unwrap_or(DEFAULT_PORT),
            password: descriptor.password,
            serial: descriptor.serial,
            model_name,
            firmware: descriptor.model_number,
            manufacturer: descriptor
                .manufacturer
                .unwrap_or_else(|| DEFAULT_MANUFACTURER.to_string()),
            ssdp_location: descriptor.ssdp_location,
            ssdp_st: descriptor.ssdp_st,
            device_type: descriptor.device_type,
            friendly_name: descriptor.friendly_name,
            manufacturer_url: descriptor.manufacturer_url,
            udn: descriptor.udn,
            log_id,
        }
    }

    /// Network address of the gateway.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// TCP port of the gateway.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `address:port` pair for socket connects.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Configured OPEN password, if any.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Serial number / unique id, when discovery reported one.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Model name, `"Unknown model"` when discovery omitted it.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Firmware revision (UPnP model number), when reported.
    pub fn firmware(&self) -> Option<&str> {
        self.firmware.as_deref()
    }

    /// Manufacturer name.
    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    /// SSDP location URL from discovery, when present.
    pub fn ssdp_location(&self) -> Option<&str> {
        self.ssdp_location.as_deref()
    }

    /// SSDP search target from discovery, when present.
    pub fn ssdp_st(&self) -> Option<&str> {
        self.ssdp_st.as_deref()
    }

    /// UPnP device type, when present.
    pub fn device_type(&self) -> Option<&str> {
        self.device_type.as_deref()
    }

    /// UPnP friendly name, when present.
    pub fn friendly_name(&self) -> Option<&str> {
        self.friendly_name.as_deref()
    }

    /// UPnP manufacturer URL, when present.
    pub fn manufacturer_url(&self) -> Option<&str> {
        self.manufacturer_url.as_deref()
    }

    /// UPnP unique device name, when present.
    pub fn udn(&self) -> Option<&str> {
        self.udn.as_deref()
    }

    /// Human-readable tag attached to every log line about this gateway.
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    /// Set or replace the OPEN password during interactive setup.
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(password.into());
    }

    /// Replace the address during interactive setup; the log tag follows.
    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = address.into();
        self.log_id = derive_log_id(&self.model_name, &self.address);
    }
}

fn derive_log_id(model_name: &str, address: &str) -> String {
    format!("[{model_name} gateway - {address}]")
}
