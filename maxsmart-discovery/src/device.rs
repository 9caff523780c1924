//! Discovered device descriptors

use maxsmart_api::{HardwareIds, Protocol};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Name used for port 0 when the device reports none
pub const DEFAULT_STRIP_NAME: &str = "Strip";

/// Number of switchable ports on the multi-port models
pub const MAX_PORTS: usize = 6;

/// Which identifier [`DeviceDescriptor::primary_id`] picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryIdKind {
    Serial,
    CpuId,
}

/// Everything learned about one device during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Serial number from the discovery reply (may be garbled on some firmware)
    pub serial: String,
    /// Strip name
    pub name: String,
    /// Port names, index 0 is port 1
    pub port_labels: Vec<String>,
    pub firmware_version: String,
    /// Address the reply came from
    pub ip_address: IpAddr,
    /// Protocol implied by the firmware version
    pub protocol: Protocol,
    pub mac_address: Option<String>,
    pub cpu_id: Option<String>,
    pub cloud_server: Option<String>,
    /// Whether `serial` looks like a real serial number
    pub serial_reliable: bool,
    /// Whether the hardware identifiers came from a successful read-identifiers exchange
    pub hardware_ids_verified: bool,
}

impl DeviceDescriptor {
    /// Strip label for port 0
    pub fn strip_label(&self) -> &str {
        if self.name.is_empty() {
            DEFAULT_STRIP_NAME
        } else {
            &self.name
        }
    }

    /// Most stable identifier for this device
    ///
    /// Prefers the CPU id, then the MAC address; falls back to the address.
    pub fn unique_id(&self) -> String {
        self.hardware_ids().unique_identifier(self.ip_address)
    }

    /// Identifier to key the device by, with the kind that was chosen
    ///
    /// The discovery serial wins unless it is unreliable and the device
    /// reported a CPU id.
    pub fn primary_id(&self) -> (&str, PrimaryIdKind) {
        match self.cpu_id.as_deref() {
            Some(cpu_id) if !self.serial_reliable && !cpu_id.is_empty() => {
                (cpu_id, PrimaryIdKind::CpuId)
            }
            _ => (&self.serial, PrimaryIdKind::Serial),
        }
    }

    pub fn hardware_ids(&self) -> HardwareIds {
        HardwareIds {
            mac_address: self.mac_address.clone(),
            device_access_key: None,
            cpu_id: self.cpu_id.clone(),
            cloud_server: self.cloud_server.clone(),
        }
    }

    /// Merge identifiers obtained from the device itself
    pub(crate) fn apply_hardware_ids(&mut self, ids: HardwareIds) {
        self.mac_address = ids.mac_address.or(self.mac_address.take());
        self.cpu_id = ids.cpu_id.or(self.cpu_id.take());
        self.cloud_server = ids.cloud_server.or(self.cloud_server.take());
        self.hardware_ids_verified = true;
    }
}

/// Check whether a serial number from a discovery reply is usable
///
/// Some firmware answers with truncated or binary garbage in `sn`.
pub fn is_serial_reliable(serial: &str) -> bool {
    !serial.trim().is_empty()
        && serial.chars().count() > 3
        && serial.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
}

/// Port labels to use when the device did not report `pname`
///
/// The fourth serial character encodes the port count: `1` for the single
/// socket model, anything else is treated as a six port strip.
pub fn default_port_labels(serial: &str, name: &str) -> Vec<String> {
    if serial.chars().nth(3) == Some('1') {
        let label = if name.is_empty() { "Port 1" } else { name };
        return vec![label.to_string()];
    }
    (1..=MAX_PORTS).map(|i| format!("Port {}", i)).collect()
}
