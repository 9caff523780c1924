//! Discovery handshake encoding and reply parsing
//!
//! This module is internal; the public surface is [`crate::discover`].

use crate::device::{default_port_labels, is_serial_reliable, DeviceDescriptor};
use chrono::NaiveDateTime;
use maxsmart_api::Protocol;
use serde_json::Value;
use std::net::IpAddr;

/// Handshake template, `{}` receives the timestamp
pub(crate) const DISCOVERY_MESSAGE: &str = "00sw=all,{};";

/// Older handshake still answered by first generation firmware
pub const LEGACY_DISCOVERY_MESSAGE: &str = "00dv=all,{};";

/// Build the handshake for the given local time
pub(crate) fn discovery_message(now: NaiveDateTime) -> String {
    DISCOVERY_MESSAGE.replace("{}", &now.format("%Y-%m-%d,%H:%M:%S").to_string())
}

/// Parse one inbound datagram
///
/// Returns `Ok(None)` for valid JSON that carries no device record, and
/// `Err` with a description for anything that is not JSON at all.
pub(crate) fn parse_reply(bytes: &[u8], from: IpAddr) -> Result<Option<DeviceDescriptor>, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))?;
    let document: Value = serde_json::from_str(text.trim()).map_err(|e| e.to_string())?;

    let data = match document.get("data").and_then(Value::as_object) {
        Some(data) if !data.is_empty() => data,
        _ => return Ok(None),
    };

    let text_field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    };
    let optional_field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let serial = text_field("sn");
    let name = text_field("name");
    let firmware_version = text_field("ver");

    let port_labels: Vec<String> = data
        .get("pname")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .map(|n| n.as_str().map(str::to_string).unwrap_or_default())
                .collect()
        })
        .filter(|names: &Vec<String>| !names.is_empty())
        .unwrap_or_else(|| default_port_labels(&serial, &name));

    Ok(Some(DeviceDescriptor {
        serial_reliable: is_serial_reliable(&serial),
        protocol: Protocol::for_firmware(&firmware_version),
        serial,
        name,
        port_labels,
        firmware_version,
        ip_address: from,
        mac_address: optional_field("mac"),
        cpu_id: optional_field("cpuid"),
        cloud_server: optional_field("server"),
        hardware_ids_verified: false,
    }))
}
