//! Response shapes shared by both protocols

use crate::{CommandError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;

/// Protocol-agnostic reply to a dispatched command
///
/// HTTP replies map directly. UDP V3 replies drop their `response` echo and
/// keep `code` and `data`, so callers never need to know which link was used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Device status code; a successful dispatch always reports 200
    pub code: Option<i64>,
    /// Command specific payload, empty when the device sent none
    pub data: Map<String, Value>,
}

impl ResponseRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// Read a status code that may arrive as a number or a numeric string
pub(crate) fn status_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Encoding of the numeric watt values a device reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WattUnit {
    Watts,
    Milliwatts,
}

impl WattUnit {
    pub fn multiplier(self) -> f64 {
        match self {
            WattUnit::Watts => 1.0,
            WattUnit::Milliwatts => 0.001,
        }
    }

    /// Infer the encoding from one sampled watt value
    ///
    /// Decimal strings are already watts. Numbers above 100 are milliwatts.
    /// Returns `None` for values that carry no information (null, bool, etc).
    pub fn infer(sample: &Value) -> Option<WattUnit> {
        match sample {
            Value::String(s) if s.trim().parse::<f64>().is_ok() => Some(WattUnit::Watts),
            Value::Number(n) => {
                let magnitude = n.as_f64()?.abs();
                if magnitude > 100.0 {
                    Some(WattUnit::Milliwatts)
                } else {
                    Some(WattUnit::Watts)
                }
            }
            _ => None,
        }
    }

    /// Infer the encoding from a full `watt` array
    ///
    /// Any decimal string means watts. Otherwise the largest magnitude decides,
    /// so a single idle port reporting 0 cannot hide a milliwatt device.
    pub fn infer_from_list(samples: &[Value]) -> Option<WattUnit> {
        if samples.iter().any(|v| matches!(v, Value::String(_))) {
            return samples
                .iter()
                .find(|v| matches!(v, Value::String(_)))
                .and_then(WattUnit::infer);
        }

        samples
            .iter()
            .filter(|v| v.is_number())
            .max_by(|a, b| {
                let a = a.as_f64().map(f64::abs).unwrap_or(0.0);
                let b = b.as_f64().map(f64::abs).unwrap_or(0.0);
                a.total_cmp(&b)
            })
            .and_then(WattUnit::infer)
    }

    /// Firmware fallback used when sampling live data failed
    pub fn for_firmware(version: &str) -> WattUnit {
        match version.trim() {
            "1.30" => WattUnit::Milliwatts,
            _ => WattUnit::Watts,
        }
    }

    /// Convert one raw value to watts
    ///
    /// Strings are parsed as watts as-is; numbers are scaled. Unparseable
    /// values yield `None`.
    pub fn to_watts(self, raw: &Value) -> Option<f64> {
        let watts = match raw {
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            Value::Number(n) => match self {
                WattUnit::Watts => n.as_f64()?,
                WattUnit::Milliwatts => n.as_f64()? / 1000.0,
            },
            _ => return None,
        };
        Some(watts.max(0.0))
    }
}

/// Switch states and live consumption for every port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// 1 = on, 0 = off, index 0 is port 1
    pub switch_states: Vec<u8>,
    /// Watts, index 0 is port 1
    pub watt_values: Vec<f64>,
}

impl DeviceState {
    /// Build from a read-state reply
    pub fn from_record(record: &ResponseRecord, unit: WattUnit, ip: IpAddr) -> Result<Self, CommandError> {
        let violation = |detail: String| CommandError::new(ErrorKind::ProtocolViolation, ip, detail);

        let switches = record
            .field("switch")
            .and_then(Value::as_array)
            .ok_or_else(|| violation("read-state reply has no switch array".into()))?;
        let watts = record
            .field("watt")
            .and_then(Value::as_array)
            .ok_or_else(|| violation("read-state reply has no watt array".into()))?;

        let switch_states = switches
            .iter()
            .map(|v| match v {
                Value::Number(n) => n.as_u64().map(|s| u8::from(s != 0)),
                Value::Bool(b) => Some(u8::from(*b)),
                Value::String(s) => s.trim().parse::<u64>().ok().map(|s| u8::from(s != 0)),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| violation(format!("unreadable switch states: {:?}", switches)))?;

        let watt_values = watts
            .iter()
            .map(|v| unit.to_watts(v))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| violation(format!("unreadable watt values: {:?}", watts)))?;

        Ok(Self {
            switch_states,
            watt_values,
        })
    }

    /// State of a 1-based port
    pub fn port_state(&self, port: u8) -> Option<u8> {
        let index = usize::from(port).checked_sub(1)?;
        self.switch_states.get(index).copied()
    }

    pub fn port_watts(&self, port: u8) -> Option<f64> {
        let index = usize::from(port).checked_sub(1)?;
        self.watt_values.get(index).copied()
    }
}

/// Hardware identifiers returned by the read-identifiers command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareIds {
    pub mac_address: Option<String>,
    pub device_access_key: Option<String>,
    pub cpu_id: Option<String>,
    pub cloud_server: Option<String>,
}

impl HardwareIds {
    pub fn from_record(record: &ResponseRecord, ip: IpAddr) -> Result<Self, CommandError> {
        let text = |key: &str| {
            record
                .field(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let ids = Self {
            mac_address: text("pclmac"),
            device_access_key: text("pcldak"),
            cpu_id: text("cpuid"),
            cloud_server: text("server").or_else(|| text("cloud")),
        };

        if ids == Self::default() {
            return Err(CommandError::new(
                ErrorKind::ProtocolViolation,
                ip,
                "read-identifiers reply carries no identifiers",
            ));
        }
        Ok(ids)
    }

    /// Most stable identifier available, falling back to the address
    ///
    /// Priority: CPU id, MAC address, device access key, IP address.
    pub fn unique_identifier(&self, ip: IpAddr) -> String {
        if let Some(cpu) = &self.cpu_id {
            return format!("cpu_{}", cpu);
        }
        if let Some(mac) = &self.mac_address {
            return format!("mac_{}", mac.replace(':', "").to_ascii_lowercase());
        }
        if let Some(dak) = &self.device_access_key {
            return format!("dak_{}", dak);
        }
        format!("ip_{}", ip.to_string().replace(['.', ':'], "_"))
    }
}
