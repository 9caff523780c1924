//! Watt unit detection

use maxsmart_api::{ResponseRecord, WattUnit};
use serde_json::Value;

/// Decide how a device encodes watts
///
/// Uses the `watt` array of a live read-state sample when there is one and
/// falls back to the firmware table otherwise.
pub fn detect_unit(sample: Option<&ResponseRecord>, firmware_version: &str) -> WattUnit {
    sample
        .and_then(|record| record.field("watt"))
        .and_then(Value::as_array)
        .and_then(|watts| WattUnit::infer_from_list(watts))
        .unwrap_or_else(|| WattUnit::for_firmware(firmware_version))
}
