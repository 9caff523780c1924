//! Wire encoding shared by both transports
//!
//! The HTTP protocol carries a command id plus an optional URL-encoded JSON
//! parameter object in the query string. The UDP V3 protocol prefixes a compact
//! JSON object with the literal tag `V3`. Replies on both links are JSON objects.

use serde_json::{Map, Value};
use thiserror::Error;
use url::form_urlencoded;

/// Tag that opens every UDP V3 request
pub const V3_TAG: &str = "V3";

/// Build the query string for an HTTP command, without the leading `?`
///
/// Empty parameter objects are omitted entirely, matching what the device
/// firmware expects for read commands.
pub fn encode_http_query(command_id: u16, params: &Map<String, Value>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("cmd", &command_id.to_string());
    if !params.is_empty() {
        serializer.append_pair("json", &Value::Object(params.clone()).to_string());
    }
    serializer.finish()
}

/// Build a UDP V3 request: `V3{"sn":...,"cmd":...,<params>}`
pub fn encode_v3_envelope(serial: &str, command_id: u16, params: &Map<String, Value>) -> Vec<u8> {
    let mut body = Map::with_capacity(params.len() + 2);
    body.insert("sn".to_string(), Value::String(serial.to_string()));
    body.insert("cmd".to_string(), Value::from(command_id));
    for (key, value) in params {
        body.insert(key.clone(), value.clone());
    }

    let mut payload = V3_TAG.as_bytes().to_vec();
    payload.extend_from_slice(Value::Object(body).to_string().as_bytes());
    payload
}

/// Why a reply could not be turned into a JSON object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    #[error("empty payload")]
    Empty,
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("payload is not JSON: {0}")]
    NotJson(String),
    #[error("payload is not a JSON object")]
    NotObject,
}

/// Decode a reply into a JSON object
pub fn decode_json_object(bytes: &[u8]) -> Result<Map<String, Value>, DecodeFailure> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeFailure::NotUtf8)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeFailure::Empty);
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DecodeFailure::NotObject),
        Err(e) => Err(DecodeFailure::NotJson(e.to_string())),
    }
}
