//! Private transports for MaxSmart power strip communication
//!
//! This crate moves raw payloads between the engine and a device. It knows
//! nothing about commands or retries: one call is one exchange with one
//! deadline. Classification of low level failures into timeouts, refused
//! connections, unreachable networks and resolution failures happens here so
//! the layers above can decide what is worth retrying.

pub mod codec;
mod datagram;
mod error;
mod http;

pub use datagram::DatagramTransport;
pub use error::TransportError;
pub use http::HttpTransport;

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// UDP port used by discovery and the V3 protocol
pub const DEVICE_UDP_PORT: u16 = 8888;

/// Default HTTP port of the device web server
pub const DEVICE_HTTP_PORT: u16 = 80;

/// A single request/reply exchange with a device
///
/// For [`HttpTransport`] the payload is the query string (see
/// [`codec::encode_http_query`]); for [`DatagramTransport`] it is the full
/// datagram (see [`codec::encode_v3_envelope`]). The returned bytes are the
/// raw reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(
        &self,
        ip: IpAddr,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}
