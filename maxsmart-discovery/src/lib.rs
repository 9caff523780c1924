//! MaxSmart device discovery library
//!
//! This crate finds MaxSmart / Revogi power strips on a local network. A
//! single handshake datagram (`00sw=all,{YYYY-MM-DD,HH:MM:SS};`) is sent to
//! UDP port 8888, either broadcast or to one address, and every JSON reply
//! becomes a [`DeviceDescriptor`].
//!
//! # Quick Start
//!
//! ```no_run
//! use maxsmart_discovery::{discover, DiscoveryOptions};
//!
//! # async fn run() -> Result<(), maxsmart_discovery::DiscoveryError> {
//! let devices = discover(&DiscoveryOptions::default()).await?;
//! for device in devices {
//!     println!("Found {} at {} (fw {})", device.name, device.ip_address, device.firmware_version);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Looking up one device
//!
//! ```no_run
//! use maxsmart_discovery::find_device;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), maxsmart_discovery::DiscoveryError> {
//! let device = find_device("192.168.1.20".parse().unwrap(), Duration::from_secs(3)).await?;
//! println!("{} has {} ports", device.serial, device.port_labels.len());
//! # Ok(())
//! # }
//! ```
//!
//! Unicast discovery stops at the first valid reply. Broadcast discovery
//! listens until the timeout. Replies are not deduplicated. A reply that is
//! not JSON aborts the whole call with [`DiscoveryError::ProtocolViolation`].

mod error;
mod handshake;
pub mod device;
mod discovery;

pub use device::{
    default_port_labels, is_serial_reliable, DeviceDescriptor, PrimaryIdKind, DEFAULT_STRIP_NAME,
    MAX_PORTS,
};
pub use error::{DiscoveryError, Result};
pub use handshake::LEGACY_DISCOVERY_MESSAGE;

use std::net::IpAddr;
use std::time::Duration;

/// UDP port devices listen on for the handshake
pub const DISCOVERY_PORT: u16 = 8888;

/// Options for a discovery run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Specific device to ask; `None` broadcasts to 255.255.255.255
    pub target: Option<IpAddr>,
    /// How long to wait for replies
    pub timeout: Duration,
    /// Destination port for the handshake (and UDP V3 enhancement)
    pub port: u16,
    /// Query every device for MAC / CPU id after discovery
    pub enhance_with_hardware_ids: bool,
    /// Deadline for each hardware identifier query
    pub enhance_timeout: Duration,
    /// HTTP port used for hardware identifier queries
    pub http_port: u16,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            target: None,
            timeout: Duration::from_secs(2),
            port: DISCOVERY_PORT,
            enhance_with_hardware_ids: false,
            enhance_timeout: Duration::from_secs(3),
            http_port: 80,
        }
    }
}

impl DiscoveryOptions {
    /// Broadcast discovery with the given timeout
    pub fn broadcast(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Unicast discovery of one address
    pub fn unicast(ip: IpAddr, timeout: Duration) -> Self {
        Self {
            target: Some(ip),
            timeout,
            ..Self::default()
        }
    }

    pub fn with_hardware_ids(mut self, enabled: bool) -> Self {
        self.enhance_with_hardware_ids = enabled;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }
}

/// Run discovery and return every device that answered
///
/// An empty list means nobody answered in time.
pub async fn discover(options: &DiscoveryOptions) -> Result<Vec<DeviceDescriptor>> {
    discovery::collect(options).await
}

/// Discover a single device by address
///
/// Fails with [`DiscoveryError::NoDevicesFound`] when the device stays silent.
pub async fn find_device(ip: IpAddr, timeout: Duration) -> Result<DeviceDescriptor> {
    find_device_with(&DiscoveryOptions::unicast(ip, timeout)).await
}

/// Like [`find_device`] with full control over the options
pub async fn find_device_with(options: &DiscoveryOptions) -> Result<DeviceDescriptor> {
    discover(options)
        .await?
        .into_iter()
        .next()
        .ok_or(DiscoveryError::NoDevicesFound(options.target))
}
