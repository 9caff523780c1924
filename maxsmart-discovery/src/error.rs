//! Error types for the discovery system.

use std::fmt;
use std::net::IpAddr;

/// Error type for discovery operations.
///
/// An empty result is not an error for [`crate::discover`]; callers that expect
/// a device use [`crate::find_device`], which reports [`DiscoveryError::NoDevicesFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Socket creation or sending the handshake failed
    NetworkError(String),
    /// A device answered with something that is not a JSON document
    ProtocolViolation { from: IpAddr, detail: String },
    /// Nothing answered before the deadline
    NoDevicesFound(Option<IpAddr>),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DiscoveryError::ProtocolViolation { from, detail } => {
                write!(f, "Malformed discovery reply from {}: {}", from, detail)
            }
            DiscoveryError::NoDevicesFound(Some(ip)) => write!(f, "No device answered at {}", ip),
            DiscoveryError::NoDevicesFound(None) => write!(f, "No devices found"),
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
