use crate::config::ConfigError;
use maxsmart_api::{CommandError, ErrorKind};
use maxsmart_discovery::DiscoveryError;
use maxsmart_polling::PollingError;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Polling error: {0}")]
    Polling(#[from] PollingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The device accepted a switch command but never reported the new state
    #[error("Port {port} did not reach state {expected} after {attempts} checks")]
    StateNotConverged { port: u8, expected: u8, attempts: u32 },

    #[error("Invalid port {0}, expected 0-6")]
    InvalidPort(u8),

    #[error("Invalid port name: {0}")]
    InvalidName(String),

    #[error("Session for {0} is not initialized")]
    NotInitialized(IpAddr),
}

impl SdkError {
    /// Dispatcher classification, when the failure came from a device exchange
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SdkError::Command(e) => Some(e.kind),
            SdkError::Polling(PollingError::Source(e)) => Some(e.kind),
            _ => None,
        }
    }

    pub fn command_error(&self) -> Option<&CommandError> {
        match self {
            SdkError::Command(e) => Some(e),
            SdkError::Polling(PollingError::Source(e)) => Some(e),
            _ => None,
        }
    }
}
