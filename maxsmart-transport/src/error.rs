//! Error types for the transports

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while exchanging a payload with a device
#[derive(Debug, Error)]
pub enum TransportError {
    /// No reply arrived within the per-attempt deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The device actively refused the connection or datagram
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The device address could not be routed
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// Host name resolution failed
    #[error("name resolution failed: {0}")]
    DnsFailure(String),

    /// The HTTP server answered with a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// The device replied with zero bytes
    #[error("empty response body")]
    EmptyBody,

    /// Any other I/O or client failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Classify a socket error by its kind, falling back to the OS message
    pub fn from_io(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                Self::Timeout(Duration::ZERO)
            }
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                Self::ConnectionRefused(error.to_string())
            }
            _ => Self::from_message(error.to_string()),
        }
    }

    pub(crate) fn from_message(message: String) -> Self {
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("unreachable") || lowered.contains("no route to host") {
            Self::NetworkUnreachable(message)
        } else if lowered.contains("dns error") || lowered.contains("failed to lookup address") {
            Self::DnsFailure(message)
        } else if lowered.contains("connection refused") {
            Self::ConnectionRefused(message)
        } else {
            Self::Io(message)
        }
    }

    /// Classify a reqwest failure by walking its source chain
    pub fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            return Self::Timeout(timeout);
        }

        let mut source = std::error::Error::source(&error);
        while let Some(inner) = source {
            if let Some(io_error) = inner.downcast_ref::<io::Error>() {
                match Self::from_io(io_error) {
                    Self::Io(_) => {}
                    Self::Timeout(_) => return Self::Timeout(timeout),
                    classified => return classified,
                }
            }
            source = inner.source();
        }

        let mut message = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }

        match Self::from_message(message) {
            Self::Io(message) if error.is_connect() => Self::NetworkUnreachable(message),
            classified => classified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_io_classification() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(TransportError::from_io(&refused), TransportError::ConnectionRefused(_)));

        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert!(matches!(TransportError::from_io(&timed_out), TransportError::Timeout(_)));

        let unreachable = io::Error::new(io::ErrorKind::Other, "Network is unreachable (os error 101)");
        assert!(matches!(TransportError::from_io(&unreachable), TransportError::NetworkUnreachable(_)));

        let other = io::Error::new(io::ErrorKind::Other, "disk on fire");
        assert!(matches!(TransportError::from_io(&other), TransportError::Io(_)));
    }

    #[rstest]
    #[case("dns error: failed to lookup address information", "dns")]
    #[case("No route to host (os error 113)", "unreachable")]
    #[case("Network is unreachable", "unreachable")]
    #[case("Connection refused (os error 111)", "refused")]
    #[case("broken pipe", "io")]
    fn test_message_classification(#[case] message: &str, #[case] expected: &str) {
        let kind = match TransportError::from_message(message.to_string()) {
            TransportError::DnsFailure(_) => "dns",
            TransportError::NetworkUnreachable(_) => "unreachable",
            TransportError::ConnectionRefused(_) => "refused",
            _ => "io",
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(TransportError::Status(404).to_string(), "HTTP status 404");
        assert_eq!(TransportError::EmptyBody.to_string(), "empty response body");
        assert_eq!(
            TransportError::Timeout(Duration::from_secs(5)).to_string(),
            "timed out after 5s"
        );
    }
}
