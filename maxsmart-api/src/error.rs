use crate::Command;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use transport::TransportError;

/// Classification of every failure the dispatcher can report
///
/// The first four kinds describe a link that might work on the next attempt
/// and are retried. The rest are final: the device answered and said no, the
/// answer made no sense, or the protocol cannot carry the request at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No reply within the per-attempt deadline
    Timeout,

    /// The device refused the connection
    ConnectionRefused,

    /// The device address could not be routed
    NetworkUnreachable,

    /// Host name resolution failed
    DnsFailure,

    /// The reply was empty, not JSON, not an object, or missing fields
    ///
    /// A protocol violation means the device is speaking something we do not
    /// understand; retrying would produce the same bytes.
    ProtocolViolation,

    /// The device understood the request and rejected it
    ///
    /// Raised for HTTP replies carrying a `code` other than 200, for HTTP
    /// error statuses, and for UDP V3 replies with code 400.
    DeviceRejected,

    /// The command has no wire id on the session's protocol
    UnsupportedOnProtocol,

    /// Anything else, including UDP V3 replies with an unknown code
    Unexpected,
}

impl ErrorKind {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::ConnectionRefused
                | ErrorKind::NetworkUnreachable
                | ErrorKind::DnsFailure
        )
    }

    /// Stable identifier, suitable as a lookup key for message catalogs
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::NetworkUnreachable => "network_unreachable",
            ErrorKind::DnsFailure => "dns_failure",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::DeviceRejected => "device_rejected",
            ErrorKind::UnsupportedOnProtocol => "unsupported_on_protocol",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TransportError> for ErrorKind {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::ConnectionRefused(_) => ErrorKind::ConnectionRefused,
            TransportError::NetworkUnreachable(_) => ErrorKind::NetworkUnreachable,
            TransportError::DnsFailure(_) => ErrorKind::DnsFailure,
            TransportError::Status(_) => ErrorKind::DeviceRejected,
            TransportError::EmptyBody => ErrorKind::ProtocolViolation,
            TransportError::Io(_) => ErrorKind::Unexpected,
        }
    }
}

/// A classified command failure
#[derive(Debug, Clone, Error)]
#[error("{kind} from {ip}{}: {detail}", .command.map(|c| format!(" during {}", c)).unwrap_or_default())]
pub struct CommandError {
    pub kind: ErrorKind,
    pub ip: IpAddr,
    pub command: Option<Command>,
    pub detail: String,
}

impl CommandError {
    pub fn new(kind: ErrorKind, ip: IpAddr, detail: impl Into<String>) -> Self {
        Self {
            kind,
            ip,
            command: None,
            detail: detail.into(),
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    pub fn from_transport(ip: IpAddr, error: &TransportError) -> Self {
        Self::new(ErrorKind::from(error), ip, error.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    #[test]
    fn test_retryable_split() {
        let retryable = [
            ErrorKind::Timeout,
            ErrorKind::ConnectionRefused,
            ErrorKind::NetworkUnreachable,
            ErrorKind::DnsFailure,
        ];
        let terminal = [
            ErrorKind::ProtocolViolation,
            ErrorKind::DeviceRejected,
            ErrorKind::UnsupportedOnProtocol,
            ErrorKind::Unexpected,
        ];
        assert!(retryable.iter().all(|k| k.is_retryable()));
        assert!(terminal.iter().all(|k| !k.is_retryable()));
    }

    #[test]
    fn test_transport_mapping() {
        let cases = [
            (TransportError::Timeout(Duration::from_secs(1)), ErrorKind::Timeout),
            (TransportError::ConnectionRefused("x".into()), ErrorKind::ConnectionRefused),
            (TransportError::NetworkUnreachable("x".into()), ErrorKind::NetworkUnreachable),
            (TransportError::DnsFailure("x".into()), ErrorKind::DnsFailure),
            (TransportError::Status(500), ErrorKind::DeviceRejected),
            (TransportError::EmptyBody, ErrorKind::ProtocolViolation),
            (TransportError::Io("x".into()), ErrorKind::Unexpected),
        ];
        for (error, kind) in cases {
            assert_eq!(CommandError::from_transport(IP, &error).kind, kind);
        }
    }

    #[test]
    fn test_error_display() {
        let error = CommandError::new(ErrorKind::DeviceRejected, IP, "code 400");
        assert_eq!(error.to_string(), "device_rejected from 10.0.0.7: code 400");

        let error = error.with_command(Command::SetPortName);
        assert_eq!(
            error.to_string(),
            "device_rejected from 10.0.0.7 during set_port_name: code 400"
        );
    }
}
