use crate::{CommandError, ErrorKind};

/// Turns classified errors into human readable text
///
/// The engine only ever reasons about [`ErrorKind`]. Applications that need
/// localized or branded messages provide their own implementation.
pub trait ErrorFormatter: Send + Sync {
    fn describe(&self, kind: ErrorKind, detail: &str) -> String;

    fn describe_error(&self, error: &CommandError) -> String {
        self.describe(error.kind, &error.detail)
    }
}

/// Plain English messages
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormatter;

impl ErrorFormatter for PlainFormatter {
    fn describe(&self, kind: ErrorKind, detail: &str) -> String {
        let headline = match kind {
            ErrorKind::Timeout => "The device did not answer in time",
            ErrorKind::ConnectionRefused => "The device refused the connection",
            ErrorKind::NetworkUnreachable => "The device cannot be reached on this network",
            ErrorKind::DnsFailure => "The device address could not be resolved",
            ErrorKind::ProtocolViolation => "The device sent a reply that could not be understood",
            ErrorKind::DeviceRejected => "The device rejected the command",
            ErrorKind::UnsupportedOnProtocol => "This device firmware does not support the command",
            ErrorKind::Unexpected => "An unexpected error occurred",
        };

        if detail.is_empty() {
            headline.to_string()
        } else {
            format!("{} ({})", headline, detail)
        }
    }
}
