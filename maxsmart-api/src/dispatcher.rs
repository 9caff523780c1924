use crate::response::status_code;
use crate::{Command, CommandError, ErrorKind, Protocol, ResponseRecord, Result, RetryPolicy};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use transport::{codec, DatagramTransport, HttpTransport, Transport};

const SUCCESS: i64 = 200;
const REJECTED: i64 = 400;

/// Per-protocol timeouts and retry policies
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Per-attempt deadline for HTTP exchanges
    pub http_timeout: Duration,
    /// Per-attempt deadline for UDP V3 exchanges
    pub udp_timeout: Duration,
    pub http_retry: RetryPolicy,
    pub udp_retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            udp_timeout: Duration::from_secs(5),
            http_retry: RetryPolicy::http(),
            udp_retry: RetryPolicy::datagram(),
        }
    }
}

impl DispatchConfig {
    pub fn timeout_for(&self, protocol: Protocol) -> Duration {
        match protocol {
            Protocol::Http => self.http_timeout,
            Protocol::UdpV3 => self.udp_timeout,
        }
    }

    pub fn retry_for(&self, protocol: Protocol) -> RetryPolicy {
        match protocol {
            Protocol::Http => self.http_retry,
            Protocol::UdpV3 => self.udp_retry,
        }
    }
}

/// Per-call overrides of the configured timeout and retry count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// One attempt, no retries
    pub fn single_attempt() -> Self {
        Self::default().with_retries(0)
    }
}

/// Sends logical commands to one device over its protocol
///
/// The dispatcher owns its transport. Dropping it releases the transport.
pub struct Dispatcher {
    ip: IpAddr,
    protocol: Protocol,
    serial: String,
    transport: Arc<dyn Transport>,
    config: DispatchConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("ip", &self.ip)
            .field("protocol", &self.protocol)
            .field("serial", &self.serial)
            .field("config", &self.config)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with the stock transport for `protocol`
    pub fn new(ip: IpAddr, protocol: Protocol, serial: impl Into<String>) -> Self {
        Self::with_config(ip, protocol, serial, DispatchConfig::default())
    }

    pub fn with_config(
        ip: IpAddr,
        protocol: Protocol,
        serial: impl Into<String>,
        config: DispatchConfig,
    ) -> Self {
        let transport: Arc<dyn Transport> = match protocol {
            Protocol::Http => Arc::new(HttpTransport::new()),
            Protocol::UdpV3 => Arc::new(DatagramTransport::new()),
        };
        Self::with_transport(ip, protocol, serial, transport, config)
    }

    /// Create a dispatcher over a caller supplied transport
    pub fn with_transport(
        ip: IpAddr,
        protocol: Protocol,
        serial: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            ip,
            protocol,
            serial: serial.into(),
            transport,
            config,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Send a command and return the normalized reply
    ///
    /// Commands the protocol cannot carry fail immediately with
    /// [`ErrorKind::UnsupportedOnProtocol`]. Retryable failures are retried
    /// per the protocol's [`RetryPolicy`]; the last error is returned once
    /// attempts run out.
    pub async fn dispatch(
        &self,
        command: Command,
        params: Map<String, Value>,
        options: CallOptions,
    ) -> Result<ResponseRecord> {
        let wire_id = command.wire_id(self.protocol).ok_or_else(|| {
            CommandError::new(
                ErrorKind::UnsupportedOnProtocol,
                self.ip,
                format!("{} is not available over {}", command, self.protocol),
            )
            .with_command(command)
        })?;

        let payload = match self.protocol {
            Protocol::Http => codec::encode_http_query(wire_id, &params).into_bytes(),
            Protocol::UdpV3 => codec::encode_v3_envelope(&self.serial, wire_id, &params),
        };

        let timeout = options
            .timeout
            .unwrap_or_else(|| self.config.timeout_for(self.protocol));
        let mut policy = self.config.retry_for(self.protocol);
        if let Some(retries) = options.retries {
            policy = policy.with_max_retries(retries);
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(ip = %self.ip, %command, wire_id, attempt, "dispatching");

            match self.attempt(&payload, timeout).await {
                Ok(record) => return Ok(record),
                Err(error) if error.is_retryable() && attempt <= policy.max_retries => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        ip = %self.ip,
                        %command,
                        attempt,
                        kind = %error.kind,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error.with_command(command)),
            }
        }
    }

    async fn attempt(&self, payload: &[u8], timeout: Duration) -> Result<ResponseRecord> {
        let reply = self
            .transport
            .exchange(self.ip, payload, timeout)
            .await
            .map_err(|e| CommandError::from_transport(self.ip, &e))?;

        let object = codec::decode_json_object(&reply).map_err(|failure| {
            CommandError::new(ErrorKind::ProtocolViolation, self.ip, failure.to_string())
        })?;

        match self.protocol {
            Protocol::Http => self.normalize_http(object),
            Protocol::UdpV3 => self.normalize_datagram(object),
        }
    }

    fn normalize_http(&self, mut object: Map<String, Value>) -> Result<ResponseRecord> {
        let code = match object.get("code") {
            Some(value) => Some(status_code(value).ok_or_else(|| {
                CommandError::new(
                    ErrorKind::ProtocolViolation,
                    self.ip,
                    format!("unreadable status code {}", value),
                )
            })?),
            None => None,
        };

        if let Some(code) = code {
            if code != SUCCESS {
                return Err(CommandError::new(
                    ErrorKind::DeviceRejected,
                    self.ip,
                    format!("device answered with code {}", code),
                ));
            }
        }

        // A bare success body carries no code; report it the way V3 does
        Ok(ResponseRecord {
            code: Some(code.unwrap_or(SUCCESS)),
            data: self.take_data(&mut object)?,
        })
    }

    fn normalize_datagram(&self, mut object: Map<String, Value>) -> Result<ResponseRecord> {
        match object.get("code").and_then(status_code) {
            Some(SUCCESS) => Ok(ResponseRecord {
                code: Some(SUCCESS),
                data: self.take_data(&mut object)?,
            }),
            Some(REJECTED) => Err(CommandError::new(
                ErrorKind::DeviceRejected,
                self.ip,
                "device answered with code 400",
            )),
            other => Err(CommandError::new(
                ErrorKind::Unexpected,
                self.ip,
                format!("unexpected V3 reply code {:?}", other),
            )),
        }
    }

    fn take_data(&self, object: &mut Map<String, Value>) -> Result<Map<String, Value>> {
        match object.remove("data") {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(data)) => Ok(data),
            Some(other) => Err(CommandError::new(
                ErrorKind::ProtocolViolation,
                self.ip,
                format!("data is not an object: {}", other),
            )),
        }
    }
}
