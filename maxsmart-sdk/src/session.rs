//! DeviceSession - one initialized connection to one strip

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use maxsmart_api::{
    CallOptions, Command, DatagramTransport, DeviceState, Dispatcher, ErrorFormatter, HardwareIds,
    HttpTransport, PlainFormatter, Protocol, ResponseRecord, Transport, WattUnit,
};
use maxsmart_discovery::{DeviceDescriptor, DiscoveryOptions, DEFAULT_STRIP_NAME};
use maxsmart_polling::{
    ChangeDetector, ChangeEvent, DispatchStateSource, PollObserver, PollSnapshot, PollingEngine,
    PollingStats, PortNames,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::units::detect_unit;
use crate::{SdkError, SessionConfig};

/// Highest port number; port 0 addresses the whole strip
pub const MAX_PORT: u8 = 6;

/// Longest name the device stores for a port
pub const MAX_PORT_NAME_LENGTH: usize = 21;

/// Outcome of [`DeviceSession::health_check`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub response_time: Duration,
    pub error: Option<String>,
    pub ip: IpAddr,
    pub name: String,
    pub firmware_version: String,
}

#[derive(Debug, Clone)]
struct PortLabels {
    strip: String,
    ports: Vec<String>,
}

/// Resources that exist only between `initialize` and `close`
struct Connection {
    descriptor: DeviceDescriptor,
    dispatcher: Arc<Dispatcher>,
    unit: WattUnit,
    polling: PollingEngine,
    labels: Arc<Mutex<PortLabels>>,
}

/// Control and monitoring of one MaxSmart strip
///
/// A session is created for an address, then [`initialize`](Self::initialize)d:
/// the device is discovered, its protocol probed and its watt encoding
/// detected. Every other operation needs an initialized session and fails
/// with [`SdkError::NotInitialized`] otherwise.
///
/// # Example
///
/// ```rust,no_run
/// use maxsmart_sdk::{DeviceSession, SessionConfig};
///
/// # async fn run() -> Result<(), maxsmart_sdk::SdkError> {
/// let mut session = DeviceSession::new("192.168.1.20".parse().unwrap(), SessionConfig::default());
/// session.initialize().await?;
///
/// session.turn_on(3).await?;
/// let state = session.read_state().await?;
/// println!("port 3 draws {:.1} W", state.port_watts(3).unwrap_or(0.0));
///
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct DeviceSession {
    ip: IpAddr,
    config: SessionConfig,
    formatter: Arc<dyn ErrorFormatter>,
    connection: Option<Connection>,
}

impl DeviceSession {
    pub fn new(ip: IpAddr, config: SessionConfig) -> Self {
        Self {
            ip,
            config,
            formatter: Arc::new(PlainFormatter),
            connection: None,
        }
    }

    /// Replace the formatter used by [`describe_error`](Self::describe_error)
    pub fn with_formatter(mut self, formatter: Arc<dyn ErrorFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.connection.is_some()
    }

    /// What discovery reported, once initialized
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.connection.as_ref().map(|c| &c.descriptor)
    }

    /// Protocol selected during initialization
    pub fn protocol(&self) -> Option<Protocol> {
        self.connection.as_ref().map(|c| c.dispatcher.protocol())
    }

    pub fn watt_unit(&self) -> Option<WattUnit> {
        self.connection.as_ref().map(|c| c.unit)
    }

    /// Discover the device, select its protocol and detect its watt unit
    ///
    /// Any previous connection is closed first, so a session never holds
    /// two transports.
    pub async fn initialize(&mut self) -> Result<(), SdkError> {
        self.config.validate()?;
        self.close().await?;

        let options = DiscoveryOptions::unicast(self.ip, self.config.discovery_timeout)
            .with_port(self.config.discovery_port);
        let descriptor = maxsmart_discovery::find_device_with(&options).await?;
        debug!(
            ip = %self.ip,
            serial = %descriptor.serial,
            firmware = %descriptor.firmware_version,
            "device discovered"
        );

        let (dispatcher, sample) = self.select_protocol(&descriptor).await;
        let unit = detect_unit(sample.as_ref(), &descriptor.firmware_version);

        let source = DispatchStateSource::new(Arc::clone(&dispatcher), unit);
        let polling = PollingEngine::new(Arc::new(source), self.config.polling.clone())?;

        let labels = PortLabels {
            strip: descriptor.strip_label().to_string(),
            ports: descriptor.port_labels.clone(),
        };

        info!(
            ip = %self.ip,
            name = %descriptor.name,
            firmware = %descriptor.firmware_version,
            protocol = %dispatcher.protocol(),
            unit = ?unit,
            "session initialized"
        );

        self.connection = Some(Connection {
            descriptor,
            dispatcher,
            unit,
            polling,
            labels: Arc::new(Mutex::new(labels)),
        });
        Ok(())
    }

    /// Stop polling and release the transport; no-op when not initialized
    pub async fn close(&mut self) -> Result<(), SdkError> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };

        let stopped = connection.polling.stop().await;
        drop(connection);
        debug!(ip = %self.ip, "session closed");

        stopped.map_err(SdkError::from)
    }

    /// Probe candidate protocols with a read-state call, first success wins
    ///
    /// When every probe fails the first candidate is kept and no sample is
    /// returned.
    async fn select_protocol(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> (Arc<Dispatcher>, Option<ResponseRecord>) {
        let candidates = match self.config.protocol {
            Some(protocol) => vec![protocol],
            None => vec![descriptor.protocol, descriptor.protocol.alternate()],
        };

        let probe = CallOptions::single_attempt().with_timeout(self.config.probe_timeout);
        for protocol in &candidates {
            let dispatcher = self.dispatcher_for(*protocol, &descriptor.serial);
            match dispatcher.dispatch(Command::ReadState, Map::new(), probe).await {
                Ok(record) => return (dispatcher, Some(record)),
                Err(e) => debug!(ip = %self.ip, %protocol, kind = %e.kind, "protocol probe failed"),
            }
        }

        warn!(
            ip = %self.ip,
            protocol = %candidates[0],
            "no protocol answered the probe, using firmware defaults"
        );
        (self.dispatcher_for(candidates[0], &descriptor.serial), None)
    }

    fn dispatcher_for(&self, protocol: Protocol, serial: &str) -> Arc<Dispatcher> {
        let transport: Arc<dyn Transport> = match protocol {
            Protocol::Http => Arc::new(HttpTransport::with_port(self.config.http_port)),
            Protocol::UdpV3 => Arc::new(DatagramTransport::with_port(self.config.udp_port)),
        };
        Arc::new(Dispatcher::with_transport(
            self.ip,
            protocol,
            serial,
            transport,
            self.config.dispatch.clone(),
        ))
    }

    fn connection(&self) -> Result<&Connection, SdkError> {
        self.connection
            .as_ref()
            .ok_or(SdkError::NotInitialized(self.ip))
    }

    // ========================================================================
    // Port control
    // ========================================================================

    /// Switch a port on and wait until the device reports it on
    ///
    /// Port 0 switches every port.
    pub async fn turn_on(&self, port: u8) -> Result<(), SdkError> {
        self.set_port(port, 1).await
    }

    /// Switch a port off and wait until the device reports it off
    pub async fn turn_off(&self, port: u8) -> Result<(), SdkError> {
        self.set_port(port, 0).await
    }

    async fn set_port(&self, port: u8, state: u8) -> Result<(), SdkError> {
        if port > MAX_PORT {
            return Err(SdkError::InvalidPort(port));
        }
        let connection = self.connection()?;

        let mut params = Map::new();
        params.insert("port".to_string(), json!(port));
        params.insert("state".to_string(), json!(state));
        connection
            .dispatcher
            .dispatch(Command::SetPortState, params, CallOptions::default())
            .await?;
        connection.polling.trigger_burst();

        let attempts = self.config.verify_attempts;
        for attempt in 1..=attempts {
            let current = read_state_from(connection).await?;
            if has_converged(&current, port, state) {
                debug!(ip = %self.ip, port, state, attempt, "port state verified");
                return Ok(());
            }

            debug!(ip = %self.ip, port, state, attempt, "port state not reported yet");
            if attempt < attempts && !self.config.verify_delay.is_zero() {
                tokio::time::sleep(self.config.verify_delay).await;
            }
        }

        Err(SdkError::StateNotConverged {
            port,
            expected: state,
            attempts,
        })
    }

    /// Read switch state and consumption of every port
    pub async fn read_state(&self) -> Result<DeviceState, SdkError> {
        read_state_from(self.connection()?).await
    }

    /// Switch state of one port, 1 = on
    pub async fn check_state(&self, port: u8) -> Result<u8, SdkError> {
        if port == 0 || port > MAX_PORT {
            return Err(SdkError::InvalidPort(port));
        }
        self.read_state()
            .await?
            .port_state(port)
            .ok_or(SdkError::InvalidPort(port))
    }

    /// Live consumption of one port in watts
    pub async fn port_power(&self, port: u8) -> Result<f64, SdkError> {
        if port == 0 || port > MAX_PORT {
            return Err(SdkError::InvalidPort(port));
        }
        self.read_state()
            .await?
            .port_watts(port)
            .ok_or(SdkError::InvalidPort(port))
    }

    // ========================================================================
    // Naming
    // ========================================================================

    /// Rename a port on the device; port 0 renames the strip
    ///
    /// Only HTTP firmware stores names, UDP V3 devices fail with
    /// `UnsupportedOnProtocol`.
    pub async fn rename_port(&self, port: u8, name: &str) -> Result<(), SdkError> {
        if port > MAX_PORT {
            return Err(SdkError::InvalidPort(port));
        }
        if name.trim().is_empty() {
            return Err(SdkError::InvalidName("name must not be empty".to_string()));
        }
        if name.chars().count() > MAX_PORT_NAME_LENGTH {
            return Err(SdkError::InvalidName(format!(
                "{:?} is longer than {} characters",
                name, MAX_PORT_NAME_LENGTH
            )));
        }
        let connection = self.connection()?;

        let mut params = Map::new();
        params.insert("name".to_string(), Value::String(name.to_string()));
        params.insert("port".to_string(), json!(port));
        connection
            .dispatcher
            .dispatch(Command::SetPortName, params, CallOptions::default())
            .await?;
        connection.polling.trigger_burst();

        let mut labels = connection.labels.lock();
        if port == 0 {
            labels.strip = name.to_string();
        } else {
            let index = usize::from(port - 1);
            while labels.ports.len() <= index {
                let next = labels.ports.len() + 1;
                labels.ports.push(format!("Port {}", next));
            }
            labels.ports[index] = name.to_string();
        }
        info!(ip = %self.ip, port, %name, "port renamed");
        Ok(())
    }

    /// Labels keyed by port number, 0 is the strip itself
    pub fn port_mapping(&self) -> Result<BTreeMap<u8, String>, SdkError> {
        let labels = self.connection()?.labels.lock().clone();
        Ok(label_map(&labels))
    }

    /// Ask the device for its current names and return the new mapping
    pub async fn refresh_port_labels(&self) -> Result<BTreeMap<u8, String>, SdkError> {
        let connection = self.connection()?;
        let options = DiscoveryOptions::unicast(self.ip, self.config.discovery_timeout)
            .with_port(self.config.discovery_port);
        let fresh = maxsmart_discovery::find_device_with(&options).await?;

        let mut labels = connection.labels.lock();
        labels.strip = fresh.strip_label().to_string();
        labels.ports = fresh.port_labels;
        Ok(label_map(&labels))
    }

    // ========================================================================
    // Identity and health
    // ========================================================================

    /// Read MAC, access key, CPU id and cloud server from the device
    pub async fn read_identifiers(&self) -> Result<HardwareIds, SdkError> {
        let connection = self.connection()?;
        let record = connection
            .dispatcher
            .dispatch(Command::ReadIdentifiers, Map::new(), CallOptions::default())
            .await?;
        Ok(HardwareIds::from_record(&record, self.ip)?)
    }

    /// Most stable identifier available, asking the device when it can answer
    pub async fn unique_id(&self) -> Result<String, SdkError> {
        let connection = self.connection()?;
        match self.read_identifiers().await {
            Ok(ids) => Ok(ids.unique_identifier(self.ip)),
            Err(e) => {
                debug!(ip = %self.ip, error = %e, "identifiers unavailable, using discovery data");
                Ok(connection.descriptor.unique_id())
            }
        }
    }

    /// Time one state read; failures are reported, not returned
    pub async fn health_check(&self) -> Result<HealthReport, SdkError> {
        let connection = self.connection()?;
        let started = Instant::now();
        let outcome = read_state_from(connection).await;

        Ok(HealthReport {
            healthy: outcome.is_ok(),
            response_time: started.elapsed(),
            error: outcome.err().map(|e| self.describe_error(&e)),
            ip: self.ip,
            name: connection.descriptor.name.clone(),
            firmware_version: connection.descriptor.firmware_version.clone(),
        })
    }

    /// Send any command with parameters and return the raw reply
    pub async fn send_command(
        &self,
        command: Command,
        params: Map<String, Value>,
    ) -> Result<ResponseRecord, SdkError> {
        Ok(self
            .connection()?
            .dispatcher
            .dispatch(command, params, CallOptions::default())
            .await?)
    }

    /// Human readable text for an error, via the configured formatter
    pub fn describe_error(&self, error: &SdkError) -> String {
        match error.command_error() {
            Some(command_error) => self.formatter.describe_error(command_error),
            None => error.to_string(),
        }
    }

    // ========================================================================
    // Polling
    // ========================================================================

    pub fn start_polling(&self) -> Result<(), SdkError> {
        self.connection()?.polling.start();
        Ok(())
    }

    pub async fn stop_polling(&self) -> Result<(), SdkError> {
        Ok(self.connection()?.polling.stop().await?)
    }

    pub fn trigger_burst(&self) -> Result<bool, SdkError> {
        Ok(self.connection()?.polling.trigger_burst())
    }

    pub fn register_observer(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn PollObserver>,
    ) -> Result<(), SdkError> {
        self.connection()?.polling.register_observer(name, observer);
        Ok(())
    }

    pub fn unregister_observer(&self, name: &str) -> Result<bool, SdkError> {
        Ok(self.connection()?.polling.unregister_observer(name))
    }

    /// Register a [`ChangeDetector`] seeded with the current state
    pub async fn watch_changes(
        &self,
        name: impl Into<String>,
    ) -> Result<mpsc::UnboundedReceiver<ChangeEvent>, SdkError> {
        let baseline = self.read_state().await?;
        let names: Arc<dyn PortNames> = Arc::new(SharedLabels(self.connection()?.labels.clone()));
        let (detector, events) = ChangeDetector::new(baseline);
        let detector = detector.with_port_names(names);
        self.register_observer(name, Arc::new(detector))?;
        Ok(events)
    }

    pub async fn force_poll(&self) -> Result<PollSnapshot, SdkError> {
        Ok(self.connection()?.polling.force_poll().await?)
    }

    pub fn latest_snapshot(&self) -> Option<PollSnapshot> {
        self.connection.as_ref()?.polling.latest_snapshot()
    }

    pub fn polling_stats(&self) -> Option<PollingStats> {
        self.connection.as_ref().map(|c| c.polling.stats())
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("ip", &self.ip)
            .field("initialized", &self.is_initialized())
            .field("protocol", &self.protocol())
            .field("unit", &self.watt_unit())
            .finish()
    }
}

async fn read_state_from(connection: &Connection) -> Result<DeviceState, SdkError> {
    let record = connection
        .dispatcher
        .dispatch(Command::ReadState, Map::new(), CallOptions::default())
        .await?;
    Ok(DeviceState::from_record(
        &record,
        connection.unit,
        connection.dispatcher.ip(),
    )?)
}

/// Whether `state` shows `port` (or every port, for 0) at `expected`
fn has_converged(state: &DeviceState, port: u8, expected: u8) -> bool {
    if port == 0 {
        !state.switch_states.is_empty() && state.switch_states.iter().all(|s| *s == expected)
    } else {
        state.port_state(port) == Some(expected)
    }
}

/// Local wrapper so the shared labels can implement the foreign `PortNames` trait
struct SharedLabels(Arc<Mutex<PortLabels>>);

impl PortNames for SharedLabels {
    fn port_name(&self, port: u8) -> Option<String> {
        label_map(&self.0.lock()).remove(&port)
    }
}

fn label_map(labels: &PortLabels) -> BTreeMap<u8, String> {
    let mut mapping = BTreeMap::new();
    let strip = if labels.strip.is_empty() {
        DEFAULT_STRIP_NAME.to_string()
    } else {
        labels.strip.clone()
    };
    mapping.insert(0, strip);

    for port in 1..=MAX_PORT {
        let label = labels
            .ports
            .get(usize::from(port - 1))
            .cloned()
            .unwrap_or_else(|| format!("Port {}", port));
        mapping.insert(port, label);
    }
    mapping
}
