//! Receive loop and hardware identifier enhancement

use crate::device::DeviceDescriptor;
use crate::error::{DiscoveryError, Result};
use crate::handshake;
use crate::DiscoveryOptions;
use maxsmart_api::{
    CallOptions, Command, DispatchConfig, Dispatcher, HardwareIds, HttpTransport, Protocol,
    Transport,
};
use serde_json::Map;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

const BROADCAST: IpAddr = IpAddr::V4(Ipv4Addr::BROADCAST);
const MAX_REPLY: usize = 2048;

pub(crate) async fn collect(options: &DiscoveryOptions) -> Result<Vec<DeviceDescriptor>> {
    let target = options.target.unwrap_or(BROADCAST);
    let broadcast = target == BROADCAST;

    let bind_addr = match target {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to bind UDP socket: {}", e)))?;

    if broadcast {
        socket
            .set_broadcast(true)
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to enable broadcast: {}", e)))?;
    }

    let message = handshake::discovery_message(chrono::Local::now().naive_local());
    let destination = SocketAddr::new(target, options.port);
    debug!(%destination, %message, "sending discovery handshake");

    if let Err(e) = socket.send_to(message.as_bytes(), destination).await {
        if broadcast {
            // No usable broadcast route means nobody can answer
            warn!(error = %e, "broadcast discovery could not be sent");
            return Ok(Vec::new());
        }
        return Err(DiscoveryError::NetworkError(format!(
            "Failed to send discovery message to {}: {}",
            destination, e
        )));
    }

    let deadline = Instant::now() + options.timeout;
    let mut devices = Vec::new();
    let mut buf = vec![0u8; MAX_REPLY];

    loop {
        let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Err(e)) => {
                debug!(error = %e, "discovery receive ended");
                break;
            }
            Ok(Ok(received)) => received,
        };

        let device = handshake::parse_reply(&buf[..len], from.ip()).map_err(|detail| {
            DiscoveryError::ProtocolViolation {
                from: from.ip(),
                detail,
            }
        })?;

        match device {
            Some(device) => {
                debug!(ip = %device.ip_address, serial = %device.serial, "device answered");
                devices.push(device);
                if !broadcast {
                    break;
                }
            }
            None => debug!(%from, "ignoring reply without device data"),
        }
    }

    if options.enhance_with_hardware_ids {
        for device in devices.iter_mut() {
            enhance(device, options).await;
        }
    }

    info!(count = devices.len(), "discovery finished");
    Ok(devices)
}

/// Query the device for its hardware identifiers; failures leave it as-is
///
/// The identifier exchange only exists over HTTP, so it is attempted there
/// whatever protocol the firmware version suggests.
async fn enhance(device: &mut DeviceDescriptor, options: &DiscoveryOptions) {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::with_port(options.http_port));
    let dispatcher = Dispatcher::with_transport(
        device.ip_address,
        Protocol::Http,
        device.serial.clone(),
        transport,
        DispatchConfig::default(),
    );

    let call = CallOptions::single_attempt().with_timeout(options.enhance_timeout);
    let outcome = match dispatcher.dispatch(Command::ReadIdentifiers, Map::new(), call).await {
        Ok(record) => HardwareIds::from_record(&record, device.ip_address),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(ids) => {
            device.apply_hardware_ids(ids);
            debug!(ip = %device.ip_address, unique_id = %device.unique_id(), "hardware identifiers verified");
        }
        Err(e) => {
            device.hardware_ids_verified = false;
            debug!(ip = %device.ip_address, kind = %e.kind, "hardware identifiers unavailable");
        }
    }
}
