use crate::{Transport, TransportError, DEVICE_UDP_PORT};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

const MAX_DATAGRAM: usize = 4096;

/// Connectionless transport for devices running the UDP V3 firmware
///
/// Every exchange binds a fresh ephemeral socket, sends one datagram and
/// waits for one reply from the target address. Datagrams from other
/// senders are ignored until the deadline.
#[derive(Debug, Clone)]
pub struct DatagramTransport {
    port: u16,
}

impl DatagramTransport {
    pub fn new() -> Self {
        Self::with_port(DEVICE_UDP_PORT)
    }

    pub fn with_port(port: u16) -> Self {
        Self { port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for DatagramTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for DatagramTransport {
    async fn exchange(
        &self,
        ip: IpAddr,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        let bind_addr = match ip {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| TransportError::from_io(&e))?;
        let target = SocketAddr::new(ip, self.port);

        debug!(%target, bytes = payload.len(), "UDP exchange");
        socket
            .send_to(payload, target)
            .await
            .map_err(|e| TransportError::from_io(&e))?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok(received)) => received,
                Ok(Err(e)) => return Err(TransportError::from_io(&e)),
                Err(_) => return Err(TransportError::Timeout(timeout)),
            };

            if from.ip() != ip {
                trace!(%from, "ignoring datagram from unexpected sender");
                continue;
            }
            if len == 0 {
                return Err(TransportError::EmptyBody);
            }

            buf.truncate(len);
            return Ok(buf);
        }
    }
}
