use crate::{Transport, TransportError, DEVICE_HTTP_PORT};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// HTTP GET transport for devices running the HTTP firmware
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    port: u16,
}

impl HttpTransport {
    /// Create a transport targeting the default device port
    pub fn new() -> Self {
        Self::with_port(DEVICE_HTTP_PORT)
    }

    /// Create a transport targeting a custom port (used by test servers)
    pub fn with_port(port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            port,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn url(&self, ip: IpAddr, query: &str) -> String {
        format!("http://{}/?{}", SocketAddr::new(ip, self.port), query)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(
        &self,
        ip: IpAddr,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let query = std::str::from_utf8(payload)
            .map_err(|e| TransportError::Io(format!("query is not UTF-8: {}", e)))?;
        let url = self.url(ip, query);
        debug!(%url, "HTTP exchange");

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        if body.is_empty() {
            return Err(TransportError::EmptyBody);
        }

        Ok(body.to_vec())
    }
}
