//! UDP text transport
//!
//! Plain-text request/reply over a connected UDP socket. The device answers
//! from its fixed port to ours, so the local port is configurable as well.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use errors::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout, Instant};
use tracing::debug;

use super::{Connection, DatagramTransport, MAX_TIMEOUT_SECS};

/// Largest datagram accepted from a device
const MAX_DATAGRAM_SIZE: usize = 4096;

/// UDP connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdpSettings {
    /// Device host name or IP address
    #[serde(default = "default_address")]
    pub address: String,
    /// Device port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local port to bind; 0 picks an ephemeral port
    #[serde(default = "default_port")]
    pub local_port: u16,
    /// Reply timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7090
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            local_port: default_port(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl UdpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.address.trim().is_empty() {
            return Err(GatewayError::config("UDP address must not be empty"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(GatewayError::config(format!(
                "UDP timeout must be 1..={} seconds, got {}",
                MAX_TIMEOUT_SECS, self.timeout_secs
            )));
        }
        Ok(())
    }
}

/// UDP request/reply client
#[derive(Debug)]
pub struct UdpClient {
    settings: UdpSettings,
    socket: Option<UdpSocket>,
}

impl UdpClient {
    pub fn new(settings: UdpSettings) -> Self {
        Self {
            settings,
            socket: None,
        }
    }

    /// Local address of the bound socket, if connected
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

#[async_trait]
impl Connection for UdpClient {
    type Settings = UdpSettings;

    async fn connect(&mut self) -> GatewayResult<()> {
        self.socket = None;
        let endpoint = self.settings.endpoint();
        let peer = lookup_host((self.settings.address.as_str(), self.settings.port))
            .await
            .map_err(|e| GatewayError::connection_failed(&endpoint, e))?
            .next()
            .ok_or_else(|| {
                GatewayError::connection_failed(&endpoint, "address resolved to nothing")
            })?;
        let unspecified: IpAddr = if peer.is_ipv6() {
            Ipv6Addr::UNSPECIFIED.into()
        } else {
            Ipv4Addr::UNSPECIFIED.into()
        };
        let socket = UdpSocket::bind((unspecified, self.settings.local_port))
            .await
            .map_err(|e| GatewayError::connection_failed(&endpoint, e))?;
        socket
            .connect(peer)
            .await
            .map_err(|e| GatewayError::connection_failed(&endpoint, e))?;
        debug!("UDP socket bound for {}", endpoint);
        self.socket = Some(socket);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            debug!("UDP socket for {} closed", self.settings.endpoint());
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn settings(&self) -> &UdpSettings {
        &self.settings
    }

    fn update_settings(&mut self, settings: UdpSettings) {
        self.settings = settings;
    }

    fn endpoint(&self) -> String {
        self.settings.endpoint()
    }
}

#[async_trait]
impl DatagramTransport for UdpClient {
    async fn send_receive(&mut self, request: &str) -> GatewayResult<String> {
        let limit = self.settings.timeout();
        let endpoint = self.settings.endpoint();
        let socket = self.socket.as_ref().ok_or(GatewayError::NotConnected)?;

        debug!("UDP TX {}: {}", endpoint, request);
        socket.send(request.as_bytes()).await?;

        // unvalidated settings may carry a timeout past the clock's range
        let deadline = Instant::now()
            .checked_add(limit)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(MAX_TIMEOUT_SECS));
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let received = timeout(remaining, socket.recv(&mut buffer))
                .await
                .map_err(|_| {
                    GatewayError::timeout(format!(
                        "{} (no reply to '{}' within {}s)",
                        endpoint, request, self.settings.timeout_secs
                    ))
                })??;
            let reply = String::from_utf8_lossy(&buffer[..received]).trim().to_string();
            // devices occasionally send empty keep-alive datagrams
            if reply.is_empty() {
                continue;
            }
            debug!("UDP RX {}: {}", endpoint, reply);
            return Ok(reply);
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::test_utils::UdpResponder;

    fn settings_for(addr: std::net::SocketAddr, timeout_secs: u64) -> UdpSettings {
        UdpSettings {
            address: addr.ip().to_string(),
            port: addr.port(),
            local_port: 0,
            timeout_secs,
        }
    }

    #[tokio::test]
    async fn test_request_reply() {
        let responder = UdpResponder::new();
        responder.reply("i", "\"Firmware\":\"P30 v 3.10.16\"").await;
        let addr = responder.start().await.unwrap();

        let mut client = UdpClient::new(settings_for(addr, 2));
        client.connect().await.unwrap();
        assert!(client.local_addr().is_some());
        let reply = client.send_receive("i").await.unwrap();
        assert!(reply.contains("Firmware"));
        client.disconnect().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let responder = UdpResponder::new();
        let addr = responder.start().await.unwrap();

        let mut client = UdpClient::new(settings_for(addr, 1));
        client.connect().await.unwrap();
        let started = std::time::Instant::now();
        let err = client.send_receive("report 1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(900));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_ipv6_peer() {
        // hosts without IPv6 loopback have nothing to check
        let Ok(device) = UdpSocket::bind("[::1]:0").await else {
            return;
        };
        let addr = device.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buffer = [0u8; 64];
            if let Ok((_, from)) = device.recv_from(&mut buffer).await {
                let _ = device.send_to(b"\"Product\":\"KC-P30\"", from).await;
            }
        });

        let mut client = UdpClient::new(settings_for(addr, 2));
        client.connect().await.unwrap();
        assert!(client.local_addr().unwrap().is_ipv6());
        assert!(client.send_receive("i").await.unwrap().contains("KC-P30"));
    }

    #[tokio::test]
    async fn test_send_without_connect() {
        let mut client = UdpClient::new(UdpSettings::default());
        assert!(matches!(
            client.send_receive("i").await,
            Err(GatewayError::NotConnected)
        ));
    }

    #[test]
    fn test_settings_validation() {
        assert!(UdpSettings::default().validate().is_ok());
        let empty = UdpSettings {
            address: " ".into(),
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        for timeout_secs in [0, MAX_TIMEOUT_SECS + 1, u64::MAX] {
            let settings = UdpSettings {
                timeout_secs,
                ..Default::default()
            };
            assert!(settings.validate().is_err(), "timeout {timeout_secs}");
        }
    }

    #[tokio::test]
    async fn test_unvalidated_huge_timeout_still_waits_for_reply() {
        let responder = UdpResponder::new();
        responder.reply("i", "\"Firmware\":\"P30 v 3.10.16\"").await;
        let addr = responder.start().await.unwrap();

        let mut client = UdpClient::new(settings_for(addr, u64::MAX));
        client.connect().await.unwrap();
        let reply = client.send_receive("i").await.unwrap();
        assert!(reply.contains("Firmware"));
    }
}
