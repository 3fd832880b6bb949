//! UDP peer for transport tests
//!
//! Answers each known request with its canned reply and stays silent on
//! anything else, which lets tests exercise the client timeout.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use errors::GatewayResult;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct UdpResponder {
    replies: Arc<RwLock<HashMap<String, String>>>,
    received: Arc<RwLock<Vec<String>>>,
}

impl UdpResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reply(&self, request: &str, response: &str) {
        self.replies
            .write()
            .await
            .insert(request.to_string(), response.to_string());
    }

    /// Requests received so far
    pub async fn received(&self) -> Vec<String> {
        self.received.read().await.clone()
    }

    /// Bind an ephemeral local port and start answering
    pub async fn start(&self) -> GatewayResult<SocketAddr> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let local_addr = socket.local_addr()?;
        debug!("UDP responder listening on {}", local_addr);

        let responder = self.clone();
        tokio::spawn(async move {
            let mut buffer = vec![0u8; 4096];
            loop {
                let (n, peer) = match socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        debug!("UDP responder receive error: {}", e);
                        break;
                    },
                };
                let request = String::from_utf8_lossy(&buffer[..n]).trim().to_string();
                responder.received.write().await.push(request.clone());

                let reply = responder.replies.read().await.get(&request).cloned();
                if let Some(reply) = reply {
                    if let Err(e) = socket.send_to(reply.as_bytes(), peer).await {
                        debug!("UDP responder send error: {}", e);
                    }
                }
            }
        });

        Ok(local_addr)
    }
}
