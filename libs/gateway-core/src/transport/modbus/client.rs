//! Modbus/TCP client
//!
//! One request in flight at a time; MBAP transaction ids are checked on every
//! reply. Any I/O failure drops the socket so the next operation reconnects.

use async_trait::async_trait;
use errors::{GatewayError, GatewayResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::constants::{
    exception_description, mbap_frame_size, MAX_MBAP_LENGTH, MBAP_HEADER_LEN,
};
use super::pdu::ModbusPdu;
use super::ModbusSettings;
use crate::transport::{Connection, RegisterTransport};

/// Modbus/TCP master for a single device
#[derive(Debug)]
pub struct ModbusTcpClient {
    settings: ModbusSettings,
    stream: Option<TcpStream>,
    transaction_id: u16,
}

impl ModbusTcpClient {
    pub fn new(settings: ModbusSettings) -> Self {
        Self {
            settings,
            stream: None,
            transaction_id: 0,
        }
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    /// Send one PDU and return the reply PDU
    async fn request(&mut self, pdu: &ModbusPdu) -> GatewayResult<ModbusPdu> {
        let result = self.exchange(pdu).await;
        if let Err(e) = &result {
            if e.is_retryable() {
                // framing is lost after an I/O failure or timeout
                self.stream = None;
            }
        }
        let reply = result?;

        if let Some(code) = reply.exception_code() {
            let function = reply.function_code().unwrap_or_default() & 0x7F;
            warn!(
                "Modbus exception from {}: FC={:02X} code={:02X} ({})",
                self.settings.endpoint(),
                function,
                code,
                exception_description(code)
            );
            return Err(GatewayError::DeviceException { function, code });
        }
        if reply.function_code() != pdu.function_code() {
            return Err(GatewayError::unknown_response(format!(
                "function code mismatch: sent {:?}, got {:?}",
                pdu.function_code(),
                reply.function_code()
            )));
        }
        Ok(reply)
    }

    async fn exchange(&mut self, pdu: &ModbusPdu) -> GatewayResult<ModbusPdu> {
        let transaction_id = self.next_transaction_id();
        let unit_id = self.settings.slave_id;
        let limit = self.settings.timeout();
        let endpoint = self.settings.endpoint();
        let stream = self.stream.as_mut().ok_or(GatewayError::NotConnected)?;

        let mut frame = Vec::with_capacity(mbap_frame_size(pdu.len()));
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00]); // Protocol ID
        frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
        frame.push(unit_id);
        frame.extend_from_slice(pdu.as_slice());
        debug!("Modbus TX [{}]: {:02X?}", transaction_id, frame);

        timeout(limit, stream.write_all(&frame))
            .await
            .map_err(|_| GatewayError::timeout(format!("{} (send)", endpoint)))??;

        let mut header = [0u8; MBAP_HEADER_LEN + 1];
        timeout(limit, stream.read_exact(&mut header))
            .await
            .map_err(|_| GatewayError::timeout(endpoint.clone()))??;

        let reply_tid = u16::from_be_bytes([header[0], header[1]]);
        let protocol_id = u16::from_be_bytes([header[2], header[3]]);
        let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
        if protocol_id != 0 {
            return Err(GatewayError::unknown_response(format!(
                "protocol id {} is not Modbus",
                protocol_id
            )));
        }
        if !(2..=MAX_MBAP_LENGTH).contains(&length) {
            return Err(GatewayError::decoding(format!(
                "invalid MBAP length {}",
                length
            )));
        }

        let mut body = vec![0u8; length - 1];
        timeout(limit, stream.read_exact(&mut body))
            .await
            .map_err(|_| GatewayError::timeout(endpoint.clone()))??;
        debug!("Modbus RX [{}]: {:02X?}", reply_tid, body);

        if reply_tid != transaction_id {
            return Err(GatewayError::unknown_response(format!(
                "transaction id mismatch: sent {}, got {}",
                transaction_id, reply_tid
            )));
        }
        ModbusPdu::from_slice(&body)
    }
}

#[async_trait]
impl Connection for ModbusTcpClient {
    type Settings = ModbusSettings;

    async fn connect(&mut self) -> GatewayResult<()> {
        self.stream = None;
        let endpoint = self.settings.endpoint();
        let stream = match timeout(
            self.settings.timeout(),
            TcpStream::connect((self.settings.address.as_str(), self.settings.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(GatewayError::connection_failed(endpoint, e)),
            Err(_) => {
                return Err(GatewayError::connection_failed(
                    endpoint,
                    format!("no answer within {}s", self.settings.timeout_secs),
                ))
            },
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY on {}: {}", endpoint, e);
        }
        debug!("Connected to Modbus device {}", endpoint);
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("Disconnected from Modbus device {}", self.settings.endpoint());
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn settings(&self) -> &ModbusSettings {
        &self.settings
    }

    fn update_settings(&mut self, settings: ModbusSettings) {
        self.settings = settings;
    }

    fn endpoint(&self) -> String {
        self.settings.endpoint()
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpClient {
    async fn read_registers(&mut self, offset: u16, count: u16) -> GatewayResult<Vec<u16>> {
        let request = ModbusPdu::read_holding(offset, count)?;
        self.request(&request).await?.read_reply_words(count)
    }

    async fn write_registers(&mut self, offset: u16, values: &[u16]) -> GatewayResult<()> {
        let request = ModbusPdu::write(offset, values)?;
        let reply = self.request(&request).await?;

        // FC06 echoes address and value, FC16 echoes address and quantity
        let echo = if values.len() == 1 {
            values[0]
        } else {
            values.len() as u16
        };
        if reply.u16_at(1) != Some(offset) || reply.u16_at(3) != Some(echo) {
            return Err(GatewayError::unknown_response(format!(
                "write echo mismatch: {:02X?}",
                reply.as_slice()
            )));
        }
        Ok(())
    }
}
