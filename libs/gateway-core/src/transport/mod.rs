//! Transport clients
//!
//! A transport owns one connection to one device and performs raw exchanges.
//! It never retries; gateways decide what a failure means.

pub mod modbus;
pub mod udp;

use std::fmt::Debug;

use async_trait::async_trait;
use errors::{GatewayError, GatewayResult};

pub use modbus::{ModbusSettings, ModbusTcpClient};
pub use udp::{UdpClient, UdpSettings};

/// Upper bound for a configured reply timeout
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Connection lifecycle shared by all transports
#[async_trait]
pub trait Connection: Send {
    /// Connection parameters, replaced wholesale by `update_settings`
    type Settings: Clone + Debug + Send + Sync;

    /// Open the connection
    ///
    /// A failed connect leaves the client disconnected and may be retried.
    async fn connect(&mut self) -> GatewayResult<()>;

    /// Close the connection; safe to call when not connected
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn settings(&self) -> &Self::Settings;

    /// Replace the settings; takes effect on the next connect
    fn update_settings(&mut self, settings: Self::Settings);

    /// Human readable peer, used in log lines and error messages
    fn endpoint(&self) -> String;
}

/// Register oriented transport (Modbus/TCP)
#[async_trait]
pub trait RegisterTransport: Connection {
    async fn read_registers(&mut self, offset: u16, count: u16) -> GatewayResult<Vec<u16>>;

    async fn write_registers(&mut self, offset: u16, values: &[u16]) -> GatewayResult<()>;

    /// Read one 32-bit word stored in two registers, high word first
    async fn read_word(&mut self, offset: u16) -> GatewayResult<u32> {
        let words = self.read_registers(offset, 2).await?;
        let raw = crate::codec::registers_to_raw(&words, false)?;
        Ok(raw as u32)
    }

    /// Read `count` consecutive 32-bit words
    async fn read_word_array(&mut self, offset: u16, count: u16) -> GatewayResult<Vec<u32>> {
        let registers = count
            .checked_mul(2)
            .ok_or_else(|| GatewayError::out_of_range(count, 1, u16::MAX / 2))?;
        let words = self.read_registers(offset, registers).await?;
        Ok(words
            .chunks_exact(2)
            .map(|pair| (u32::from(pair[0]) << 16) | u32::from(pair[1]))
            .collect())
    }

    async fn write_word(&mut self, offset: u16, value: u32) -> GatewayResult<()> {
        self.write_registers(offset, &[(value >> 16) as u16, value as u16])
            .await
    }
}

/// Text datagram transport (UDP request/reply)
#[async_trait]
pub trait DatagramTransport: Connection {
    /// Send one request and wait for its reply
    ///
    /// Fails with `GatewayError::Timeout` when no reply arrives within the
    /// configured timeout.
    async fn send_receive(&mut self, request: &str) -> GatewayResult<String>;
}
