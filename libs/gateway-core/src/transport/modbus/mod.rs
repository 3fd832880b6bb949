//! Modbus/TCP transport

pub mod client;
pub mod constants;
pub mod pdu;

use std::time::Duration;

use errors::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};

pub use client::ModbusTcpClient;

use super::MAX_TIMEOUT_SECS;

/// Modbus/TCP connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusSettings {
    /// Device host name or IP address
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Modbus unit identifier
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// Connect and response timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    502
}

fn default_slave_id() -> u8 {
    1
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ModbusSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            slave_id: default_slave_id(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModbusSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.address.trim().is_empty() {
            return Err(GatewayError::config("Modbus address must not be empty"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(GatewayError::config(format!(
                "Modbus timeout must be 1..={} seconds, got {}",
                MAX_TIMEOUT_SECS, self.timeout_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_bounds() {
        assert!(ModbusSettings::default().validate().is_ok());
        for timeout_secs in [0, MAX_TIMEOUT_SECS + 1, u64::MAX] {
            let settings = ModbusSettings {
                timeout_secs,
                ..Default::default()
            };
            assert!(settings.validate().is_err(), "timeout {timeout_secs}");
        }
    }
}
