//! Modbus/TCP simulator for testing
//!
//! An in-memory Modbus/TCP server for integration tests. Addresses are
//! zero-based protocol addresses, the same numbers the client sends.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use errors::GatewayResult;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::transport::modbus::constants::{
    EXCEPTION_FLAG, EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_FUNCTION,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_REGISTER, MBAP_HEADER_LEN, MODBUS_MAX_READ_REGISTERS,
};

/// Simple Modbus TCP simulator
#[derive(Debug, Clone, Default)]
pub struct ModbusSimulator {
    /// Holding registers
    holding_registers: Arc<RwLock<HashMap<u16, u16>>>,
    /// Input registers
    input_registers: Arc<RwLock<HashMap<u16, u16>>>,
    /// Exception code returned for any request touching the address
    exceptions: Arc<RwLock<HashMap<u16, u8>>>,
}

impl ModbusSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_registers(&self, start: u16, values: &[u16]) {
        let mut holding = self.holding_registers.write().await;
        for (i, value) in values.iter().enumerate() {
            holding.insert(start + i as u16, *value);
        }
    }

    pub async fn set_input_registers(&self, start: u16, values: &[u16]) {
        let mut input = self.input_registers.write().await;
        for (i, value) in values.iter().enumerate() {
            input.insert(start + i as u16, *value);
        }
    }

    pub async fn set_exception(&self, addr: u16, code: u8) {
        self.exceptions.write().await.insert(addr, code);
    }

    pub async fn clear_exceptions(&self) {
        self.exceptions.write().await.clear();
    }

    /// Get holding register value (for testing)
    pub async fn get_holding_register(&self, addr: u16) -> Option<u16> {
        self.holding_registers.read().await.get(&addr).copied()
    }

    /// Start the server on `port` (0 picks a free port)
    ///
    /// The simulator keeps serving until the runtime shuts down.
    pub async fn start(&self, port: u16) -> GatewayResult<SocketAddr> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let local_addr = listener.local_addr()?;
        info!("Modbus simulator listening on {}", local_addr);

        let sim = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("New connection from {}", addr);
                        let sim = sim.clone();
                        tokio::spawn(async move {
                            if let Err(e) = sim.handle_connection(stream).await {
                                debug!("Connection error: {}", e);
                            }
                        });
                    },
                    Err(e) => {
                        debug!("Accept error: {}", e);
                        break;
                    },
                }
            }
        });

        Ok(local_addr)
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        let mut header = [0u8; MBAP_HEADER_LEN + 1];
        loop {
            match stream.read_exact(&mut header).await {
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            }
            let tid = u16::from_be_bytes([header[0], header[1]]);
            let protocol_id = u16::from_be_bytes([header[2], header[3]]);
            let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
            let uid = header[6];

            let mut pdu = vec![0u8; length.saturating_sub(1)];
            stream.read_exact(&mut pdu).await?;
            if protocol_id != 0 || pdu.is_empty() {
                continue;
            }

            let response_pdu = self.handle_pdu(&pdu).await;
            let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + 1 + response_pdu.len());
            frame.extend_from_slice(&tid.to_be_bytes());
            frame.extend_from_slice(&[0x00, 0x00]);
            frame.extend_from_slice(&(response_pdu.len() as u16 + 1).to_be_bytes());
            frame.push(uid);
            frame.extend_from_slice(&response_pdu);
            stream.write_all(&frame).await?;
        }
    }

    async fn handle_pdu(&self, pdu: &[u8]) -> Vec<u8> {
        let function = pdu[0];
        let word = |pos: usize| -> Option<u16> {
            Some(u16::from_be_bytes([*pdu.get(pos)?, *pdu.get(pos + 1)?]))
        };
        let (Some(start), Some(quantity)) = (word(1), word(3)) else {
            return exception(function, EXCEPTION_ILLEGAL_FUNCTION);
        };

        let span = match function {
            FC_WRITE_SINGLE_REGISTER => 1,
            _ => quantity,
        };
        if let Some(code) = self.exception_in(start, span).await {
            return exception(function, code);
        }

        match function {
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
                if quantity == 0 || usize::from(quantity) > MODBUS_MAX_READ_REGISTERS {
                    return exception(function, EXCEPTION_ILLEGAL_DATA_ADDRESS);
                }
                let table = if function == FC_READ_HOLDING_REGISTERS {
                    self.holding_registers.read().await
                } else {
                    self.input_registers.read().await
                };
                let mut response = vec![function, (quantity * 2) as u8];
                for i in 0..quantity {
                    let value = table.get(&start.wrapping_add(i)).copied().unwrap_or(0);
                    response.extend_from_slice(&value.to_be_bytes());
                }
                response
            },
            FC_WRITE_SINGLE_REGISTER => {
                self.holding_registers.write().await.insert(start, quantity);
                pdu[..5].to_vec()
            },
            FC_WRITE_MULTIPLE_REGISTERS => {
                let mut holding = self.holding_registers.write().await;
                for i in 0..quantity {
                    let Some(value) = word(6 + usize::from(i) * 2) else {
                        return exception(function, EXCEPTION_ILLEGAL_DATA_ADDRESS);
                    };
                    holding.insert(start.wrapping_add(i), value);
                }
                pdu[..5].to_vec()
            },
            _ => exception(function, EXCEPTION_ILLEGAL_FUNCTION),
        }
    }

    async fn exception_in(&self, start: u16, count: u16) -> Option<u8> {
        let exceptions = self.exceptions.read().await;
        (0..count).find_map(|i| exceptions.get(&start.wrapping_add(i)).copied())
    }
}

fn exception(function: u8, code: u8) -> Vec<u8> {
    vec![function | EXCEPTION_FLAG, code]
}
