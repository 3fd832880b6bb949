//! Test doubles for gateways and transports
//!
//! - [`MockRegisterTransport`] / [`MockDatagramTransport`]: in-memory
//!   transports with fault injection and a call journal
//! - [`ModbusSimulator`]: Modbus/TCP server on a local port
//! - [`UdpResponder`]: UDP peer answering canned requests

mod mock;
mod simulator;
mod udp_responder;

pub use mock::{InjectedFailure, MockCall, MockDatagramTransport, MockRegisterTransport};
pub use simulator::ModbusSimulator;
pub use udp_responder::UdpResponder;
