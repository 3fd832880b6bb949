//! Device gateway core
//!
//! Building blocks shared by the device gateways:
//! - `field` / `value` / `codec`: metadata registry and value conversion
//! - `transport`: Modbus/TCP and UDP text clients
//! - `guard`: single-flight connect/operate/disconnect bracketing
//! - `gateway`: generic operations over register-mapped devices
//! - `status`: OPC UA style status values returned by every operation
//! - `monitor`: cancellable polling loop

pub mod codec;
pub mod data;
pub mod field;
pub mod gateway;
pub mod guard;
pub mod monitor;
pub mod status;
pub mod transport;
pub mod value;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use data::{DataTable, FieldSlot};
pub use field::{AccessMode, FieldDescriptor, FieldRegistry, RegisterBlock, WireLocation};
pub use gateway::{log_status, RegisterGateway};
pub use guard::{OperationGuard, Session};
pub use monitor::{run_monitor, MonitorOptions, MonitorSummary};
pub use status::{DataStatus, Severity, StatusCode};
pub use transport::{
    Connection, DatagramTransport, ModbusSettings, ModbusTcpClient, RegisterTransport, UdpClient,
    UdpSettings,
};
pub use value::{EnumType, FieldValue, TimeUnit, ValueKind};
