//! ETA PU 11 pellet boiler gateway
//!
//! Maps the controller's Modbus/TCP register map onto named properties and
//! typed subsystem views, served through a CLI and a REST API.

pub mod api;
pub mod cli;
pub mod config;
pub mod data;
pub mod gateway;
pub mod registers;

pub use config::EtaPU11Config;
pub use data::{BoilerData, EtaPU11Data, HeatingData, HotwaterData, StorageData, SystemData};
pub use gateway::EtaPU11Gateway;
pub use registers::Subsystem;
