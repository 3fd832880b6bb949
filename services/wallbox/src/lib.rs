//! KEBA P30 wallbox gateway
//!
//! Reads the UDP status reports into named fields and typed views, and sends
//! the wallbox's text commands; served through a CLI and a REST API.

pub mod api;
pub mod cli;
pub mod config;
pub mod data;
pub mod fields;
pub mod gateway;

pub use config::WallboxConfig;
pub use data::{Report1Data, Report2Data, Report3Data, WallboxData};
pub use fields::{ChargingState, PlugState, Report};
pub use gateway::WallboxGateway;
