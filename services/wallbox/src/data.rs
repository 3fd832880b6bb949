//! Typed report views

use chrono::{DateTime, TimeDelta, Utc};
use gateway_core::value::serialize_duration;
use gateway_core::DataTable;
use serde::Serialize;

use crate::fields::{ChargingState, PlugState, Report};

/// Product information (`report 1`)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report1Data {
    pub product: String,
    pub serial: String,
    pub firmware: String,
    pub com_module: u32,
    pub backend: u32,
    pub dip_switch1: u32,
    pub dip_switch2: u32,
    #[serde(serialize_with = "serialize_duration")]
    pub uptime: TimeDelta,
    pub updated: Option<DateTime<Utc>>,
}

impl Report1Data {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            product: table.text("Product"),
            serial: table.text("Serial"),
            firmware: table.text("Firmware"),
            com_module: table.unsigned("ComModule"),
            backend: table.unsigned("Backend"),
            dip_switch1: table.unsigned("DipSwitch1"),
            dip_switch2: table.unsigned("DipSwitch2"),
            uptime: table.duration("Uptime"),
            updated: table.last_updated(Report::Report1.group()),
        }
    }
}

/// State and settings (`report 2`); currents in A, energy in Wh
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report2Data {
    pub state: ChargingState,
    pub error1: u32,
    pub error2: u32,
    pub plug: PlugState,
    pub auth_on: bool,
    pub auth_required: bool,
    pub enable_sys: bool,
    pub enable_user: bool,
    pub max_current: f64,
    pub max_current_percent: f64,
    pub current_hardware: f64,
    pub current_user: f64,
    pub current_failsafe: f64,
    #[serde(serialize_with = "serialize_duration")]
    pub timeout_failsafe: TimeDelta,
    pub current_timer: f64,
    #[serde(serialize_with = "serialize_duration")]
    pub timeout_timer: TimeDelta,
    pub set_energy: f64,
    pub output: u32,
    pub input: u32,
    pub updated: Option<DateTime<Utc>>,
}

impl Report2Data {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            state: ChargingState::from_raw(table.unsigned("State")).unwrap_or_default(),
            error1: table.unsigned("Error1"),
            error2: table.unsigned("Error2"),
            plug: PlugState::from_raw(table.unsigned("Plug")).unwrap_or_default(),
            auth_on: table.boolean("AuthOn"),
            auth_required: table.boolean("AuthRequired"),
            enable_sys: table.boolean("EnableSys"),
            enable_user: table.boolean("EnableUser"),
            max_current: table.float("MaxCurr"),
            max_current_percent: table.float("MaxCurrPercent"),
            current_hardware: table.float("CurrHW"),
            current_user: table.float("CurrUser"),
            current_failsafe: table.float("CurrFS"),
            timeout_failsafe: table.duration("TmoFS"),
            current_timer: table.float("CurrTimer"),
            timeout_timer: table.duration("TmoCT"),
            set_energy: table.float("Setenergy"),
            output: table.unsigned("Output"),
            input: table.unsigned("Input"),
            updated: table.last_updated(Report::Report2.group()),
        }
    }

    /// Charging right now
    pub fn is_charging(&self) -> bool {
        self.state == ChargingState::Charging
    }
}

/// Meter values (`report 3`); V, A, W, % and Wh
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report3Data {
    pub u1: u32,
    pub u2: u32,
    pub u3: u32,
    pub i1: f64,
    pub i2: f64,
    pub i3: f64,
    pub power: f64,
    pub power_factor: f64,
    pub energy_present: f64,
    pub energy_total: f64,
    pub updated: Option<DateTime<Utc>>,
}

impl Report3Data {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            u1: table.unsigned("U1"),
            u2: table.unsigned("U2"),
            u3: table.unsigned("U3"),
            i1: table.float("I1"),
            i2: table.float("I2"),
            i3: table.float("I3"),
            power: table.float("P"),
            power_factor: table.float("PF"),
            energy_present: table.float("EPres"),
            energy_total: table.float("ETotal"),
            updated: table.last_updated(Report::Report3.group()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WallboxData {
    pub report1: Report1Data,
    pub report2: Report2Data,
    pub report3: Report3Data,
}

impl WallboxData {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            report1: Report1Data::from_table(table),
            report2: Report2Data::from_table(table),
            report3: Report3Data::from_table(table),
        }
    }

    pub fn report_json(&self, report: Report) -> serde_json::Result<serde_json::Value> {
        match report {
            Report::Report1 => serde_json::to_value(&self.report1),
            Report::Report2 => serde_json::to_value(&self.report2),
            Report::Report3 => serde_json::to_value(&self.report3),
        }
    }
}
