//! Typed subsystem views
//!
//! Projections of the gateway's data table. They are built from one
//! consistent table snapshot, so a view never mixes values of two reads.

use chrono::{DateTime, TimeDelta, Utc};
use gateway_core::value::serialize_duration;
use gateway_core::DataTable;
use serde::Serialize;

use crate::registers::{
    BoilerState, HeatingState, HotwaterState, StorageState, Subsystem, SystemState,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoilerData {
    pub state: BoilerState,
    pub pressure: f64,
    pub temperature: f64,
    pub target: f64,
    pub bottom: f64,
    pub flue_gas_temperature: f64,
    pub exhaust_fan_speed: u32,
    pub residual_oxygen: f64,
    pub total_consumed: f64,
    pub full_load_hours: u32,
    pub burner_starts: u32,
    pub hopper_content: f64,
    pub pellet_stock: f64,
    pub updated: Option<DateTime<Utc>>,
}

impl BoilerData {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            state: BoilerState::from_raw(table.unsigned("BoilerState")).unwrap_or_default(),
            pressure: table.float("BoilerPressure"),
            temperature: table.float("BoilerTemperature"),
            target: table.float("BoilerTarget"),
            bottom: table.float("BoilerBottom"),
            flue_gas_temperature: table.float("FlueGasTemperature"),
            exhaust_fan_speed: table.unsigned("ExhaustFanSpeed"),
            residual_oxygen: table.float("ResidualOxygen"),
            total_consumed: table.float("TotalConsumed"),
            full_load_hours: table.unsigned("FullLoadHours"),
            burner_starts: table.unsigned("BurnerStarts"),
            hopper_content: table.float("HopperContent"),
            pellet_stock: table.float("PelletStock"),
            updated: table.last_updated(Subsystem::Boiler.group()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotwaterData {
    pub state: HotwaterState,
    pub temperature: f64,
    pub target: f64,
    pub switch_on_diff: f64,
    #[serde(serialize_with = "serialize_duration")]
    pub on_time: TimeDelta,
    #[serde(serialize_with = "serialize_duration")]
    pub off_time: TimeDelta,
    pub updated: Option<DateTime<Utc>>,
}

impl HotwaterData {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            state: HotwaterState::from_raw(table.unsigned("HotwaterState")).unwrap_or_default(),
            temperature: table.float("HotwaterTemperature"),
            target: table.float("HotwaterTarget"),
            switch_on_diff: table.float("HotwaterSwitchOnDiff"),
            on_time: table.duration("HotwaterOnTime"),
            off_time: table.duration("HotwaterOffTime"),
            updated: table.last_updated(Subsystem::Hotwater.group()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatingData {
    pub state: HeatingState,
    pub room_temperature: f64,
    pub room_target: f64,
    pub flow_temperature: f64,
    pub flow_target: f64,
    #[serde(serialize_with = "serialize_duration")]
    pub day_start: TimeDelta,
    #[serde(serialize_with = "serialize_duration")]
    pub night_start: TimeDelta,
    pub updated: Option<DateTime<Utc>>,
}

impl HeatingData {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            state: HeatingState::from_raw(table.unsigned("HeatingState")).unwrap_or_default(),
            room_temperature: table.float("RoomTemperature"),
            room_target: table.float("RoomTarget"),
            flow_temperature: table.float("FlowTemperature"),
            flow_target: table.float("FlowTarget"),
            day_start: table.duration("HeatingDayStart"),
            night_start: table.duration("HeatingNightStart"),
            updated: table.last_updated(Subsystem::Heating.group()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageData {
    pub state: StorageState,
    pub top: f64,
    pub middle: f64,
    pub bottom: f64,
    pub charge: f64,
    pub target: f64,
    pub updated: Option<DateTime<Utc>>,
}

impl StorageData {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            state: StorageState::from_raw(table.unsigned("StorageState")).unwrap_or_default(),
            top: table.float("StorageTop"),
            middle: table.float("StorageMiddle"),
            bottom: table.float("StorageBottom"),
            charge: table.float("StorageCharge"),
            target: table.float("StorageTarget"),
            updated: table.last_updated(Subsystem::Storage.group()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemData {
    pub state: SystemState,
    pub system_time: DateTime<Utc>,
    pub outside_temperature: f64,
    pub operating_hours: u32,
    pub error_count: u32,
    pub updated: Option<DateTime<Utc>>,
}

impl SystemData {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            state: SystemState::from_raw(table.unsigned("SystemState")).unwrap_or_default(),
            system_time: table.timestamp("SystemTime"),
            outside_temperature: table.float("OutsideTemperature"),
            operating_hours: table.unsigned("OperatingHours"),
            error_count: table.unsigned("ErrorCount"),
            updated: table.last_updated(Subsystem::System.group()),
        }
    }
}

/// All subsystem views of one snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtaPU11Data {
    pub boiler: BoilerData,
    pub hotwater: HotwaterData,
    pub heating: HeatingData,
    pub storage: StorageData,
    pub system: SystemData,
}

impl EtaPU11Data {
    pub fn from_table(table: &DataTable) -> Self {
        Self {
            boiler: BoilerData::from_table(table),
            hotwater: HotwaterData::from_table(table),
            heating: HeatingData::from_table(table),
            storage: StorageData::from_table(table),
            system: SystemData::from_table(table),
        }
    }

    /// JSON of one subsystem view
    pub fn subsystem_json(&self, subsystem: Subsystem) -> serde_json::Result<serde_json::Value> {
        match subsystem {
            Subsystem::Boiler => serde_json::to_value(&self.boiler),
            Subsystem::Hotwater => serde_json::to_value(&self.hotwater),
            Subsystem::Heating => serde_json::to_value(&self.heating),
            Subsystem::Storage => serde_json::to_value(&self.storage),
            Subsystem::System => serde_json::to_value(&self.system),
        }
    }
}
