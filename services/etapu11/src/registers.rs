//! ETA PU 11 Modbus register map
//!
//! Every value is a 32-bit word in two holding registers, high word first.
//! Subsystems start on fixed bases so each can grow without renumbering the
//! others: Boiler 0, Hotwater 40, Heating 80, Storage 120, System 160.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use errors::{GatewayError, GatewayResult};
use gateway_core::{
    device_enum, AccessMode, FieldDescriptor, FieldRegistry, RegisterBlock, TimeUnit, ValueKind,
};
use serde::{Deserialize, Serialize};

pub const DEVICE: &str = "ETAPU11";

// ============================================================================
// Enumerations
// ============================================================================

device_enum! {
    /// Boiler operating state
    pub enum BoilerState {
        Off = 0,
        Ready = 1,
        Ignition = 2,
        Heating = 3,
        Burnout = 4,
        Cleaning = 5,
        Fault = 6,
    }
}

device_enum! {
    /// Hot water tank state
    pub enum HotwaterState {
        Off = 0,
        Ready = 1,
        Charging = 2,
        Charged = 3,
    }
}

device_enum! {
    /// Heating circuit state
    pub enum HeatingState {
        Off = 0,
        Ready = 1,
        Heating = 2,
        Setback = 3,
        FrostProtection = 4,
        Vacation = 5,
    }
}

device_enum! {
    /// Buffer storage state
    pub enum StorageState {
        Off = 0,
        Ready = 1,
        Charging = 2,
        Charged = 3,
        Discharging = 4,
    }
}

device_enum! {
    /// Overall controller state
    pub enum SystemState {
        Off = 0,
        Ready = 1,
        Running = 2,
        Service = 3,
        Fault = 4,
    }
}

// ============================================================================
// Subsystems
// ============================================================================

/// Field groups of the register map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Boiler,
    Hotwater,
    Heating,
    Storage,
    System,
}

impl Subsystem {
    pub const ALL: [Subsystem; 5] = [
        Self::Boiler,
        Self::Hotwater,
        Self::Heating,
        Self::Storage,
        Self::System,
    ];

    /// Group name used in the register map
    pub const fn group(self) -> &'static str {
        match self {
            Self::Boiler => "Boiler",
            Self::Hotwater => "Hotwater",
            Self::Heating => "Heating",
            Self::Storage => "Storage",
            Self::System => "System",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.group())
    }
}

impl FromStr for Subsystem {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sub| sub.group().eq_ignore_ascii_case(s))
            .ok_or_else(|| GatewayError::NotFound(format!("subsystem '{}'", s)))
    }
}

// ============================================================================
// Register map
// ============================================================================

const BOILER: &str = "Boiler";
const HOTWATER: &str = "Hotwater";
const HEATING: &str = "Heating";
const STORAGE: &str = "Storage";
const SYSTEM: &str = "System";

const fn word(name: &'static str, group: &'static str, offset: u16, kind: ValueKind) -> FieldDescriptor {
    FieldDescriptor::register(name, group, offset, 2, kind)
}

const fn tenths(name: &'static str, group: &'static str, offset: u16) -> FieldDescriptor {
    word(name, group, offset, ValueKind::Float).scaled(10.0)
}

pub static FIELDS: &[FieldDescriptor] = &[
    // Boiler
    word("BoilerState", BOILER, 0, ValueKind::Enum(&BoilerState::TYPE)),
    word("BoilerPressure", BOILER, 2, ValueKind::Float).scaled(100.0).unit("bar"),
    tenths("BoilerTemperature", BOILER, 4).unit("°C"),
    tenths("BoilerTarget", BOILER, 6).unit("°C").access(AccessMode::ReadWrite),
    tenths("BoilerBottom", BOILER, 8).unit("°C"),
    tenths("FlueGasTemperature", BOILER, 10).unit("°C"),
    word("ExhaustFanSpeed", BOILER, 12, ValueKind::Unsigned).unit("rpm"),
    tenths("ResidualOxygen", BOILER, 14).unit("%"),
    tenths("TotalConsumed", BOILER, 16).unit("kg"),
    word("FullLoadHours", BOILER, 18, ValueKind::Unsigned).unit("h"),
    word("BurnerStarts", BOILER, 20, ValueKind::Unsigned),
    tenths("HopperContent", BOILER, 22).unit("kg"),
    tenths("PelletStock", BOILER, 24).unit("kg").access(AccessMode::ReadWrite),
    // Hot water
    word("HotwaterState", HOTWATER, 40, ValueKind::Enum(&HotwaterState::TYPE)),
    tenths("HotwaterTemperature", HOTWATER, 42).unit("°C"),
    tenths("HotwaterTarget", HOTWATER, 44).unit("°C").access(AccessMode::ReadWrite),
    tenths("HotwaterSwitchOnDiff", HOTWATER, 46).unit("K").access(AccessMode::ReadWrite),
    word("HotwaterOnTime", HOTWATER, 48, ValueKind::Duration(TimeUnit::Minutes))
        .access(AccessMode::ReadWrite),
    word("HotwaterOffTime", HOTWATER, 50, ValueKind::Duration(TimeUnit::Minutes))
        .access(AccessMode::ReadWrite),
    word("ChargeHotwater", HOTWATER, 52, ValueKind::Boolean).access(AccessMode::WriteOnly),
    // Heating circuit
    word("HeatingState", HEATING, 80, ValueKind::Enum(&HeatingState::TYPE)),
    tenths("RoomTemperature", HEATING, 82).unit("°C"),
    tenths("RoomTarget", HEATING, 84).unit("°C").access(AccessMode::ReadWrite),
    tenths("FlowTemperature", HEATING, 86).unit("°C"),
    tenths("FlowTarget", HEATING, 88).unit("°C"),
    word("HeatingDayStart", HEATING, 90, ValueKind::Duration(TimeUnit::Minutes))
        .access(AccessMode::ReadWrite),
    word("HeatingNightStart", HEATING, 92, ValueKind::Duration(TimeUnit::Minutes))
        .access(AccessMode::ReadWrite),
    // Buffer storage
    word("StorageState", STORAGE, 120, ValueKind::Enum(&StorageState::TYPE)),
    tenths("StorageTop", STORAGE, 122).unit("°C"),
    tenths("StorageMiddle", STORAGE, 124).unit("°C"),
    tenths("StorageBottom", STORAGE, 126).unit("°C"),
    tenths("StorageCharge", STORAGE, 128).unit("%"),
    tenths("StorageTarget", STORAGE, 130).unit("°C").access(AccessMode::ReadWrite),
    // System
    word("SystemState", SYSTEM, 160, ValueKind::Enum(&SystemState::TYPE)),
    word("SystemTime", SYSTEM, 162, ValueKind::Timestamp).access(AccessMode::ReadWrite),
    tenths("OutsideTemperature", SYSTEM, 164).unit("°C"),
    word("OperatingHours", SYSTEM, 166, ValueKind::Unsigned).unit("h"),
    word("ErrorCount", SYSTEM, 168, ValueKind::Unsigned),
];

/// Block reads covering the whole map
pub const BLOCKS: &[RegisterBlock] = &[RegisterBlock::new(0, 120), RegisterBlock::new(120, 60)];

/// Validated registry, built on first use
pub fn registry() -> GatewayResult<&'static FieldRegistry> {
    static REGISTRY: OnceLock<Result<FieldRegistry, String>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| {
            FieldRegistry::new(DEVICE, FIELDS)
                .and_then(|registry| registry.with_blocks(BLOCKS))
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| GatewayError::config(e.clone()))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_valid() {
        let registry = registry().unwrap();
        assert_eq!(registry.device(), DEVICE);
        assert_eq!(registry.len(), FIELDS.len());
        assert_eq!(registry.blocks().len(), 2);
    }

    #[test]
    fn test_every_subsystem_has_fields() {
        let registry = registry().unwrap();
        for subsystem in Subsystem::ALL {
            assert!(
                !registry.names_in_group(subsystem.group()).is_empty(),
                "{}",
                subsystem
            );
        }
        assert_eq!(registry.groups().len(), Subsystem::ALL.len());
    }

    #[test]
    fn test_access_modes() {
        let registry = registry().unwrap();
        assert!(!registry.is_readable("ChargeHotwater"));
        assert!(registry.is_writable("ChargeHotwater"));
        assert!(registry.is_writable("HotwaterOnTime"));
        assert!(!registry.is_writable("BoilerTemperature"));
    }

    #[test]
    fn test_subsystem_parse() {
        assert_eq!("boiler".parse::<Subsystem>().unwrap(), Subsystem::Boiler);
        assert_eq!("HOTWATER".parse::<Subsystem>().unwrap(), Subsystem::Hotwater);
        assert!(matches!(
            "garage".parse::<Subsystem>(),
            Err(GatewayError::NotFound(_))
        ));
    }
}
