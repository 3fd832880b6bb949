//! KEBA P30 field map
//!
//! The wallbox answers `report 1`, `report 2` and `report 3` with one JSON
//! object each. Every field names its report and JSON key; settable fields
//! carry the command verb that changes them.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use errors::{GatewayError, GatewayResult};
use gateway_core::{device_enum, FieldDescriptor, FieldRegistry, TimeUnit, ValueKind};
use serde::{Deserialize, Serialize};

pub const DEVICE: &str = "KEBA-P30";

device_enum! {
    /// Charging state (`State` in report 2)
    pub enum ChargingState {
        Starting = 0,
        NotReady = 1,
        Ready = 2,
        Charging = 3,
        Error = 4,
        Interrupted = 5,
    }
}

device_enum! {
    /// Cable state (`Plug` in report 2)
    pub enum PlugState {
        Unplugged = 0,
        PluggedStation = 1,
        LockedStation = 3,
        PluggedVehicle = 5,
        LockedVehicle = 7,
    }
}

// ============================================================================
// Reports
// ============================================================================

/// The three status reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Report {
    Report1,
    Report2,
    Report3,
}

impl Report {
    pub const ALL: [Report; 3] = [Self::Report1, Self::Report2, Self::Report3];

    /// Number sent in `report N` and echoed in the reply's `ID`
    pub const fn number(self) -> u8 {
        match self {
            Self::Report1 => 1,
            Self::Report2 => 2,
            Self::Report3 => 3,
        }
    }

    pub const fn group(self) -> &'static str {
        match self {
            Self::Report1 => REPORT1,
            Self::Report2 => REPORT2,
            Self::Report3 => REPORT3,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.number() == number)
    }

    pub fn request(self) -> String {
        format!("report {}", self.number())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.group())
    }
}

impl FromStr for Report {
    type Err = GatewayError;

    /// Accepts `report2`, `Report2` or `2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = s
            .trim()
            .to_ascii_lowercase()
            .trim_start_matches("report")
            .parse::<u8>()
            .ok();
        number
            .and_then(Self::from_number)
            .ok_or_else(|| GatewayError::NotFound(format!("report '{}'", s)))
    }
}

// ============================================================================
// Field map
// ============================================================================

const REPORT1: &str = "Report1";
const REPORT2: &str = "Report2";
const REPORT3: &str = "Report3";
const COMMANDS: &str = "Commands";

/// Milli-units on the wire (mA, mW)
const fn milli(name: &'static str, group: &'static str, report: u8, key: &'static str) -> FieldDescriptor {
    FieldDescriptor::report(name, group, report, key, ValueKind::Float).scaled(1000.0)
}

/// Tenths on the wire (0.1 Wh, 0.1 %)
const fn tenth(name: &'static str, group: &'static str, report: u8, key: &'static str) -> FieldDescriptor {
    FieldDescriptor::report(name, group, report, key, ValueKind::Float).scaled(10.0)
}

pub static FIELDS: &[FieldDescriptor] = &[
    // Report 1: product information
    FieldDescriptor::report("Product", REPORT1, 1, "Product", ValueKind::Text),
    FieldDescriptor::report("Serial", REPORT1, 1, "Serial", ValueKind::Text),
    FieldDescriptor::report("Firmware", REPORT1, 1, "Firmware", ValueKind::Text),
    FieldDescriptor::report("ComModule", REPORT1, 1, "COM-module", ValueKind::Unsigned),
    FieldDescriptor::report("Backend", REPORT1, 1, "Backend", ValueKind::Unsigned),
    FieldDescriptor::report("DipSwitch1", REPORT1, 1, "DIP-Sw1", ValueKind::Unsigned),
    FieldDescriptor::report("DipSwitch2", REPORT1, 1, "DIP-Sw2", ValueKind::Unsigned),
    FieldDescriptor::report("Uptime", REPORT1, 1, "Sec", ValueKind::Duration(TimeUnit::Seconds)),
    // Report 2: state and settings
    FieldDescriptor::report("State", REPORT2, 2, "State", ValueKind::Enum(&ChargingState::TYPE)),
    FieldDescriptor::report("Error1", REPORT2, 2, "Error1", ValueKind::Unsigned),
    FieldDescriptor::report("Error2", REPORT2, 2, "Error2", ValueKind::Unsigned),
    FieldDescriptor::report("Plug", REPORT2, 2, "Plug", ValueKind::Enum(&PlugState::TYPE)),
    FieldDescriptor::report("AuthOn", REPORT2, 2, "AuthON", ValueKind::Boolean),
    FieldDescriptor::report("AuthRequired", REPORT2, 2, "Authreq", ValueKind::Boolean),
    FieldDescriptor::report("EnableSys", REPORT2, 2, "Enable sys", ValueKind::Boolean),
    FieldDescriptor::report("EnableUser", REPORT2, 2, "Enable user", ValueKind::Boolean)
        .settable("ena"),
    milli("MaxCurr", REPORT2, 2, "Max curr").unit("A"),
    tenth("MaxCurrPercent", REPORT2, 2, "Max curr %").unit("%"),
    milli("CurrHW", REPORT2, 2, "Curr HW").unit("A"),
    milli("CurrUser", REPORT2, 2, "Curr user").unit("A").settable("curr"),
    milli("CurrFS", REPORT2, 2, "Curr FS").unit("A"),
    FieldDescriptor::report("TmoFS", REPORT2, 2, "Tmo FS", ValueKind::Duration(TimeUnit::Seconds)),
    milli("CurrTimer", REPORT2, 2, "Curr timer").unit("A"),
    FieldDescriptor::report("TmoCT", REPORT2, 2, "Tmo CT", ValueKind::Duration(TimeUnit::Seconds)),
    tenth("Setenergy", REPORT2, 2, "Setenergy").unit("Wh").settable("setenergy"),
    FieldDescriptor::report("Output", REPORT2, 2, "Output", ValueKind::Unsigned).settable("output"),
    FieldDescriptor::report("Input", REPORT2, 2, "Input", ValueKind::Unsigned),
    // Report 3: meter
    FieldDescriptor::report("U1", REPORT3, 3, "U1", ValueKind::Unsigned).unit("V"),
    FieldDescriptor::report("U2", REPORT3, 3, "U2", ValueKind::Unsigned).unit("V"),
    FieldDescriptor::report("U3", REPORT3, 3, "U3", ValueKind::Unsigned).unit("V"),
    milli("I1", REPORT3, 3, "I1").unit("A"),
    milli("I2", REPORT3, 3, "I2").unit("A"),
    milli("I3", REPORT3, 3, "I3").unit("A"),
    milli("P", REPORT3, 3, "P").unit("W"),
    tenth("PF", REPORT3, 3, "PF").unit("%"),
    tenth("EPres", REPORT3, 3, "E pres").unit("Wh"),
    tenth("ETotal", REPORT3, 3, "E total").unit("Wh"),
    // Commands without a readable counterpart
    FieldDescriptor::command("Display", COMMANDS, "display 0 0 0 0", ValueKind::Text),
    FieldDescriptor::command("Unlock", COMMANDS, "unlock", ValueKind::Boolean),
];

/// Validated registry, built on first use
pub fn registry() -> GatewayResult<&'static FieldRegistry> {
    static REGISTRY: OnceLock<Result<FieldRegistry, String>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| FieldRegistry::new(DEVICE, FIELDS).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| GatewayError::config(e.clone()))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use gateway_core::WireLocation;

    #[test]
    fn test_registry_is_valid() {
        let registry = registry().unwrap();
        assert_eq!(registry.len(), FIELDS.len());
        assert!(registry.blocks().is_empty());
        for report in Report::ALL {
            let names = registry.names_in_group(report.group());
            assert!(!names.is_empty(), "{}", report);
            for name in names {
                let field = registry.descriptor(name).unwrap();
                assert_eq!(field.report_number(), Some(report.number()));
            }
        }
    }

    #[test]
    fn test_settable_fields() {
        let registry = registry().unwrap();
        let field = registry.writable("CurrUser").unwrap();
        assert!(field.is_readable());
        assert!(matches!(
            field.location,
            WireLocation::Report {
                report: 2,
                command: Some("curr"),
                ..
            }
        ));
        assert!(!registry.is_writable("P"));
        assert!(!registry.is_readable("Unlock"));
    }

    #[test]
    fn test_report_parse() {
        assert_eq!("report2".parse::<Report>().unwrap(), Report::Report2);
        assert_eq!("Report3".parse::<Report>().unwrap(), Report::Report3);
        assert_eq!("1".parse::<Report>().unwrap(), Report::Report1);
        assert!("report4".parse::<Report>().is_err());
        assert!("meter".parse::<Report>().is_err());
        assert_eq!(Report::Report2.request(), "report 2");
    }
}
