//! Typed field values
//!
//! [`FieldValue`] is the tagged union stored in a data table. [`ValueKind`]
//! is the tag a field descriptor declares; text coming from a CLI or REST
//! caller is parsed by dispatching on that tag, never on the current value.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use errors::{GatewayError, GatewayResult};
use serde::{Serialize, Serializer};

/// Unit of a raw duration count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
}

/// Static description of a device enumeration
#[derive(Debug, PartialEq, Eq)]
pub struct EnumType {
    pub name: &'static str,
    pub variants: &'static [(u32, &'static str)],
}

impl EnumType {
    pub fn name_of(&self, value: u32) -> Option<&'static str> {
        self.variants
            .iter()
            .find(|(raw, _)| *raw == value)
            .map(|(_, name)| *name)
    }

    /// Case-insensitive lookup by constant name
    pub fn value_of(&self, name: &str) -> Option<u32> {
        self.variants
            .iter()
            .find(|(_, variant)| variant.eq_ignore_ascii_case(name))
            .map(|(raw, _)| *raw)
    }

    pub fn contains(&self, value: u32) -> bool {
        self.name_of(value).is_some()
    }

    pub fn first(&self) -> u32 {
        self.variants.first().map(|(raw, _)| *raw).unwrap_or_default()
    }
}

/// Declares a device enumeration together with its [`EnumType`] table
///
/// ```ignore
/// device_enum! {
///     /// Boiler operating state
///     pub enum BoilerState {
///         Off = 0,
///         Heating = 3,
///     }
/// }
/// let kind = ValueKind::Enum(&BoilerState::TYPE);
/// ```
#[macro_export]
macro_rules! device_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $first:ident = $first_value:literal
            $(, $variant:ident = $value:literal)* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        #[repr(u32)]
        $vis enum $name {
            $first = $first_value,
            $($variant = $value,)*
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$first
            }
        }

        impl $name {
            pub const TYPE: $crate::value::EnumType = $crate::value::EnumType {
                name: stringify!($name),
                variants: &[
                    ($first_value, stringify!($first)),
                    $(($value, stringify!($variant)),)*
                ],
            };

            pub fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $first_value => Some(Self::$first),
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

/// Explicit value kind carried by every field descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueKind {
    Float,
    Unsigned,
    Signed,
    Boolean,
    Duration(TimeUnit),
    Timestamp,
    Enum(&'static EnumType),
    Text,
}

impl ValueKind {
    /// Value a data table holds before the first successful read
    pub fn default_value(&self) -> FieldValue {
        match self {
            Self::Float => FieldValue::Float(0.0),
            Self::Unsigned => FieldValue::Unsigned(0),
            Self::Signed => FieldValue::Signed(0),
            Self::Boolean => FieldValue::Boolean(false),
            Self::Duration(_) => FieldValue::Duration(TimeDelta::zero()),
            Self::Timestamp => FieldValue::Timestamp(DateTime::<Utc>::default()),
            Self::Enum(ty) => FieldValue::Enum {
                ty,
                value: ty.first(),
            },
            Self::Text => FieldValue::Text(String::new()),
        }
    }

    /// Whether the wire integer is two's complement
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Float | Self::Signed)
    }

    pub fn matches(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::Enum(ty), FieldValue::Enum { ty: other, .. }) => ty == other,
            (Self::Float, FieldValue::Float(_))
            | (Self::Unsigned, FieldValue::Unsigned(_))
            | (Self::Signed, FieldValue::Signed(_))
            | (Self::Boolean, FieldValue::Boolean(_))
            | (Self::Duration(_), FieldValue::Duration(_))
            | (Self::Timestamp, FieldValue::Timestamp(_))
            | (Self::Text, FieldValue::Text(_)) => true,
            _ => false,
        }
    }

    /// Parse caller supplied text into a value of this kind
    ///
    /// Failures are `GatewayError::Encoding`: the text cannot be turned into
    /// something the device could be sent.
    pub fn parse(&self, text: &str) -> GatewayResult<FieldValue> {
        let text = text.trim();
        match self {
            Self::Float => {
                let value: f64 = text.parse()?;
                if !value.is_finite() {
                    return Err(GatewayError::encoding(format!("'{}' is not a finite number", text)));
                }
                Ok(FieldValue::Float(value))
            },
            Self::Unsigned => Ok(FieldValue::Unsigned(text.parse()?)),
            Self::Signed => Ok(FieldValue::Signed(text.parse()?)),
            Self::Boolean => parse_bool(text).map(FieldValue::Boolean),
            Self::Duration(_) => parse_duration(text).map(FieldValue::Duration),
            Self::Timestamp => parse_timestamp(text).map(FieldValue::Timestamp),
            Self::Enum(ty) => {
                let value = match text.parse::<u32>() {
                    Ok(raw) if ty.contains(raw) => raw,
                    Ok(raw) => {
                        return Err(GatewayError::encoding(format!(
                            "{} is not a {} value",
                            raw, ty.name
                        )))
                    },
                    Err(_) => ty.value_of(text).ok_or_else(|| {
                        GatewayError::encoding(format!("'{}' is not a {} constant", text, ty.name))
                    })?,
                };
                Ok(FieldValue::Enum { ty, value })
            },
            Self::Text => Ok(FieldValue::Text(text.to_string())),
        }
    }
}

/// Tagged value of one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Unsigned(u32),
    Signed(i32),
    Boolean(bool),
    Duration(TimeDelta),
    Timestamp(DateTime<Utc>),
    Enum { ty: &'static EnumType, value: u32 },
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Unsigned(v) => Some(f64::from(*v)),
            Self::Signed(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Unsigned(v) => Some(*v),
            Self::Enum { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<TimeDelta> {
        match self {
            Self::Duration(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// JSON form used by snapshots and the REST API
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Float(v) => serde_json::json!(v),
            Self::Unsigned(v) => serde_json::json!(v),
            Self::Signed(v) => serde_json::json!(v),
            Self::Boolean(v) => serde_json::json!(v),
            Self::Duration(_) | Self::Enum { .. } | Self::Text(_) => {
                serde_json::Value::String(self.to_string())
            },
            Self::Timestamp(v) => serde_json::Value::String(v.to_rfc3339()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::Signed(v) => write!(f, "{}", v),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Duration(v) => f.write_str(&format_duration(*v)),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Enum { ty, value } => match ty.name_of(*value) {
                Some(name) => f.write_str(name),
                None => write!(f, "{}", value),
            },
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Render a duration as `HH:MM:SS`, or `D.HH:MM:SS` from one day on
pub fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let (hours, minutes, seconds) = (rest / 3600, (rest % 3600) / 60, rest % 60);
    if days > 0 {
        format!("{sign}{days}.{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// `#[serde(serialize_with)]` helper writing a duration as `HH:MM:SS`
pub fn serialize_duration<S: Serializer>(duration: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*duration))
}

/// Parse `HH:MM`, `HH:MM:SS` or `D.HH:MM:SS`
pub fn parse_duration(text: &str) -> GatewayResult<TimeDelta> {
    let invalid = || GatewayError::encoding(format!("'{}' is not a duration (HH:MM:SS)", text));

    let (days, clock) = match text.split_once('.') {
        Some((days, clock)) => (days.parse::<i64>().map_err(|_| invalid())?, clock),
        None => (0, text),
    };

    let parts = clock
        .split(':')
        .map(|part| part.parse::<i64>().map_err(|_| invalid()))
        .collect::<GatewayResult<Vec<_>>>()?;
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(invalid()),
    };
    if days < 0 || !(0..24).contains(&hours) || !(0..60).contains(&minutes) || !(0..60).contains(&seconds)
    {
        return Err(invalid());
    }

    TimeDelta::try_seconds(days * 86_400 + hours * 3600 + minutes * 60 + seconds).ok_or_else(invalid)
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or Unix seconds
pub fn parse_timestamp(text: &str) -> GatewayResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(seconds) = text.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| GatewayError::out_of_range(seconds, "timestamp min", "timestamp max"));
    }
    Err(GatewayError::encoding(format!("'{}' is not a timestamp", text)))
}

fn parse_bool(text: &str) -> GatewayResult<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(GatewayError::encoding(format!("'{}' is not a boolean", text))),
    }
}
