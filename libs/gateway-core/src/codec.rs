//! Value codec
//!
//! Conversion happens in two steps. The wire adapters turn register words or
//! report tokens into a raw `i64` (and back); [`decode`]/[`encode`] map that
//! raw integer to a typed [`FieldValue`] by dispatching on the descriptor's
//! value kind and applying its scale.

use chrono::{DateTime, TimeDelta};
use errors::{GatewayError, GatewayResult};

use crate::field::FieldDescriptor;
use crate::value::{FieldValue, TimeUnit, ValueKind};

// ============================================================================
// Raw <-> typed
// ============================================================================

/// Decode a raw wire integer into the field's typed value
pub fn decode(field: &FieldDescriptor, raw: i64) -> GatewayResult<FieldValue> {
    match field.kind {
        ValueKind::Float => Ok(FieldValue::Float(raw as f64 / field.scale)),
        ValueKind::Unsigned => u32::try_from(raw)
            .map(FieldValue::Unsigned)
            .map_err(|_| GatewayError::out_of_range(raw, u32::MIN, u32::MAX)),
        ValueKind::Signed => i32::try_from(raw)
            .map(FieldValue::Signed)
            .map_err(|_| GatewayError::out_of_range(raw, i32::MIN, i32::MAX)),
        ValueKind::Boolean => Ok(FieldValue::Boolean(raw != 0)),
        ValueKind::Duration(unit) => {
            let duration = match unit {
                TimeUnit::Seconds => TimeDelta::try_seconds(raw),
                TimeUnit::Minutes => TimeDelta::try_minutes(raw),
            };
            duration
                .map(FieldValue::Duration)
                .ok_or_else(|| GatewayError::out_of_range(raw, "duration min", "duration max"))
        },
        ValueKind::Timestamp => DateTime::from_timestamp(raw, 0)
            .map(FieldValue::Timestamp)
            .ok_or_else(|| GatewayError::out_of_range(raw, "timestamp min", "timestamp max")),
        ValueKind::Enum(ty) => {
            let value = u32::try_from(raw)
                .ok()
                .filter(|v| ty.contains(*v))
                .ok_or_else(|| {
                    GatewayError::decoding(format!(
                        "{}: {} is not a {} value",
                        field.name, raw, ty.name
                    ))
                })?;
            Ok(FieldValue::Enum { ty, value })
        },
        ValueKind::Text => Err(GatewayError::decoding(format!(
            "{}: text field has no integer form",
            field.name
        ))),
    }
}

/// Encode a typed value into the raw wire integer
pub fn encode(field: &FieldDescriptor, value: &FieldValue) -> GatewayResult<i64> {
    if !field.kind.matches(value) {
        return Err(GatewayError::internal(format!(
            "{}: value {:?} does not match kind {:?}",
            field.name, value, field.kind
        )));
    }
    match value {
        FieldValue::Float(v) => {
            let scaled = (v * field.scale).round();
            if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
                return Err(GatewayError::out_of_range(v, i64::MIN, i64::MAX));
            }
            Ok(scaled as i64)
        },
        FieldValue::Unsigned(v) => Ok(i64::from(*v)),
        FieldValue::Signed(v) => Ok(i64::from(*v)),
        FieldValue::Boolean(v) => Ok(i64::from(*v)),
        FieldValue::Duration(d) => match field.kind {
            ValueKind::Duration(TimeUnit::Minutes) => {
                if d.num_seconds() % 60 != 0 {
                    return Err(GatewayError::encoding(format!(
                        "{}: {} is not a whole number of minutes",
                        field.name, value
                    )));
                }
                Ok(d.num_minutes())
            },
            _ => Ok(d.num_seconds()),
        },
        FieldValue::Timestamp(ts) => Ok(ts.timestamp()),
        FieldValue::Enum { value, .. } => Ok(i64::from(*value)),
        FieldValue::Text(_) => Err(GatewayError::NotWritable(format!(
            "{}: text has no integer form",
            field.name
        ))),
    }
}

// ============================================================================
// Register adapter
// ============================================================================

/// Join one or two registers (high word first) into a raw integer
pub fn registers_to_raw(words: &[u16], signed: bool) -> GatewayResult<i64> {
    match (words, signed) {
        ([word], false) => Ok(i64::from(*word)),
        ([word], true) => Ok(i64::from(*word as i16)),
        ([high, low], signed) => {
            let joined = (u32::from(*high) << 16) | u32::from(*low);
            if signed {
                Ok(i64::from(joined as i32))
            } else {
                Ok(i64::from(joined))
            }
        },
        _ => Err(GatewayError::decoding(format!(
            "expected 1 or 2 registers, got {}",
            words.len()
        ))),
    }
}

/// Split a raw integer into `length` registers, high word first
pub fn raw_to_registers(raw: i64, length: u16, signed: bool) -> GatewayResult<Vec<u16>> {
    let (min, max) = match (length, signed) {
        (1, false) => (0, i64::from(u16::MAX)),
        (1, true) => (i64::from(i16::MIN), i64::from(i16::MAX)),
        (2, false) => (0, i64::from(u32::MAX)),
        (2, true) => (i64::from(i32::MIN), i64::from(i32::MAX)),
        _ => {
            return Err(GatewayError::internal(format!(
                "unsupported register length {}",
                length
            )))
        },
    };
    if raw < min || raw > max {
        return Err(GatewayError::out_of_range(raw, min, max));
    }
    let bits = raw as u32;
    if length == 1 {
        Ok(vec![bits as u16])
    } else {
        Ok(vec![(bits >> 16) as u16, bits as u16])
    }
}

/// Decode a register field from its words
pub fn decode_registers(field: &FieldDescriptor, words: &[u16]) -> GatewayResult<FieldValue> {
    let raw = registers_to_raw(words, field.kind.is_signed())?;
    decode(field, raw)
}

/// Encode a value into the words of a register field
pub fn encode_registers(field: &FieldDescriptor, value: &FieldValue) -> GatewayResult<Vec<u16>> {
    let (_, length) = field.register_range().ok_or_else(|| {
        GatewayError::internal(format!("{}: not a register field", field.name))
    })?;
    let raw = encode(field, value)?;
    raw_to_registers(raw, length, field.kind.is_signed())
}

// ============================================================================
// Text report adapter
// ============================================================================

/// Decode a field from a JSON report token (number or numeric string)
pub fn decode_json(field: &FieldDescriptor, token: &serde_json::Value) -> GatewayResult<FieldValue> {
    if field.kind == ValueKind::Text {
        return match token {
            serde_json::Value::String(s) => Ok(FieldValue::Text(s.trim().to_string())),
            serde_json::Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
            other => Err(GatewayError::decoding(format!(
                "{}: expected text, got {}",
                field.name, other
            ))),
        };
    }

    let raw = match token {
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i,
            // fractional numbers only make sense for scaled floats
            (None, Some(f)) if field.kind == ValueKind::Float => {
                return Ok(FieldValue::Float(f / field.scale))
            },
            _ => {
                return Err(GatewayError::decoding(format!(
                    "{}: {} is not an integer",
                    field.name, n
                )))
            },
        },
        serde_json::Value::String(s) => parse_raw_token(s.trim()).ok_or_else(|| {
            GatewayError::decoding(format!("{}: '{}' is not numeric", field.name, s))
        })?,
        other => {
            return Err(GatewayError::decoding(format!(
                "{}: unexpected token {}",
                field.name, other
            )))
        },
    };
    decode(field, raw)
}

/// Render a value as a command argument
///
/// Text is sent verbatim with spaces replaced by `$`, everything else as the
/// raw integer.
pub fn encode_token(field: &FieldDescriptor, value: &FieldValue) -> GatewayResult<String> {
    match value {
        FieldValue::Text(text) => Ok(text.replace(' ', "$")),
        other => encode(field, other).map(|raw| raw.to_string()),
    }
}

fn parse_raw_token(token: &str) -> Option<i64> {
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).ok();
    }
    token.parse().ok()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::field::AccessMode;

    crate::device_enum! {
        enum State {
            Off = 0,
            Heating = 3,
        }
    }

    fn float(scale: f64) -> FieldDescriptor {
        FieldDescriptor::register("X", "G", 0, 2, ValueKind::Float).scaled(scale)
    }

    #[test]
    fn test_scaled_float_decode() {
        // 12345 with scale 100 reads as 123.45
        let value = decode_registers(&float(100.0), &[0, 12345]).unwrap();
        assert_eq!(value, FieldValue::Float(123.45));
    }

    #[test]
    fn test_negative_float_two_registers() {
        let field = float(10.0);
        let words = encode_registers(&field, &FieldValue::Float(-5.5)).unwrap();
        assert_eq!(words, vec![0xFFFF, 0xFFC9]);
        assert_eq!(decode_registers(&field, &words).unwrap(), FieldValue::Float(-5.5));
    }

    #[test]
    fn test_float_round_trip_within_scale() {
        let field = float(10.0);
        for v in [0.0, 21.5, -12.3, 99.9, 6553.5] {
            let raw = encode(&field, &FieldValue::Float(v)).unwrap();
            let back = decode(&field, raw).unwrap().as_f64().unwrap();
            assert!((back - v).abs() < 0.05, "{} -> {}", v, back);
            assert_eq!(encode(&field, &FieldValue::Float(back)).unwrap(), raw);
        }
    }

    #[test]
    fn test_minutes_duration_round_trip() {
        let field = FieldDescriptor::register(
            "OnTime",
            "G",
            0,
            2,
            ValueKind::Duration(TimeUnit::Minutes),
        )
        .access(AccessMode::ReadWrite);
        let value = field.kind.parse("21:00:00").unwrap();
        let words = encode_registers(&field, &value).unwrap();
        assert_eq!(words, vec![0, 1260]);
        assert_eq!(decode_registers(&field, &words).unwrap().to_string(), "21:00:00");

        let odd = field.kind.parse("21:00:30").unwrap();
        assert!(matches!(
            encode(&field, &odd),
            Err(GatewayError::Encoding(_))
        ));
    }

    #[test]
    fn test_timestamp_codec() {
        let field = FieldDescriptor::register("Clock", "G", 0, 2, ValueKind::Timestamp);
        let value = decode(&field, 1_709_290_800).unwrap();
        assert_eq!(value.to_string(), "2024-03-01T11:00:00+00:00");
        assert_eq!(encode(&field, &value).unwrap(), 1_709_290_800);
    }

    #[test]
    fn test_enum_decode_unknown_value_fails() {
        let field = FieldDescriptor::register("State", "G", 0, 1, ValueKind::Enum(&State::TYPE));
        assert_eq!(decode(&field, 3).unwrap().to_string(), "Heating");
        assert!(matches!(decode(&field, 7), Err(GatewayError::Decoding(_))));
        assert!(matches!(decode(&field, -1), Err(GatewayError::Decoding(_))));
    }

    #[test]
    fn test_register_overflow_is_out_of_range() {
        let field = FieldDescriptor::register("Small", "G", 0, 1, ValueKind::Unsigned);
        assert!(matches!(
            encode_registers(&field, &FieldValue::Unsigned(70_000)),
            Err(GatewayError::OutOfRange { .. })
        ));
        assert!(matches!(
            encode_registers(&float(1000.0), &FieldValue::Float(5_000_000.0)),
            Err(GatewayError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_register_join_split() {
        assert_eq!(registers_to_raw(&[0x0001, 0x0002], false).unwrap(), 65538);
        assert_eq!(registers_to_raw(&[0xFFFF], true).unwrap(), -1);
        assert_eq!(registers_to_raw(&[0xFFFF], false).unwrap(), 65535);
        assert!(registers_to_raw(&[1, 2, 3], false).is_err());
        assert_eq!(raw_to_registers(65538, 2, false).unwrap(), vec![1, 2]);
        assert_eq!(raw_to_registers(-1, 1, true).unwrap(), vec![0xFFFF]);
    }

    #[test]
    fn test_json_tokens() {
        let current = FieldDescriptor::report("Curr", "R2", 2, "Curr user", ValueKind::Float)
            .scaled(1000.0);
        assert_eq!(
            decode_json(&current, &serde_json::json!(16000)).unwrap(),
            FieldValue::Float(16.0)
        );
        assert_eq!(
            decode_json(&current, &serde_json::json!("6000")).unwrap(),
            FieldValue::Float(6.0)
        );
        assert!(matches!(
            decode_json(&current, &serde_json::json!(null)),
            Err(GatewayError::Decoding(_))
        ));

        let dip = FieldDescriptor::report("Dip", "R1", 1, "DIP-Sw1", ValueKind::Unsigned);
        assert_eq!(
            decode_json(&dip, &serde_json::json!("0x22")).unwrap(),
            FieldValue::Unsigned(0x22)
        );

        let serial = FieldDescriptor::report("Serial", "R1", 1, "Serial", ValueKind::Text);
        assert_eq!(
            decode_json(&serial, &serde_json::json!(16314582)).unwrap(),
            FieldValue::Text("16314582".to_string())
        );
    }

    #[test]
    fn test_command_tokens() {
        let current = FieldDescriptor::report("Curr", "R2", 2, "Curr user", ValueKind::Float)
            .scaled(1000.0)
            .settable("curr");
        assert_eq!(encode_token(&current, &FieldValue::Float(16.0)).unwrap(), "16000");

        let display = FieldDescriptor::command("Display", "Commands", "display 0 0 0 0", ValueKind::Text);
        assert_eq!(
            encode_token(&display, &FieldValue::Text("Hello EV".into())).unwrap(),
            "Hello$EV"
        );
    }

    #[test]
    fn test_kind_mismatch_is_internal() {
        assert!(matches!(
            encode(&float(1.0), &FieldValue::Unsigned(1)),
            Err(GatewayError::Internal(_))
        ));
    }
}
