//! Device data table
//!
//! The master data object of a gateway: one slot per registered field, in
//! declaration order, each holding the current value and when it was last
//! updated. Subsystem views are projected from it on demand.

use chrono::{DateTime, TimeDelta, Utc};
use errors::{GatewayError, GatewayResult};

use crate::field::FieldRegistry;
use crate::value::FieldValue;

/// Current value of one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    pub value: FieldValue,
    pub updated: Option<DateTime<Utc>>,
}

/// Values of every field of one device
#[derive(Debug, Clone)]
pub struct DataTable {
    registry: &'static FieldRegistry,
    slots: Vec<FieldSlot>,
}

impl DataTable {
    /// Table with every field at its kind's default value
    pub fn new(registry: &'static FieldRegistry) -> Self {
        let slots = registry
            .fields()
            .iter()
            .map(|f| FieldSlot {
                value: f.kind.default_value(),
                updated: None,
            })
            .collect();
        Self { registry, slots }
    }

    pub fn registry(&self) -> &'static FieldRegistry {
        self.registry
    }

    pub fn slot(&self, name: &str) -> Option<&FieldSlot> {
        self.registry.index_of(name).and_then(|i| self.slots.get(i))
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.slot(name).map(|s| &s.value)
    }

    pub fn updated(&self, name: &str) -> Option<DateTime<Utc>> {
        self.slot(name).and_then(|s| s.updated)
    }

    /// Store a decoded value
    pub fn set(&mut self, name: &str, value: FieldValue, at: DateTime<Utc>) -> GatewayResult<()> {
        let index = self
            .registry
            .index_of(name)
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))?;
        let kind = self.registry.fields()[index].kind;
        if !kind.matches(&value) {
            return Err(GatewayError::internal(format!(
                "{}: cannot store {:?} in a {:?} field",
                name, value, kind
            )));
        }
        self.slots[index] = FieldSlot {
            value,
            updated: Some(at),
        };
        Ok(())
    }

    /// Copy the named slots from a scratch table in one step
    pub fn commit_from<S: AsRef<str>>(&mut self, scratch: &DataTable, names: &[S]) {
        for name in names {
            if let Some(index) = self.registry.index_of(name.as_ref()) {
                if let Some(slot) = scratch.slots.get(index) {
                    self.slots[index] = slot.clone();
                }
            }
        }
    }

    /// Most recent update among the fields of a group
    pub fn last_updated(&self, group: &str) -> Option<DateTime<Utc>> {
        self.registry
            .fields()
            .iter()
            .zip(&self.slots)
            .filter(|(f, _)| f.group == group)
            .filter_map(|(_, s)| s.updated)
            .max()
    }

    /// JSON object `{name: value}` for the given fields
    pub fn snapshot<S: AsRef<str>>(&self, names: &[S]) -> serde_json::Map<String, serde_json::Value> {
        names
            .iter()
            .filter_map(|name| {
                self.get(name.as_ref())
                    .map(|v| (name.as_ref().to_string(), v.to_json()))
            })
            .collect()
    }

    /// JSON object of every field
    pub fn to_json(&self) -> serde_json::Value {
        let names: Vec<&str> = self.registry.names().collect();
        serde_json::Value::Object(self.snapshot(&names))
    }

    // ------------------------------------------------------------------
    // Typed accessors used by the device views; unknown names or other
    // kinds read as the zero value
    // ------------------------------------------------------------------

    pub fn float(&self, name: &str) -> f64 {
        self.get(name).and_then(FieldValue::as_f64).unwrap_or_default()
    }

    pub fn unsigned(&self, name: &str) -> u32 {
        self.get(name).and_then(FieldValue::as_u32).unwrap_or_default()
    }

    pub fn boolean(&self, name: &str) -> bool {
        self.get(name).and_then(FieldValue::as_bool).unwrap_or_default()
    }

    pub fn duration(&self, name: &str) -> TimeDelta {
        self.get(name)
            .and_then(FieldValue::as_duration)
            .unwrap_or_else(TimeDelta::zero)
    }

    pub fn timestamp(&self, name: &str) -> DateTime<Utc> {
        self.get(name)
            .and_then(FieldValue::as_timestamp)
            .unwrap_or_default()
    }

    pub fn text(&self, name: &str) -> String {
        self.get(name)
            .and_then(FieldValue::as_text)
            .map(str::to_string)
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;
    use crate::value::ValueKind;
    use std::sync::OnceLock;

    static FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor::register("A", "One", 0, 2, ValueKind::Float).scaled(10.0),
        FieldDescriptor::register("B", "One", 2, 2, ValueKind::Unsigned),
        FieldDescriptor::register("C", "Two", 4, 1, ValueKind::Boolean),
    ];

    fn registry() -> &'static FieldRegistry {
        static REGISTRY: OnceLock<FieldRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| FieldRegistry::new("test", FIELDS).unwrap())
    }

    #[test]
    fn test_defaults_and_set() {
        let mut table = DataTable::new(registry());
        assert_eq!(table.float("A"), 0.0);
        assert_eq!(table.updated("A"), None);

        let now = Utc::now();
        table.set("A", FieldValue::Float(21.5), now).unwrap();
        assert_eq!(table.float("A"), 21.5);
        assert_eq!(table.updated("A"), Some(now));
        assert_eq!(table.last_updated("One"), Some(now));
        assert_eq!(table.last_updated("Two"), None);

        assert!(table.set("Nope", FieldValue::Float(1.0), now).is_err());
        assert!(table.set("B", FieldValue::Float(1.0), now).is_err());
    }

    #[test]
    fn test_commit_from_scratch_only_touches_named_fields() {
        let mut live = DataTable::new(registry());
        let mut scratch = live.clone();
        let now = Utc::now();
        scratch.set("A", FieldValue::Float(1.0), now).unwrap();
        scratch.set("B", FieldValue::Unsigned(2), now).unwrap();

        live.commit_from(&scratch, &["A"]);
        assert_eq!(live.float("A"), 1.0);
        assert_eq!(live.unsigned("B"), 0);
    }

    #[test]
    fn test_snapshot_json() {
        let mut table = DataTable::new(registry());
        table.set("C", FieldValue::Boolean(true), Utc::now()).unwrap();
        let json = table.to_json();
        assert_eq!(json["A"], serde_json::json!(0.0));
        assert_eq!(json["C"], serde_json::json!(true));
        assert_eq!(table.snapshot(&["B"]).len(), 1);
    }
}
