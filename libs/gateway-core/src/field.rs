//! Field descriptors and the per-device field registry
//!
//! Each device family declares a static table of [`FieldDescriptor`]s. The
//! [`FieldRegistry`] built from it is the only place gateways look up wire
//! locations, scale factors and access modes.

use std::collections::{HashMap, HashSet};

use errors::{GatewayError, GatewayResult};
use serde::Serialize;

use crate::transport::modbus::constants::MODBUS_MAX_READ_REGISTERS;
use crate::value::ValueKind;

/// Access mode of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub const fn is_readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    pub const fn is_writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// Where a field lives on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireLocation {
    /// Holding registers, high word first
    Register { offset: u16, length: u16 },
    /// Key inside a numbered text report, with the verb that sets it
    Report {
        report: u8,
        key: &'static str,
        command: Option<&'static str>,
    },
    /// Write-only command verb
    Command { verb: &'static str },
}

/// Static metadata for one named field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub group: &'static str,
    pub location: WireLocation,
    pub scale: f64,
    pub access: AccessMode,
    pub kind: ValueKind,
    pub unit: &'static str,
}

impl FieldDescriptor {
    /// Read-only register field with scale 1
    pub const fn register(
        name: &'static str,
        group: &'static str,
        offset: u16,
        length: u16,
        kind: ValueKind,
    ) -> Self {
        Self {
            name,
            group,
            location: WireLocation::Register { offset, length },
            scale: 1.0,
            access: AccessMode::ReadOnly,
            kind,
            unit: "",
        }
    }

    /// Read-only report field with scale 1
    pub const fn report(
        name: &'static str,
        group: &'static str,
        report: u8,
        key: &'static str,
        kind: ValueKind,
    ) -> Self {
        Self {
            name,
            group,
            location: WireLocation::Report {
                report,
                key,
                command: None,
            },
            scale: 1.0,
            access: AccessMode::ReadOnly,
            kind,
            unit: "",
        }
    }

    /// Write-only command
    pub const fn command(
        name: &'static str,
        group: &'static str,
        verb: &'static str,
        kind: ValueKind,
    ) -> Self {
        Self {
            name,
            group,
            location: WireLocation::Command { verb },
            scale: 1.0,
            access: AccessMode::WriteOnly,
            kind,
            unit: "",
        }
    }

    pub const fn scaled(self, scale: f64) -> Self {
        Self { scale, ..self }
    }

    pub const fn unit(self, unit: &'static str) -> Self {
        Self { unit, ..self }
    }

    pub const fn access(self, access: AccessMode) -> Self {
        Self { access, ..self }
    }

    /// Make a report field writable through the given verb
    pub const fn settable(self, verb: &'static str) -> Self {
        let location = match self.location {
            WireLocation::Report { report, key, .. } => WireLocation::Report {
                report,
                key,
                command: Some(verb),
            },
            other => other,
        };
        Self {
            location,
            access: AccessMode::ReadWrite,
            ..self
        }
    }

    pub fn is_readable(&self) -> bool {
        self.access.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.access.is_writable()
    }

    /// Register range `[offset, offset + length)` for register fields
    pub fn register_range(&self) -> Option<(u16, u16)> {
        match self.location {
            WireLocation::Register { offset, length } => Some((offset, length)),
            _ => None,
        }
    }

    /// Report number for report fields
    pub fn report_number(&self) -> Option<u8> {
        match self.location {
            WireLocation::Report { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Contiguous register range fetched by one block read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterBlock {
    pub start: u16,
    pub count: u16,
}

impl RegisterBlock {
    pub const fn new(start: u16, count: u16) -> Self {
        Self { start, count }
    }

    pub fn end(&self) -> u32 {
        u32::from(self.start) + u32::from(self.count)
    }

    pub fn covers(&self, offset: u16, length: u16) -> bool {
        offset >= self.start && u32::from(offset) + u32::from(length) <= self.end()
    }
}

/// Validated, indexed view over a static descriptor table
#[derive(Debug)]
pub struct FieldRegistry {
    device: &'static str,
    fields: &'static [FieldDescriptor],
    index: HashMap<&'static str, usize>,
    blocks: Vec<RegisterBlock>,
}

impl FieldRegistry {
    /// Build and validate a registry
    ///
    /// Rejects duplicate names, non-positive scales, register lengths other
    /// than one or two words, overlapping register ranges, text fields on
    /// registers and writable report fields without a verb.
    pub fn new(device: &'static str, fields: &'static [FieldDescriptor]) -> GatewayResult<Self> {
        let mut index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if index.insert(field.name, i).is_some() {
                return Err(GatewayError::config(format!(
                    "{}: duplicate field name '{}'",
                    device, field.name
                )));
            }
            if !(field.scale.is_finite() && field.scale > 0.0) {
                return Err(GatewayError::config(format!(
                    "{}: field '{}' has invalid scale {}",
                    device, field.name, field.scale
                )));
            }
            match field.location {
                WireLocation::Register { length, .. } => {
                    if !(1..=2).contains(&length) {
                        return Err(GatewayError::config(format!(
                            "{}: field '{}' spans {} registers (1 or 2 supported)",
                            device, field.name, length
                        )));
                    }
                    if field.kind == ValueKind::Text {
                        return Err(GatewayError::config(format!(
                            "{}: text field '{}' cannot live in registers",
                            device, field.name
                        )));
                    }
                },
                WireLocation::Report { command, .. } => {
                    if field.is_writable() && command.is_none() {
                        return Err(GatewayError::config(format!(
                            "{}: writable field '{}' has no command verb",
                            device, field.name
                        )));
                    }
                },
                WireLocation::Command { .. } => {
                    if field.is_readable() {
                        return Err(GatewayError::config(format!(
                            "{}: command '{}' cannot be readable",
                            device, field.name
                        )));
                    }
                },
            }
        }

        let mut ranges: Vec<(u16, u16, &str)> = fields
            .iter()
            .filter_map(|f| f.register_range().map(|(offset, length)| (offset, length, f.name)))
            .collect();
        ranges.sort_by_key(|(offset, _, _)| *offset);
        for pair in ranges.windows(2) {
            let (offset, length, name) = pair[0];
            let (next_offset, _, next_name) = pair[1];
            if u32::from(offset) + u32::from(length) > u32::from(next_offset) {
                return Err(GatewayError::config(format!(
                    "{}: register ranges of '{}' and '{}' overlap",
                    device, name, next_name
                )));
            }
        }

        Ok(Self {
            device,
            fields,
            index,
            blocks: Vec::new(),
        })
    }

    /// Attach block reads; every readable register field must be covered
    pub fn with_blocks(mut self, blocks: &[RegisterBlock]) -> GatewayResult<Self> {
        for block in blocks {
            if block.count == 0 || usize::from(block.count) > MODBUS_MAX_READ_REGISTERS {
                return Err(GatewayError::config(format!(
                    "{}: block at {} reads {} registers (1..={} allowed)",
                    self.device, block.start, block.count, MODBUS_MAX_READ_REGISTERS
                )));
            }
        }
        for field in self.fields.iter().filter(|f| f.is_readable()) {
            if let Some((offset, length)) = field.register_range() {
                if !blocks.iter().any(|b| b.covers(offset, length)) {
                    return Err(GatewayError::config(format!(
                        "{}: field '{}' is not covered by any block",
                        self.device, field.name
                    )));
                }
            }
        }
        self.blocks = blocks.to_vec();
        Ok(self)
    }

    pub fn device(&self) -> &'static str {
        self.device
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.fields
    }

    pub fn blocks(&self) -> &[RegisterBlock] {
        &self.blocks
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Descriptor for a name, `NotFound` if unknown
    pub fn descriptor(&self, name: &str) -> GatewayResult<&'static FieldDescriptor> {
        let fields = self.fields;
        self.index_of(name)
            .map(|i| &fields[i])
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))
    }

    pub fn is_readable(&self, name: &str) -> bool {
        self.descriptor(name).is_ok_and(|d| d.is_readable())
    }

    pub fn is_writable(&self, name: &str) -> bool {
        self.descriptor(name).is_ok_and(|d| d.is_writable())
    }

    /// Descriptor of a readable field, failing with `NotFound`/`NotReadable`
    pub fn readable(&self, name: &str) -> GatewayResult<&'static FieldDescriptor> {
        let descriptor = self.descriptor(name)?;
        if descriptor.is_readable() {
            Ok(descriptor)
        } else {
            Err(GatewayError::NotReadable(name.to_string()))
        }
    }

    /// Descriptor of a writable field, failing with `NotFound`/`NotWritable`
    pub fn writable(&self, name: &str) -> GatewayResult<&'static FieldDescriptor> {
        let descriptor = self.descriptor(name)?;
        if descriptor.is_writable() {
            Ok(descriptor)
        } else {
            Err(GatewayError::NotWritable(name.to_string()))
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    pub fn readable_names(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.is_readable())
            .map(|f| f.name)
            .collect()
    }

    /// Field names of a group, in declaration order
    pub fn names_in_group(&self, group: &str) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.group == group)
            .map(|f| f.name)
            .collect()
    }

    pub fn groups(&self) -> Vec<&'static str> {
        let mut groups: Vec<&'static str> = Vec::new();
        for field in self.fields {
            if !groups.contains(&field.group) {
                groups.push(field.group);
            }
        }
        groups
    }

    /// Registered names among `names`, in declaration order, without duplicates
    pub fn intersect<S: AsRef<str>>(&self, names: &[S]) -> Vec<&'static str> {
        let wanted: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.fields
            .iter()
            .filter(|f| wanted.contains(f.name))
            .map(|f| f.name)
            .collect()
    }

    /// Readable register fields inside a block
    pub fn fields_in_block(
        &self,
        block: &RegisterBlock,
    ) -> impl Iterator<Item = &'static FieldDescriptor> + '_ {
        let block = *block;
        self.fields.iter().filter(move |f| {
            f.is_readable()
                && f
                    .register_range()
                    .is_some_and(|(offset, length)| block.covers(offset, length))
        })
    }
}
