//! Register-mapped device gateway
//!
//! [`RegisterGateway`] implements the bulk, block, single-property and batch
//! operations once for any device whose fields live in Modbus registers.
//! Device crates compose it with their own registry and views.
//!
//! Every operation:
//! - validates names against the registry before touching the transport,
//! - runs between [`OperationGuard::begin`] and [`Session::end`],
//! - converts every failure into exactly one [`DataStatus`].

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use errors::{GatewayError, GatewayResult};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::data::DataTable;
use crate::field::{FieldDescriptor, FieldRegistry, WireLocation};
use crate::guard::{OperationGuard, Session};
use crate::status::{DataStatus, StatusCode};
use crate::transport::RegisterTransport;
use crate::value::FieldValue;

/// Log the outcome of an operation once and hand the status back
pub fn log_status(device: &str, operation: &str, status: DataStatus) -> DataStatus {
    if status.is_good() {
        debug!("{} {}: {}", device, operation, status);
    } else if status.status_code() == StatusCode::BadInternalError {
        error!("{} {}: {}", device, operation, status);
    } else {
        warn!("{} {}: {}", device, operation, status);
    }
    status
}

/// Generic gateway over a register transport
pub struct RegisterGateway<T: RegisterTransport> {
    registry: &'static FieldRegistry,
    guard: OperationGuard<T>,
    data: RwLock<DataTable>,
    startup_ok: AtomicBool,
}

impl<T: RegisterTransport> RegisterGateway<T> {
    pub fn new(registry: &'static FieldRegistry, transport: T) -> Self {
        Self {
            registry,
            guard: OperationGuard::new(transport),
            data: RwLock::new(DataTable::new(registry)),
            startup_ok: AtomicBool::new(false),
        }
    }

    pub fn device(&self) -> &'static str {
        self.registry.device()
    }

    pub fn registry(&self) -> &'static FieldRegistry {
        self.registry
    }

    /// Run a closure against a consistent view of the live data
    pub fn with_data<R>(&self, f: impl FnOnce(&DataTable) -> R) -> R {
        f(&self.data.read())
    }

    /// Copy of the live data
    pub fn data(&self) -> DataTable {
        self.data.read().clone()
    }

    pub fn value(&self, name: &str) -> Option<FieldValue> {
        self.data.read().get(name).cloned()
    }

    pub async fn settings(&self) -> T::Settings {
        self.guard.settings().await
    }

    /// Replace the connection settings; waits for a running operation
    pub async fn update_settings(&self, settings: T::Settings) {
        info!("{}: settings updated to {:?}", self.device(), settings);
        self.guard.update_settings(settings).await;
    }

    pub fn is_startup_ok(&self) -> bool {
        self.startup_ok.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Read every readable field, committing each one as it arrives
    ///
    /// Good only if every field was read; otherwise the first failure.
    pub async fn read_all(&self) -> DataStatus {
        let status = match self.guard.begin().await {
            Ok(mut session) => {
                let mut first_failure: Option<GatewayError> = None;
                for field in self.registry.fields().iter().filter(|f| f.is_readable()) {
                    match read_field(&mut session, field).await {
                        Ok(value) => self.commit(field.name, value),
                        Err(e) => {
                            debug!("{}: {} failed: {}", self.device(), field.name, e);
                            first_failure.get_or_insert(e);
                        },
                    }
                }
                session.end().await;
                first_failure
                    .map(|e| DataStatus::from_error(&e))
                    .unwrap_or(DataStatus::GOOD)
            },
            Err(e) => DataStatus::from_error(&e),
        };
        log_status(self.device(), "read_all", status)
    }

    /// Read the declared register blocks and decode every covered field
    ///
    /// Fields that decode are committed even when a neighbour fails; the
    /// result is then the Bad status of the first failure, naming every
    /// field that was skipped.
    pub async fn read_block(&self) -> DataStatus {
        if self.registry.blocks().is_empty() {
            return log_status(
                self.device(),
                "read_block",
                DataStatus::new(StatusCode::BadNotReadable, "no register blocks declared"),
            );
        }

        let status = match self.guard.begin().await {
            Ok(mut session) => {
                let outcome = self.read_blocks(&mut session).await;
                session.end().await;
                outcome
            },
            Err(e) => DataStatus::from_error(&e),
        };
        log_status(self.device(), "read_block", status)
    }

    async fn read_blocks(&self, session: &mut Session<'_, T>) -> DataStatus {
        let mut first_failure: Option<GatewayError> = None;
        let mut failed_fields: Vec<&'static str> = Vec::new();
        for block in self.registry.blocks() {
            let words = match session.read_registers(block.start, block.count).await {
                Ok(words) => words,
                Err(e) => return DataStatus::from_error(&e),
            };
            let now = Utc::now();
            let mut decoded = Vec::new();
            for field in self.registry.fields_in_block(block) {
                let Some((offset, length)) = field.register_range() else {
                    continue;
                };
                let start = usize::from(offset - block.start);
                let end = start + usize::from(length);
                match words
                    .get(start..end)
                    .ok_or_else(|| GatewayError::decoding("block reply too short"))
                    .and_then(|slice| codec::decode_registers(field, slice))
                {
                    Ok(value) => decoded.push((field.name, value)),
                    Err(e) => {
                        debug!("{}: {} skipped: {}", self.device(), field.name, e);
                        failed_fields.push(field.name);
                        first_failure.get_or_insert(e);
                    },
                }
            }
            let mut data = self.data.write();
            for (name, value) in decoded {
                if let Err(e) = data.set(name, value, now) {
                    failed_fields.push(name);
                    first_failure.get_or_insert(e);
                }
            }
        }

        match first_failure {
            None => DataStatus::GOOD,
            Some(e) => {
                let status = DataStatus::from_error(&e);
                let explanation = format!(
                    "{} (not updated: {})",
                    status.explanation(),
                    failed_fields.join(", ")
                );
                status.with_explanation(explanation)
            },
        }
    }

    /// Read one field
    pub async fn read_property(&self, name: &str) -> DataStatus {
        let status = match self.registry.readable(name) {
            Ok(field) => match self.guard.begin().await {
                Ok(mut session) => {
                    let outcome = match read_field(&mut session, field).await {
                        Ok(value) => {
                            self.commit(field.name, value);
                            DataStatus::GOOD
                        },
                        Err(e) => DataStatus::from_error(&e),
                    };
                    session.end().await;
                    outcome
                },
                Err(e) => DataStatus::from_error(&e),
            },
            Err(e) => DataStatus::from_error(&e),
        };
        log_status(self.device(), &format!("read_property({})", name), status)
    }

    /// Read a set of fields as one unit
    ///
    /// Values are collected in a scratch table and committed only when every
    /// field was read.
    pub async fn read_properties<S: AsRef<str>>(&self, names: &[S]) -> DataStatus {
        let status = match self.resolve_readable(names) {
            Ok(fields) => match self.guard.begin().await {
                Ok(mut session) => {
                    let outcome = match read_batch(&mut session, self.registry, &fields).await {
                        Ok(scratch) => {
                            let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
                            self.data.write().commit_from(&scratch, &names);
                            DataStatus::GOOD
                        },
                        Err(e) => DataStatus::from_error(&e),
                    };
                    session.end().await;
                    outcome
                },
                Err(e) => DataStatus::from_error(&e),
            },
            Err(e) => DataStatus::from_error(&e),
        };
        log_status(self.device(), "read_properties", status)
    }

    /// Read every readable field of a group as one unit
    pub async fn read_group(&self, group: &str) -> DataStatus {
        let names: Vec<&str> = self
            .registry
            .names_in_group(group)
            .into_iter()
            .filter(|n| self.registry.is_readable(n))
            .collect();
        if names.is_empty() {
            return log_status(
                self.device(),
                "read_group",
                DataStatus::new(StatusCode::BadNotFound, format!("group '{}'", group)),
            );
        }
        self.read_properties(&names).await
    }

    /// Parse, encode and write one field
    ///
    /// Readable fields are read back and the device's value is committed;
    /// write-only fields commit the written value.
    pub async fn write_property(&self, name: &str, text: &str) -> DataStatus {
        let status = match self.prepare_write(name, text) {
            Ok((field, value, words)) => match self.guard.begin().await {
                Ok(mut session) => {
                    let outcome = self.write_and_confirm(&mut session, field, value, &words).await;
                    session.end().await;
                    outcome
                },
                Err(e) => DataStatus::from_error(&e),
            },
            Err(e) => DataStatus::from_error(&e),
        };
        log_status(self.device(), &format!("write_property({})", name), status)
    }

    fn prepare_write(
        &self,
        name: &str,
        text: &str,
    ) -> GatewayResult<(&'static FieldDescriptor, FieldValue, Vec<u16>)> {
        let field = self.registry.writable(name)?;
        let value = field.kind.parse(text)?;
        let words = codec::encode_registers(field, &value)?;
        Ok((field, value, words))
    }

    async fn write_and_confirm(
        &self,
        session: &mut Session<'_, T>,
        field: &'static FieldDescriptor,
        value: FieldValue,
        words: &[u16],
    ) -> DataStatus {
        let WireLocation::Register { offset, .. } = field.location else {
            return DataStatus::new(StatusCode::BadNotWritable, field.name);
        };
        if let Err(e) = session.write_registers(offset, words).await {
            return DataStatus::from_error(&e);
        }
        info!("{}: wrote {} = {}", self.device(), field.name, value);

        if !field.is_readable() {
            self.commit(field.name, value);
            return DataStatus::GOOD;
        }

        match read_field(session, field).await {
            Ok(confirmed) => {
                let matches = codec::encode_registers(field, &confirmed)
                    .map(|w| w == words)
                    .unwrap_or(false);
                let status = if matches {
                    DataStatus::GOOD
                } else {
                    DataStatus::new(
                        StatusCode::Uncertain,
                        format!("device reports {} after writing {}", confirmed, value),
                    )
                };
                self.commit(field.name, confirmed);
                status
            },
            Err(e) => {
                self.commit(field.name, value);
                DataStatus::new(
                    StatusCode::Uncertain,
                    format!("write accepted, read-back failed: {}", e),
                )
            },
        }
    }

    /// Full read recorded as the permanent startup flag
    pub async fn startup(&self) -> bool {
        let status = self.read_all().await;
        let ok = status.is_good();
        self.startup_ok.store(ok, Ordering::Relaxed);
        if ok {
            info!("{}: startup read succeeded", self.device());
        } else {
            warn!("{}: startup read failed: {}", self.device(), status);
        }
        ok
    }

    /// Connect and disconnect without touching the data
    pub async fn check_access(&self) -> bool {
        match self.guard.begin().await {
            Ok(session) => {
                session.end().await;
                true
            },
            Err(e) => {
                debug!("{}: access check failed: {}", self.device(), e);
                false
            },
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn commit(&self, name: &str, value: FieldValue) {
        if let Err(e) = self.data.write().set(name, value, Utc::now()) {
            warn!("{}: {}", self.device(), e);
        }
    }

    /// Readable descriptors for `names`, in declaration order
    fn resolve_readable<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> GatewayResult<Vec<&'static FieldDescriptor>> {
        for name in names {
            self.registry.readable(name.as_ref())?;
        }
        self.registry
            .intersect(names)
            .into_iter()
            .map(|name| self.registry.descriptor(name))
            .collect()
    }
}

async fn read_field<T: RegisterTransport>(
    session: &mut Session<'_, T>,
    field: &FieldDescriptor,
) -> GatewayResult<FieldValue> {
    let (offset, length) = field.register_range().ok_or_else(|| {
        GatewayError::internal(format!("{}: not a register field", field.name))
    })?;
    let words = session.read_registers(offset, length).await?;
    codec::decode_registers(field, &words)
}

async fn read_batch<T: RegisterTransport>(
    session: &mut Session<'_, T>,
    registry: &'static FieldRegistry,
    fields: &[&'static FieldDescriptor],
) -> GatewayResult<DataTable> {
    let mut scratch = DataTable::new(registry);
    for field in fields {
        let value = read_field(session, field).await?;
        scratch.set(field.name, value, Utc::now())?;
    }
    Ok(scratch)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::field::{AccessMode, RegisterBlock};
    use crate::test_utils::{InjectedFailure, MockRegisterTransport};
    use crate::value::{TimeUnit, ValueKind};
    use std::sync::{Arc, OnceLock};

    crate::device_enum! {
        pub enum Mode { Off = 0, Auto = 1, Manual = 2 }
    }

    static FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor::register("X", "Main", 0, 2, ValueKind::Float).scaled(100.0),
        FieldDescriptor::register("Target", "Main", 2, 2, ValueKind::Float)
            .scaled(10.0)
            .access(AccessMode::ReadWrite),
        FieldDescriptor::register("OnTime", "Timer", 4, 2, ValueKind::Duration(TimeUnit::Minutes))
            .access(AccessMode::ReadWrite),
        FieldDescriptor::register("Charge", "Timer", 6, 1, ValueKind::Boolean)
            .access(AccessMode::WriteOnly),
        FieldDescriptor::register("Hours", "Other", 10, 2, ValueKind::Unsigned),
        FieldDescriptor::register("Mode", "Other", 12, 1, ValueKind::Enum(&Mode::TYPE)),
    ];

    fn registry() -> &'static FieldRegistry {
        static REGISTRY: OnceLock<FieldRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            FieldRegistry::new("test", FIELDS)
                .unwrap()
                .with_blocks(&[RegisterBlock::new(0, 6), RegisterBlock::new(10, 3)])
                .unwrap()
        })
    }

    fn gateway() -> (RegisterGateway<MockRegisterTransport>, MockRegisterTransport) {
        let mock = MockRegisterTransport::new();
        (RegisterGateway::new(registry(), mock.clone()), mock)
    }

    #[tokio::test]
    async fn test_read_property_scaled_value() {
        let (gw, mock) = gateway();
        mock.set_registers(0, &[0, 12345]);

        let status = gw.read_property("X").await;
        assert_eq!(status, DataStatus::GOOD);
        assert_eq!(gw.value("X"), Some(FieldValue::Float(123.45)));
        assert_eq!(mock.connect_count(), 1);
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_without_connecting() {
        let (gw, mock) = gateway();
        assert_eq!(gw.read_property("NoSuchField").await, DataStatus::BAD_NOT_FOUND);
        assert_eq!(gw.read_property("Charge").await, DataStatus::BAD_NOT_READABLE);
        assert_eq!(gw.write_property("X", "1").await, DataStatus::BAD_NOT_WRITABLE);
        assert_eq!(gw.write_property("Nope", "1").await, DataStatus::BAD_NOT_FOUND);
        assert_eq!(gw.write_property("Target", "warm").await, DataStatus::BAD_ENCODING_ERROR);
        assert_eq!(
            gw.read_properties(&["X", "Charge"]).await,
            DataStatus::BAD_NOT_READABLE
        );
        assert_eq!(mock.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_write_only_field() {
        let (gw, mock) = gateway();
        assert_eq!(gw.read_property("Charge").await, DataStatus::BAD_NOT_READABLE);
        assert_eq!(gw.write_property("Charge", "true").await, DataStatus::GOOD);
        assert_eq!(mock.register(6), Some(1));
        assert_eq!(gw.value("Charge"), Some(FieldValue::Boolean(true)));
    }

    #[tokio::test]
    async fn test_write_duration_reads_back() {
        let (gw, mock) = gateway();
        assert_eq!(gw.write_property("OnTime", "21:00:00").await, DataStatus::GOOD);
        assert_eq!(mock.register(5), Some(1260));

        assert_eq!(gw.read_property("OnTime").await, DataStatus::GOOD);
        assert_eq!(gw.value("OnTime").unwrap().to_string(), "21:00:00");
    }

    #[tokio::test]
    async fn test_write_out_of_range() {
        let (gw, mock) = gateway();
        // 3e9 does not fit in two signed registers
        assert_eq!(gw.write_property("Target", "300000000").await, DataStatus::BAD_OUT_OF_RANGE);
        assert_eq!(mock.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_read_properties_is_atomic() {
        let (gw, mock) = gateway();
        mock.set_registers(0, &[0, 100, 0, 200]);
        mock.set_registers(10, &[0, 7]);
        assert_eq!(gw.read_properties(&["X", "Target", "Hours"]).await, DataStatus::GOOD);
        let before = gw.data();

        mock.set_registers(0, &[0, 999, 0, 999]);
        mock.set_registers(10, &[0, 99]);
        mock.fail_read_at(2, InjectedFailure::Io);
        let status = gw.read_properties(&["X", "Target", "Hours"]).await;
        assert_eq!(status, DataStatus::BAD_COMMUNICATION_ERROR);

        let after = gw.data();
        for name in ["X", "Target", "Hours"] {
            assert_eq!(after.slot(name), before.slot(name), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_read_all_best_effort() {
        let (gw, mock) = gateway();
        mock.set_registers(0, &[0, 100]);
        mock.set_registers(10, &[0, 5]);
        mock.fail_read_at(2, InjectedFailure::Timeout);

        let status = gw.read_all().await;
        assert_eq!(status, DataStatus::BAD_TIMEOUT);
        assert_eq!(gw.value("X"), Some(FieldValue::Float(1.0)));
        assert_eq!(gw.value("Hours"), Some(FieldValue::Unsigned(5)));
        assert!(gw.data().updated("Target").is_none());
    }

    #[tokio::test]
    async fn test_read_block_decode_failure_is_bad() {
        let (gw, mock) = gateway();
        mock.set_registers(0, &[0, 250, 0, 215, 0, 90]);
        mock.set_registers(10, &[0, 3, 1]);
        assert_eq!(gw.read_block().await, DataStatus::GOOD);
        assert_eq!(gw.value("Target"), Some(FieldValue::Float(21.5)));
        assert_eq!(gw.data().unsigned("Mode"), 1);
        assert_eq!(mock.reads(), vec![(0, 6), (10, 3)]);

        // unknown enum member: Bad, but the rest of the block is committed
        mock.set_registers(0, &[0, 500]);
        mock.set_registers(12, &[9]);
        let status = gw.read_block().await;
        assert!(status.is_bad());
        assert!(!status.is_good());
        assert_eq!(status, DataStatus::BAD_DECODING_ERROR);
        assert!(status.explanation().contains("not updated: Mode"));
        assert_eq!(gw.value("X"), Some(FieldValue::Float(5.0)));
        assert_eq!(gw.data().unsigned("Mode"), 1);

        mock.fail_read_at(10, InjectedFailure::Io);
        assert_eq!(gw.read_block().await, DataStatus::BAD_COMMUNICATION_ERROR);
    }

    #[tokio::test]
    async fn test_reads_commit_before_the_session_closes() {
        let mock = MockRegisterTransport::new();
        let gw = Arc::new(RegisterGateway::new(registry(), mock.clone()));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&gw);
        let sink = Arc::clone(&seen);
        mock.on_disconnect(move || {
            if let Some(gw) = weak.upgrade() {
                sink.lock().push(gw.value("X"));
            }
        });

        mock.set_registers(0, &[0, 100]);
        assert_eq!(gw.read_property("X").await, DataStatus::GOOD);
        mock.set_registers(0, &[0, 200]);
        assert_eq!(gw.read_properties(&["X", "Hours"]).await, DataStatus::GOOD);
        mock.set_registers(0, &[0, 300]);
        assert_eq!(gw.read_group("Main").await, DataStatus::GOOD);

        assert_eq!(
            *seen.lock(),
            vec![
                Some(FieldValue::Float(1.0)),
                Some(FieldValue::Float(2.0)),
                Some(FieldValue::Float(3.0)),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_no_communication() {
        let (gw, mock) = gateway();
        mock.fail_connect(true);
        assert_eq!(gw.read_all().await, DataStatus::BAD_NO_COMMUNICATION);
        assert!(!gw.check_access().await);
        assert!(!gw.startup().await);
        assert!(!gw.is_startup_ok());

        mock.fail_connect(false);
        assert!(gw.check_access().await);
        assert!(gw.startup().await);
        assert!(gw.is_startup_ok());
    }
}
