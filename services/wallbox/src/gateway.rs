//! KEBA P30 gateway
//!
//! Reads are whole reports: one request returns every field of a report, and
//! the fields a caller asked for are picked out of the reply. Commands answer
//! `TCH-OK :done`; settable report fields are confirmed by fetching their
//! report again.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use errors::{GatewayError, GatewayResult};
use gateway_core::{
    codec, log_status, DataStatus, DataTable, DatagramTransport, FieldDescriptor, FieldRegistry,
    FieldValue, OperationGuard, Session, StatusCode, UdpClient, UdpSettings, WireLocation,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::data::{Report1Data, Report2Data, Report3Data, WallboxData};
use crate::fields::{self, Report};

/// Request answered with the firmware line; used as the reachability check
const ACCESS_CHECK_REQUEST: &str = "i";
const ACCESS_CHECK_MARKER: &str = "Firmware";
const COMMAND_OK: &str = "TCH-OK";
const COMMAND_ERR: &str = "TCH-ERR";

type ReportObject = Map<String, Value>;

/// Gateway for one KEBA P30 wallbox
pub struct WallboxGateway<T: DatagramTransport = UdpClient> {
    registry: &'static FieldRegistry,
    guard: OperationGuard<T>,
    data: RwLock<DataTable>,
    startup_ok: AtomicBool,
}

impl WallboxGateway<UdpClient> {
    /// Gateway talking UDP with the given settings
    pub fn new(settings: UdpSettings) -> GatewayResult<Self> {
        settings.validate()?;
        info!("Wallbox gateway for {}", settings.endpoint());
        Self::with_transport(UdpClient::new(settings))
    }
}

impl<T: DatagramTransport> WallboxGateway<T> {
    pub fn with_transport(transport: T) -> GatewayResult<Self> {
        let registry = fields::registry()?;
        Ok(Self {
            registry,
            guard: OperationGuard::new(transport),
            data: RwLock::new(DataTable::new(registry)),
            startup_ok: AtomicBool::new(false),
        })
    }

    pub fn device(&self) -> &'static str {
        self.registry.device()
    }

    pub async fn settings(&self) -> T::Settings {
        self.guard.settings().await
    }

    pub async fn update_settings(&self, settings: T::Settings) {
        self.guard.update_settings(settings).await;
    }

    pub fn is_startup_ok(&self) -> bool {
        self.startup_ok.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch all three reports, committing whatever decodes
    ///
    /// Good only if every readable field was read; otherwise the first failure.
    pub async fn read_all(&self) -> DataStatus {
        let status = match self.guard.begin().await {
            Ok(mut session) => {
                let mut first_failure: Option<GatewayError> = None;
                for report in Report::ALL {
                    match fetch_report(&mut session, report).await {
                        Ok(object) => {
                            let now = Utc::now();
                            let mut data = self.data.write();
                            for field in self.report_fields(report) {
                                match decode_field(field, &object)
                                    .and_then(|value| data.set(field.name, value, now))
                                {
                                    Ok(()) => {},
                                    Err(e) => {
                                        debug!("{}: {} failed: {}", self.device(), field.name, e);
                                        first_failure.get_or_insert(e);
                                    },
                                }
                            }
                        },
                        Err(e) => {
                            debug!("{}: {} failed: {}", self.device(), report, e);
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

    /// Fetch one report and commit all of its fields, or none
    pub async fn read_report(&self, report: Report) -> DataStatus {
        let names: Vec<&str> = self.report_fields(report).map(|f| f.name).collect();
        let status = self.read_batch(&names).await;
        log_status(self.device(), &format!("read_{}", report.group().to_lowercase()), status)
    }

    pub async fn read_report1(&self) -> DataStatus {
        self.read_report(Report::Report1).await
    }

    pub async fn read_report2(&self) -> DataStatus {
        self.read_report(Report::Report2).await
    }

    pub async fn read_report3(&self) -> DataStatus {
        self.read_report(Report::Report3).await
    }

    /// Read one field by fetching its report
    pub async fn read_property(&self, name: &str) -> DataStatus {
        let status = self.read_batch(&[name]).await;
        log_status(self.device(), &format!("read_property({})", name), status)
    }

    /// Read a set of fields as one unit
    ///
    /// Each needed report is fetched once; nothing is committed unless every
    /// field decoded.
    pub async fn read_properties<S: AsRef<str>>(&self, names: &[S]) -> DataStatus {
        let status = self.read_batch(names).await;
        log_status(self.device(), "read_properties", status)
    }

    async fn read_batch<S: AsRef<str>>(&self, names: &[S]) -> DataStatus {
        let fields = match self.resolve_readable(names) {
            Ok(fields) => fields,
            Err(e) => return DataStatus::from_error(&e),
        };
        let reports: BTreeSet<u8> = fields.iter().filter_map(|f| f.report_number()).collect();

        match self.guard.begin().await {
            Ok(mut session) => {
                let outcome =
                    match collect_values(&mut session, self.registry, &reports, &fields).await {
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
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Send the command for one field
    ///
    /// Settable report fields are confirmed by re-reading their report; the
    /// device's value is committed and a mismatch is Uncertain. Command
    /// fields commit the value that was sent.
    pub async fn write_property(&self, name: &str, text: &str) -> DataStatus {
        let status = match self.prepare_write(name, text) {
            Ok((field, value, command)) => match self.guard.begin().await {
                Ok(mut session) => {
                    let outcome = self.send_and_confirm(&mut session, field, value, &command).await;
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
    ) -> GatewayResult<(&'static FieldDescriptor, FieldValue, String)> {
        let field = self.registry.writable(name)?;
        let value = field.kind.parse(text)?;
        let command = command_for(field, &value)?;
        Ok((field, value, command))
    }

    async fn send_and_confirm(
        &self,
        session: &mut Session<'_, T>,
        field: &'static FieldDescriptor,
        value: FieldValue,
        command: &str,
    ) -> DataStatus {
        if let Err(e) = send_command(session, command).await {
            return DataStatus::from_error(&e);
        }
        info!("{}: sent '{}'", self.device(), command);

        let Some(report) = field.report_number().and_then(Report::from_number) else {
            self.commit(field.name, value);
            return DataStatus::GOOD;
        };

        match fetch_report(session, report)
            .await
            .and_then(|object| decode_field(field, &object))
        {
            Ok(confirmed) => {
                let matches = codec::encode_token(field, &confirmed).ok()
                    == codec::encode_token(field, &value).ok();
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
                    format!("command accepted, read-back failed: {}", e),
                )
            },
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

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

    /// Send the identification request and look for the firmware line
    pub async fn check_access(&self) -> bool {
        let outcome = match self.guard.begin().await {
            Ok(mut session) => {
                let reply = session.send_receive(ACCESS_CHECK_REQUEST).await;
                session.end().await;
                reply
            },
            Err(e) => Err(e),
        };
        match outcome {
            Ok(reply) if reply.contains(ACCESS_CHECK_MARKER) => true,
            Ok(reply) => {
                debug!("{}: unexpected access check reply '{}'", self.device(), reply);
                false
            },
            Err(e) => {
                debug!("{}: access check failed: {}", self.device(), e);
                false
            },
        }
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn data(&self) -> WallboxData {
        WallboxData::from_table(&self.data.read())
    }

    pub fn report1_data(&self) -> Report1Data {
        Report1Data::from_table(&self.data.read())
    }

    pub fn report2_data(&self) -> Report2Data {
        Report2Data::from_table(&self.data.read())
    }

    pub fn report3_data(&self) -> Report3Data {
        Report3Data::from_table(&self.data.read())
    }

    pub fn value(&self, name: &str) -> Option<FieldValue> {
        self.data.read().get(name).cloned()
    }

    /// Copy of the whole data table
    pub fn table(&self) -> DataTable {
        self.data.read().clone()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn report_fields(&self, report: Report) -> impl Iterator<Item = &'static FieldDescriptor> {
        self.registry
            .fields()
            .iter()
            .filter(move |f| f.is_readable() && f.report_number() == Some(report.number()))
    }

    fn commit(&self, name: &str, value: FieldValue) {
        if let Err(e) = self.data.write().set(name, value, Utc::now()) {
            warn!("{}: {}", self.device(), e);
        }
    }

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

// ============================================================================
// Wire helpers
// ============================================================================

/// Send `report N` and check the reply is that report
async fn fetch_report<T: DatagramTransport>(
    session: &mut Session<'_, T>,
    report: Report,
) -> GatewayResult<ReportObject> {
    let reply = session.send_receive(&report.request()).await?;
    parse_report(report, &reply)
}

fn parse_report(report: Report, reply: &str) -> GatewayResult<ReportObject> {
    let object: ReportObject = serde_json::from_str(reply).map_err(|e| {
        GatewayError::unknown_response(format!("{} is not a JSON object: {}", report, e))
    })?;
    let id = match object.get("ID") {
        Some(Value::String(id)) => id.trim().parse::<u8>().ok(),
        Some(Value::Number(id)) => id.as_u64().and_then(|id| u8::try_from(id).ok()),
        _ => None,
    };
    if id != Some(report.number()) {
        return Err(GatewayError::unknown_response(format!(
            "expected ID {} in {} reply, got {:?}",
            report.number(),
            report,
            object.get("ID")
        )));
    }
    Ok(object)
}

fn decode_field(field: &FieldDescriptor, object: &ReportObject) -> GatewayResult<FieldValue> {
    let WireLocation::Report { key, .. } = field.location else {
        return Err(GatewayError::internal(format!("{}: not a report field", field.name)));
    };
    let token = object
        .get(key)
        .ok_or_else(|| GatewayError::decoding(format!("{}: key '{}' missing", field.name, key)))?;
    codec::decode_json(field, token)
}

/// Decode `fields` into a scratch table, fetching each report once
async fn collect_values<T: DatagramTransport>(
    session: &mut Session<'_, T>,
    registry: &'static FieldRegistry,
    reports: &BTreeSet<u8>,
    fields: &[&'static FieldDescriptor],
) -> GatewayResult<DataTable> {
    let mut objects = Vec::with_capacity(reports.len());
    for number in reports {
        let report = Report::from_number(*number)
            .ok_or_else(|| GatewayError::internal(format!("no report {}", number)))?;
        objects.push((*number, fetch_report(session, report).await?));
    }

    let mut scratch = DataTable::new(registry);
    let now = Utc::now();
    for field in fields {
        let object = objects
            .iter()
            .find(|(number, _)| field.report_number() == Some(*number))
            .map(|(_, object)| object)
            .ok_or_else(|| GatewayError::internal(format!("{}: report not fetched", field.name)))?;
        scratch.set(field.name, decode_field(field, object)?, now)?;
    }
    Ok(scratch)
}

/// Command line for writing `value` to `field`
///
/// Trigger commands (boolean command fields) send the bare verb and only
/// accept `true`.
fn command_for(field: &FieldDescriptor, value: &FieldValue) -> GatewayResult<String> {
    match (field.location, value) {
        (WireLocation::Command { verb }, FieldValue::Boolean(true)) => Ok(verb.to_string()),
        (WireLocation::Command { .. }, FieldValue::Boolean(false)) => {
            Err(GatewayError::out_of_range(false, true, true))
        },
        (WireLocation::Command { verb }, _) => {
            Ok(format!("{} {}", verb, codec::encode_token(field, value)?))
        },
        (WireLocation::Report { command: Some(verb), .. }, _) => {
            Ok(format!("{} {}", verb, codec::encode_token(field, value)?))
        },
        _ => Err(GatewayError::NotWritable(field.name.to_string())),
    }
}

async fn send_command<T: DatagramTransport>(
    session: &mut Session<'_, T>,
    command: &str,
) -> GatewayResult<()> {
    let reply = session.send_receive(command).await?;
    if reply.starts_with(COMMAND_OK) {
        Ok(())
    } else if reply.starts_with(COMMAND_ERR) {
        Err(GatewayError::DeviceFailure(format!("'{}' rejected: {}", command, reply)))
    } else {
        Err(GatewayError::unknown_response(format!(
            "'{}' answered '{}'",
            command, reply
        )))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::fields::{ChargingState, PlugState};
    use gateway_core::test_utils::MockDatagramTransport;

    const REPORT1: &str = r#"{"ID": "1","Product": "KC-P30-EC240422-E00","Serial": "16314582","Firmware":"P30 v 3.10.16 (160523-082803)","COM-module": 1,"Backend": 0,"timeQ": 3,"DIP-Sw1": "0x22","DIP-Sw2": "0x00","Sec": 3607}"#;
    const REPORT2: &str = r#"{"ID": "2","State": 3,"Error1": 0,"Error2": 0,"Plug": 7,"AuthON": 0,"Authreq": 0,"Enable sys": 1,"Enable user": 1,"Max curr": 16000,"Max curr %": 1000,"Curr HW": 32000,"Curr user": 16000,"Curr FS": 0,"Tmo FS": 0,"Curr timer": 0,"Tmo CT": 0,"Setenergy": 0,"Output": 0,"Input": 0,"Serial": "16314582","Sec": 3607}"#;
    const REPORT3: &str = r#"{"ID": "3","U1": 230,"U2": 231,"U3": 229,"I1": 15980,"I2": 15990,"I3": 16010,"P": 11040000,"PF": 998,"E pres": 125340,"E total": 98765432,"Serial": "16314582","Sec": 3607}"#;

    fn gateway() -> (WallboxGateway<MockDatagramTransport>, MockDatagramTransport) {
        let mock = MockDatagramTransport::new();
        mock.reply("report 1", REPORT1);
        mock.reply("report 2", REPORT2);
        mock.reply("report 3", REPORT3);
        (WallboxGateway::with_transport(mock.clone()).unwrap(), mock)
    }

    #[tokio::test]
    async fn test_read_all_fills_views() {
        let (gw, mock) = gateway();
        assert_eq!(gw.read_all().await, DataStatus::GOOD);
        assert_eq!(mock.sent(), vec!["report 1", "report 2", "report 3"]);
        assert_eq!(mock.connect_count(), 1);

        let data = gw.data();
        assert_eq!(data.report1.serial, "16314582");
        assert_eq!(data.report1.dip_switch1, 0x22);
        assert_eq!(data.report2.state, ChargingState::Charging);
        assert_eq!(data.report2.plug, PlugState::LockedVehicle);
        assert_eq!(data.report2.current_user, 16.0);
        assert_eq!(data.report3.power, 11040.0);
        assert_eq!(data.report3.energy_present, 12534.0);
        assert_eq!(data.report3.power_factor, 99.8);
    }

    #[tokio::test]
    async fn test_read_properties_fetches_each_report_once() {
        let (gw, mock) = gateway();
        assert_eq!(gw.read_properties(&["I1", "State", "P", "Plug"]).await, DataStatus::GOOD);
        assert_eq!(mock.sent(), vec!["report 2", "report 3"]);
        assert_eq!(gw.value("I1"), Some(FieldValue::Float(15.98)));
    }

    #[tokio::test]
    async fn test_report_is_committed_before_the_session_closes() {
        let (gw, mock) = gateway();
        let gw = std::sync::Arc::new(gw);
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let weak = std::sync::Arc::downgrade(&gw);
        let sink = std::sync::Arc::clone(&seen);
        mock.on_disconnect(move || {
            if let Some(gw) = weak.upgrade() {
                sink.lock().push(gw.report3_data().u1);
            }
        });

        assert_eq!(gw.read_report3().await, DataStatus::GOOD);
        assert_eq!(gw.read_property("Product").await, DataStatus::GOOD);
        assert_eq!(*seen.lock(), vec![230, 230]);
        assert_eq!(gw.report1_data().product, "KC-P30-EC240422-E00");
    }

    #[tokio::test]
    async fn test_wrong_report_id_is_unknown_response() {
        let (gw, mock) = gateway();
        mock.reply("report 3", REPORT2);
        assert_eq!(gw.read_report3().await, DataStatus::BAD_UNKNOWN_RESPONSE);
        assert_eq!(gw.report3_data().updated, None);
    }

    #[tokio::test]
    async fn test_missing_key_commits_nothing() {
        let (gw, mock) = gateway();
        mock.reply("report 3", r#"{"ID": "3","U1": 230}"#);
        assert_eq!(gw.read_report3().await, DataStatus::BAD_DECODING_ERROR);
        assert_eq!(gw.report3_data().u1, 0);
    }

    #[tokio::test]
    async fn test_write_confirmed_by_report() {
        let (gw, mock) = gateway();
        mock.reply("curr 16000", "TCH-OK :done");
        assert_eq!(gw.write_property("CurrUser", "16").await, DataStatus::GOOD);
        assert_eq!(mock.sent(), vec!["curr 16000", "report 2"]);

        // device keeps 16 A
        mock.reply("curr 10000", "TCH-OK :done");
        let status = gw.write_property("CurrUser", "10").await;
        assert_eq!(status, DataStatus::UNCERTAIN);
        assert_eq!(gw.report2_data().current_user, 16.0);
    }

    #[tokio::test]
    async fn test_command_replies() {
        let (gw, mock) = gateway();
        mock.reply("ena 0", "TCH-ERR :unknown state");
        assert_eq!(
            gw.write_property("EnableUser", "off").await,
            DataStatus::BAD_DEVICE_FAILURE
        );

        mock.reply("output 1", "garbled");
        assert_eq!(
            gw.write_property("Output", "1").await,
            DataStatus::BAD_UNKNOWN_RESPONSE
        );
    }

    #[tokio::test]
    async fn test_trigger_and_text_commands() {
        let (gw, mock) = gateway();
        mock.reply("unlock", "TCH-OK :done");
        mock.reply("display 0 0 0 0 Hello$World", "TCH-OK :done");

        assert_eq!(gw.write_property("Unlock", "true").await, DataStatus::GOOD);
        assert_eq!(gw.write_property("Unlock", "false").await, DataStatus::BAD_OUT_OF_RANGE);
        assert_eq!(gw.write_property("Display", "Hello World").await, DataStatus::GOOD);
        assert_eq!(gw.value("Display"), Some(FieldValue::Text("Hello World".into())));
        assert_eq!(mock.sent(), vec!["unlock", "display 0 0 0 0 Hello$World"]);
    }

    #[tokio::test]
    async fn test_rejections_before_connect() {
        let (gw, mock) = gateway();
        assert_eq!(gw.read_property("Nope").await, DataStatus::BAD_NOT_FOUND);
        assert_eq!(gw.read_property("Unlock").await, DataStatus::BAD_NOT_READABLE);
        assert_eq!(gw.write_property("P", "1").await, DataStatus::BAD_NOT_WRITABLE);
        assert_eq!(gw.write_property("CurrUser", "abc").await, DataStatus::BAD_ENCODING_ERROR);
        assert_eq!(mock.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_check_access_and_startup() {
        let (gw, mock) = gateway();
        assert!(!gw.check_access().await);
        mock.reply("i", "\"Firmware\":\"P30 v 3.10.16 (160523-082803)\"");
        assert!(gw.check_access().await);

        assert!(gw.startup().await);
        assert!(gw.is_startup_ok());
    }
}
