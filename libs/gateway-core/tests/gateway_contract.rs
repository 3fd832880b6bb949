//! Register gateway contract over the mock transport and the simulator

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use futures::future::join_all;
use gateway_core::test_utils::{MockRegisterTransport, ModbusSimulator};
use gateway_core::{
    codec, device_enum, AccessMode, DataStatus, FieldDescriptor, FieldRegistry, FieldValue,
    ModbusSettings, ModbusTcpClient, RegisterGateway, TimeUnit, ValueKind,
};

device_enum! {
    pub enum Program {
        Standby = 0,
        Comfort = 1,
        Eco = 2,
    }
}

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::register("Setpoint", "Room", 0, 1, ValueKind::Float)
        .scaled(10.0)
        .access(AccessMode::ReadWrite),
    FieldDescriptor::register("Offset", "Room", 1, 1, ValueKind::Signed)
        .access(AccessMode::ReadWrite),
    FieldDescriptor::register("Start", "Timer", 2, 2, ValueKind::Duration(TimeUnit::Seconds))
        .access(AccessMode::ReadWrite),
    FieldDescriptor::register("Clock", "Timer", 4, 2, ValueKind::Timestamp)
        .access(AccessMode::ReadWrite),
    FieldDescriptor::register("Program", "Room", 6, 1, ValueKind::Enum(&Program::TYPE))
        .access(AccessMode::ReadWrite),
    FieldDescriptor::register("Boost", "Room", 7, 1, ValueKind::Boolean)
        .access(AccessMode::ReadWrite),
    FieldDescriptor::register("Runtime", "Timer", 8, 2, ValueKind::Unsigned),
];

fn registry() -> &'static FieldRegistry {
    static REGISTRY: OnceLock<FieldRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| FieldRegistry::new("TEST", FIELDS).unwrap())
}

#[tokio::test]
async fn test_operations_are_single_flight() {
    let mock = MockRegisterTransport::new();
    mock.set_delay(Duration::from_millis(2));
    let gateway = RegisterGateway::new(registry(), mock.clone());

    let reads = (0..6).map(|_| gateway.read_group("Room"));
    let writes = ["20.5", "21", "21.5"]
        .into_iter()
        .map(|v| gateway.write_property("Setpoint", v));
    let (reads, writes, all) = tokio::join!(join_all(reads), join_all(writes), gateway.read_all());

    assert!(reads.iter().chain(writes.iter()).all(DataStatus::is_good));
    assert!(all.is_good());
    assert_eq!(mock.connect_count(), 10);
    assert!(mock.sessions_are_serialized());
}

#[test]
fn test_writable_values_survive_the_codec() {
    let registry = registry();
    let samples = [
        ("Setpoint", "-12.5"),
        ("Setpoint", "3276.7"),
        ("Offset", "-32768"),
        ("Offset", "32767"),
        ("Start", "23:59:59"),
        ("Start", "2.00:00:00"),
        ("Clock", "2024-02-29T12:00:00Z"),
        ("Program", "Eco"),
        ("Boost", "on"),
    ];

    for (name, text) in samples {
        let field = registry.writable(name).unwrap();
        let value = field.kind.parse(text).unwrap();
        let words = codec::encode_registers(field, &value).unwrap();
        let decoded = codec::decode_registers(field, &words).unwrap();
        assert_eq!(decoded, value, "{} = {}", name, text);
        assert_eq!(codec::encode_registers(field, &decoded).unwrap(), words, "{}", name);
    }
}

#[test]
fn test_values_that_do_not_fit_are_rejected() {
    let registry = registry();
    let setpoint = registry.writable("Setpoint").unwrap();
    let too_hot = setpoint.kind.parse("3276.8").unwrap();
    assert!(codec::encode_registers(setpoint, &too_hot).is_err());

    let program = registry.writable("Program").unwrap();
    assert!(program.kind.parse("Turbo").is_err());
    assert!(program.kind.parse("7").is_err());
}

#[tokio::test]
async fn test_register_gateway_over_tcp() {
    let sim = ModbusSimulator::new();
    let addr = sim.start(0).await.unwrap();
    let client = ModbusTcpClient::new(ModbusSettings {
        address: addr.ip().to_string(),
        port: addr.port(),
        slave_id: 1,
        timeout_secs: 2,
    });
    let gateway = RegisterGateway::new(registry(), client);

    assert_eq!(gateway.write_property("Start", "06:30:00").await, DataStatus::GOOD);
    assert_eq!(gateway.write_property("Clock", "1700000000").await, DataStatus::GOOD);
    assert_eq!(gateway.write_property("Offset", "-3").await, DataStatus::GOOD);
    assert_eq!(sim.get_holding_register(1).await, Some(0xFFFD));

    sim.set_registers(8, &[0x0001, 0x0000]).await;
    assert_eq!(gateway.read_all().await, DataStatus::GOOD);
    assert_eq!(
        gateway.value("Start"),
        Some(FieldValue::Duration(TimeDelta::try_minutes(390).unwrap()))
    );
    assert_eq!(
        gateway.value("Clock"),
        Some(FieldValue::Timestamp(Utc.timestamp_opt(1_700_000_000, 0).unwrap()))
    );
    assert_eq!(gateway.value("Runtime"), Some(FieldValue::Unsigned(65_536)));
}
