//! ETA PU 11 gateway against the in-process Modbus/TCP simulator

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use chrono::TimeDelta;
use etapu11::registers::{BoilerState, HotwaterState};
use etapu11::EtaPU11Gateway;
use gateway_core::test_utils::ModbusSimulator;
use gateway_core::{DataStatus, ModbusSettings, StatusCode};

async fn start() -> (EtaPU11Gateway, ModbusSimulator) {
    let sim = ModbusSimulator::new();
    let addr = sim.start(0).await.unwrap();
    let settings = ModbusSettings {
        address: addr.ip().to_string(),
        port: addr.port(),
        slave_id: 1,
        timeout_secs: 2,
    };
    (EtaPU11Gateway::new(settings).unwrap(), sim)
}

#[tokio::test]
async fn test_scaled_property_read() {
    let (gw, sim) = start().await;
    // 12.34 bar at scale 100
    sim.set_registers(2, &[0, 1234]).await;
    // -5.5 °C, two's complement across both words
    sim.set_registers(164, &[0xFFFF, 0xFFC9]).await;

    assert_eq!(gw.read_property("BoilerPressure").await, DataStatus::GOOD);
    assert_eq!(gw.boiler_data().pressure, 12.34);

    assert_eq!(gw.read_property("OutsideTemperature").await, DataStatus::GOOD);
    assert_eq!(gw.system_data().outside_temperature, -5.5);
}

#[tokio::test]
async fn test_duration_round_trip() {
    let (gw, sim) = start().await;

    assert_eq!(gw.write_property("HotwaterOnTime", "21:00:00").await, DataStatus::GOOD);
    assert_eq!(sim.get_holding_register(49).await, Some(1260));

    assert_eq!(gw.read_property("HotwaterOnTime").await, DataStatus::GOOD);
    assert_eq!(gw.hotwater_data().on_time, TimeDelta::try_hours(21).unwrap());
    let json = gw.data().subsystem_json(etapu11::Subsystem::Hotwater).unwrap();
    assert_eq!(json["onTime"], "21:00:00");
}

#[tokio::test]
async fn test_block_read_fills_every_subsystem() {
    let (gw, sim) = start().await;
    sim.set_registers(0, &[0, 3]).await;
    sim.set_registers(4, &[0, 702]).await;
    sim.set_registers(40, &[0, 2]).await;
    sim.set_registers(122, &[0, 655]).await;

    assert_eq!(gw.read_block().await, DataStatus::GOOD);
    let data = gw.data();
    assert_eq!(data.boiler.state, BoilerState::Heating);
    assert_eq!(data.boiler.temperature, 70.2);
    assert_eq!(data.hotwater.state, HotwaterState::Charging);
    assert_eq!(data.storage.top, 65.5);
    assert!(data.system.updated.is_some());
}

#[tokio::test]
async fn test_unknown_enum_value_fails_block_read() {
    let (gw, sim) = start().await;
    sim.set_registers(0, &[0, 42]).await;
    sim.set_registers(4, &[0, 650]).await;

    let status = gw.read_block().await;
    assert_eq!(status.status_code(), StatusCode::BadDecodingError);
    assert!(status.is_bad());
    assert!(status.explanation().contains("BoilerState"));
    assert_eq!(gw.boiler_data().temperature, 65.0);
}

#[tokio::test]
async fn test_device_exception_is_device_failure() {
    let (gw, sim) = start().await;
    sim.set_exception(20, 0x04).await;

    let status = gw.read_property("BurnerStarts").await;
    assert_eq!(status.status_code(), StatusCode::BadDeviceFailure);

    sim.clear_exceptions().await;
    sim.set_registers(20, &[0, 77]).await;
    assert_eq!(gw.read_property("BurnerStarts").await, DataStatus::GOOD);
    assert_eq!(gw.boiler_data().burner_starts, 77);
}

#[tokio::test]
async fn test_write_then_startup_against_simulator() {
    let (gw, sim) = start().await;
    assert!(gw.check_access().await);
    assert_eq!(gw.write_property("HotwaterTarget", "52.5").await, DataStatus::GOOD);
    assert_eq!(sim.get_holding_register(45).await, Some(525));

    assert!(gw.startup().await);
    assert!(gw.is_startup_ok());
    assert_eq!(gw.hotwater_data().target, 52.5);
}

#[tokio::test]
async fn test_unreachable_device() {
    // Bind and drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let gw = EtaPU11Gateway::new(ModbusSettings {
        address: "127.0.0.1".into(),
        port,
        slave_id: 1,
        timeout_secs: 1,
    })
    .unwrap();

    assert!(!gw.check_access().await);
    let status = gw.read_property("BoilerTemperature").await;
    assert_eq!(status.status_code(), StatusCode::BadNoCommunication);
    assert!(!gw.startup().await);
}
