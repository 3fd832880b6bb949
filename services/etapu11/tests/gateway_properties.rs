//! Gateway guarantees checked through the register transport mock

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use etapu11::{EtaPU11Gateway, Subsystem};
use gateway_core::test_utils::{InjectedFailure, MockRegisterTransport};
use gateway_core::{run_monitor, DataStatus, FieldValue, MonitorOptions, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn gateway() -> (Arc<EtaPU11Gateway<MockRegisterTransport>>, MockRegisterTransport) {
    let mock = MockRegisterTransport::new();
    let gw = EtaPU11Gateway::with_transport(mock.clone()).unwrap();
    (Arc::new(gw), mock)
}

#[tokio::test]
async fn test_concurrent_operations_never_interleave() {
    let (gw, mock) = gateway();
    mock.set_delay(Duration::from_millis(5));

    let (a, b, c, d) = tokio::join!(
        gw.read_property("BoilerTemperature"),
        gw.read_subsystem(Subsystem::Storage),
        gw.write_property("HotwaterTarget", "50"),
        gw.read_block(),
    );
    for status in [a, b, c, d] {
        assert_eq!(status, DataStatus::GOOD);
    }

    let mut tasks = Vec::new();
    for i in 0..8 {
        let gw = gw.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                gw.read_hotwater_data().await
            } else {
                gw.read_property("SystemTime").await
            }
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_good());
    }

    assert_eq!(mock.connect_count(), 12);
    assert!(mock.sessions_are_serialized());
}

#[tokio::test]
async fn test_failed_batch_commits_nothing() {
    let (gw, mock) = gateway();
    mock.set_registers(122, &[0, 100, 0, 200, 0, 300]);
    assert_eq!(gw.read_storage_data().await, DataStatus::GOOD);
    let before = gw.storage_data();

    mock.set_registers(122, &[0, 111, 0, 222, 0, 333]);
    mock.fail_read_at(124, InjectedFailure::Io);
    let status = gw
        .read_properties(&["StorageTop", "StorageMiddle", "StorageBottom"])
        .await;
    assert_eq!(status.status_code(), StatusCode::BadCommunicationError);

    let after = gw.storage_data();
    assert_eq!(after.top, before.top);
    assert_eq!(after.middle, before.middle);
    assert_eq!(after.bottom, before.bottom);
    assert_eq!(after.updated, before.updated);
}

#[tokio::test]
async fn test_good_status_implies_fresh_timestamps() {
    let (gw, mock) = gateway();
    let names = ["BoilerTemperature", "HotwaterTemperature", "RoomTemperature"];

    let start = Utc::now();
    assert_eq!(gw.read_properties(&names).await, DataStatus::GOOD);
    let table = gw.table();
    for name in names {
        assert!(table.updated(name).unwrap() >= start, "{} is stale", name);
    }

    mock.set_registers(42, &[0, 480]);
    mock.fail_read_at(82, InjectedFailure::Timeout);
    assert_eq!(gw.read_properties(&names).await, DataStatus::BAD_TIMEOUT);
    assert_eq!(gw.value("HotwaterTemperature"), Some(FieldValue::Float(0.0)));
}

#[tokio::test]
async fn test_rejected_requests_do_not_connect() {
    let (gw, mock) = gateway();

    assert_eq!(gw.read_property("NoSuchField").await, DataStatus::BAD_NOT_FOUND);
    assert_eq!(
        gw.write_property("BoilerTemperature", "1").await,
        DataStatus::BAD_NOT_WRITABLE
    );
    assert_eq!(
        gw.write_property("HotwaterOnTime", "25:61:00").await,
        DataStatus::BAD_ENCODING_ERROR
    );
    assert_eq!(
        gw.read_properties(&["BoilerTemperature", "Bogus"]).await,
        DataStatus::BAD_NOT_FOUND
    );
    assert_eq!(gw.read_property("ChargeHotwater").await, DataStatus::BAD_NOT_READABLE);

    assert_eq!(mock.connect_count(), 0);
}

#[tokio::test]
async fn test_write_mismatch_is_uncertain() {
    let (gw, mock) = gateway();
    // The controller clamps the target to 60.0 °C
    mock.pin_register(45, 600);

    let status = gw.write_property("HotwaterTarget", "75").await;
    assert_eq!(status.status_code(), StatusCode::Uncertain);
    assert_eq!(gw.hotwater_data().target, 60.0);
}

#[tokio::test]
#[traced_test]
async fn test_failures_are_logged_with_status() {
    let (gw, mock) = gateway();
    mock.fail_connect(true);

    assert_eq!(
        gw.read_boiler_data().await,
        DataStatus::BAD_NO_COMMUNICATION
    );
    assert!(logs_contain("ETAPU11"));
    assert!(logs_contain("BadNoCommunication"));
}

#[tokio::test]
async fn test_monitor_repeats_reads() {
    let (gw, mock) = gateway();
    let options = MonitorOptions {
        repeat: 3,
        interval: Duration::from_millis(10),
    };

    let gw_ref = gw.as_ref();
    let summary = run_monitor(options, CancellationToken::new(), move |_| async move {
        gw_ref.read_system_data().await
    })
    .await;

    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.failures, 0);
    assert!(!summary.cancelled);
    assert_eq!(mock.connect_count(), 3);
}

#[tokio::test]
async fn test_monitor_stops_on_cancel() {
    let (gw, _mock) = gateway();
    let token = CancellationToken::new();
    let options = MonitorOptions {
        repeat: 0,
        interval: Duration::from_millis(20),
    };

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(70)).await;
        canceller.cancel();
    });

    let gw_ref = gw.as_ref();
    let summary = tokio::time::timeout(
        Duration::from_secs(2),
        run_monitor(options, token, move |_| async move {
            gw_ref.read_property("ErrorCount").await
        }),
    )
    .await
    .unwrap();

    assert!(summary.cancelled);
    assert!(summary.iterations >= 1);
}
