//! Environment layering of the service configuration
//!
//! Kept in its own test binary: it mutates the process environment.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::io::Write;

use etapu11::EtaPU11Config;

#[test]
fn test_environment_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "device:\n  address: 192.168.1.40\n  port: 502").unwrap();

    std::env::set_var("ETAPU11_DEVICE__PORT", "1502");
    std::env::set_var("ETAPU11_LOGGING__LEVEL", "debug");
    let config = EtaPU11Config::load(Some(file.path())).unwrap();
    std::env::remove_var("ETAPU11_DEVICE__PORT");
    std::env::remove_var("ETAPU11_LOGGING__LEVEL");

    assert_eq!(config.device.address, "192.168.1.40");
    assert_eq!(config.device.port, 1502);
    assert_eq!(config.logging.level, "debug");
}
