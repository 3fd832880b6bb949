//! Service configuration
//!
//! Loaded from defaults, an optional `etapu11.yaml` and `ETAPU11_*`
//! environment variables (`ETAPU11_DEVICE__ADDRESS=10.0.0.5`).

use std::path::Path;

use common::{ApiConfig, LoggingConfig};
use errors::GatewayResult;
use gateway_core::ModbusSettings;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "ETAPU11_";
pub const DEFAULT_CONFIG_FILE: &str = "etapu11.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtaPU11Config {
    #[serde(default)]
    pub device: ModbusSettings,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EtaPU11Config {
    pub fn load(path: Option<&Path>) -> GatewayResult<Self> {
        let config: Self = common::load_config(path, ENV_PREFIX)?;
        config.device.validate()?;
        Ok(config)
    }
}
