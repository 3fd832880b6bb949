//! Service configuration
//!
//! Defaults, then an optional `wallbox.yaml`, then `WALLBOX_*` environment
//! variables (`WALLBOX_DEVICE__ADDRESS=192.168.1.80`).

use std::path::Path;

use common::{ApiConfig, LoggingConfig};
use errors::GatewayResult;
use gateway_core::UdpSettings;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "WALLBOX_";
pub const DEFAULT_CONFIG_FILE: &str = "wallbox.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WallboxConfig {
    #[serde(default)]
    pub device: UdpSettings,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WallboxConfig {
    pub fn load(path: Option<&Path>) -> GatewayResult<Self> {
        let config: Self = common::load_config(path, ENV_PREFIX)?;
        config.device.validate()?;
        Ok(config)
    }
}
