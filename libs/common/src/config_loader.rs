//! Configuration loading helper functions
//!
//! Layering order (later wins): struct defaults, config file, environment.

use std::path::Path;

use errors::{GatewayError, GatewayResult};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Build the figment for a configuration type
///
/// The file provider is picked by extension (`yaml`/`yml`, `toml`, `json`).
/// A missing file is not an error: the defaults and environment still apply.
/// Environment variables use the given prefix and `__` as the nesting
/// separator, e.g. `ETAPU11_DEVICE__ADDRESS=10.0.0.5`.
pub fn figment_for<T>(path: Option<&Path>, env_prefix: &str) -> GatewayResult<Figment>
where
    T: Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = path {
        if path.exists() {
            let extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            figment = match extension.as_str() {
                "json" => figment.merge(Json::file(path)),
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                other => {
                    return Err(GatewayError::config(format!(
                        "Unsupported config file extension '{}' ({})",
                        other,
                        path.display()
                    )))
                },
            };
            info!("Loading configuration from {}", path.display());
        } else {
            warn!(
                "Config file {} not found, using defaults and environment",
                path.display()
            );
        }
    }

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load a configuration value from defaults, an optional file and the environment
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> GatewayResult<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    let config: T = figment_for::<T>(path, env_prefix)?.extract()?;
    debug!("Configuration loaded (env prefix {})", env_prefix);
    Ok(config)
}

/// REST API section shared by all gateway configs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "default_api_bind")]
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_bind(),
        }
    }
}

fn default_api_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Logging section shared by all gateway configs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for rolling log files (console only when absent)
    #[serde(default)]
    pub dir: Option<String>,
    /// JSON formatted file output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
