//! Shared plumbing for the gateway binaries
//!
//! Provides the pieces every device service needs around its gateway:
//! - logging bootstrap (console + optional rolling file)
//! - layered configuration loading (defaults, file, environment)
//! - shutdown signal handling as a cancellation token
//! - REST response envelope and HTTP error type

#[cfg(feature = "axum")]
pub mod admin_api;
pub mod api_types;
pub mod config_loader;
pub mod logging;
pub mod shutdown;

pub use api_types::{ErrorInfo, ErrorResponse, SuccessResponse};
#[cfg(feature = "axum")]
pub use api_types::AppError;
pub use config_loader::{load_config, ApiConfig, LoggingConfig};
pub use shutdown::{shutdown_token, wait_for_shutdown};
