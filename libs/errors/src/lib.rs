//! Unified error handling for the home-automation gateways
//!
//! Every library crate in the workspace reports failures through [`GatewayError`].
//! Gateways never hand these errors to their callers directly; they are folded
//! into a status value at the operation boundary. The category helpers here are
//! what the CLI and REST front ends use to decide on retries and HTTP codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ErrorInfo
// ============================================================================

/// Error body of a REST reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// HTTP status
    pub code: u16,
    pub message: String,
    /// Symbolic status name or error classification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    /// Starts out as a 500
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// ============================================================================
// GatewayError - Main error type
// ============================================================================

/// Main error type for all gateway crates
#[derive(Debug, Error)]
pub enum GatewayError {
    // ======================================
    // Connectivity
    // ======================================
    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    // ======================================
    // Protocol & data
    // ======================================
    #[error("Device exception: function {function:#04X}, code {code:#04X}")]
    DeviceException { function: u8, code: u8 },

    #[error("Device failure: {0}")]
    DeviceFailure(String),

    #[error("Unknown response: {0}")]
    UnknownResponse(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        value: String,
        min: String,
        max: String,
    },

    // ======================================
    // Semantic (caller) errors
    // ======================================
    #[error("Property not found: {0}")]
    NotFound(String),

    #[error("Property not readable: {0}")]
    NotReadable(String),

    #[error("Property not writable: {0}")]
    NotWritable(String),

    // ======================================
    // Configuration & internal
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GatewayError
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn connection_failed(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn decoding(msg: impl Into<String>) -> Self {
        Self::Decoding(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn unknown_response(msg: impl Into<String>) -> Self {
        Self::UnknownResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn out_of_range(
        value: impl std::fmt::Display,
        min: impl std::fmt::Display,
        max: impl std::fmt::Display,
    ) -> Self {
        Self::OutOfRange {
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Error code string used in logs and API payloads
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Io(_) => "IO_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
            Self::DeviceException { .. } => "DEVICE_EXCEPTION",
            Self::DeviceFailure(_) => "DEVICE_FAILURE",
            Self::UnknownResponse(_) => "UNKNOWN_RESPONSE",
            Self::Decoding(_) => "DECODING_ERROR",
            Self::Encoding(_) => "ENCODING_ERROR",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotReadable(_) => "NOT_READABLE",
            Self::NotWritable(_) => "NOT_WRITABLE",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    /// Classification used for retry and alerting decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionFailed { .. }
            | Self::NotConnected
            | Self::Io(_)
            | Self::Timeout(_)
            | Self::ResourceUnavailable(_) => ErrorCategory::Connectivity,

            Self::DeviceException { .. }
            | Self::UnknownResponse(_)
            | Self::Decoding(_)
            | Self::Encoding(_)
            | Self::OutOfRange { .. } => ErrorCategory::Protocol,

            Self::NotFound(_) | Self::NotReadable(_) | Self::NotWritable(_) => {
                ErrorCategory::Semantic
            },

            Self::Configuration(_) => ErrorCategory::Configuration,

            Self::DeviceFailure(_) | Self::Internal(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Connectivity
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Encoding(_) | Self::OutOfRange { .. } => 400,
            Self::NotFound(_) => 404,
            Self::NotReadable(_) | Self::NotWritable(_) => 405,
            Self::Timeout(_) => 504,
            Self::ConnectionFailed { .. }
            | Self::NotConnected
            | Self::Io(_)
            | Self::DeviceException { .. }
            | Self::DeviceFailure(_)
            | Self::UnknownResponse(_)
            | Self::Decoding(_) => 502,
            Self::ResourceUnavailable(_) => 503,
            Self::Configuration(_) | Self::Internal(_) | Self::Other(_) => 500,
        }
    }

    /// Convert to API ErrorInfo for HTTP responses
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.to_string())
            .with_code(self.status_code())
            .with_details(format!(
                "error_code: {}, category: {:?}, retryable: {}",
                self.error_code(),
                self.category(),
                self.is_retryable()
            ))
    }
}

/// Error category - groups errors by who has to act on them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Network or device reachability; the caller may retry
    Connectivity,
    /// Wire format mismatch; needs investigation before retrying
    Protocol,
    /// Caller asked for something the registry forbids
    Semantic,
    /// Broken configuration
    Configuration,
    /// Unexpected failure
    Internal,
}

// Conversion traits for common error types
impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decoding(format!("JSON: {err}"))
    }
}

impl From<std::num::ParseIntError> for GatewayError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::Encoding(format!("Invalid integer: {}", err))
    }
}

impl From<std::num::ParseFloatError> for GatewayError {
    fn from(err: std::num::ParseFloatError) -> Self {
        Self::Encoding(format!("Invalid float: {}", err))
    }
}

impl From<std::str::ParseBoolError> for GatewayError {
    fn from(err: std::str::ParseBoolError) -> Self {
        Self::Encoding(format!("Invalid boolean: {}", err))
    }
}

#[cfg(feature = "figment")]
impl From<figment::Error> for GatewayError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
