//! Operation status model
//!
//! Every gateway operation answers exactly one [`DataStatus`]: a code from a
//! closed taxonomy plus an optional explanation. Codes use the OPC UA numeric
//! values so that the severity can be read from the two top bits.

use std::fmt;

use errors::GatewayError;
use serde::{ser::SerializeStruct, Serialize, Serializer};

/// Severity derived from the top two bits of a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Good,
    Uncertain,
    Bad,
}

/// Closed set of operation outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Good,
    GoodResultsMayBeIncomplete,
    Uncertain,
    BadInternalError,
    BadResourceUnavailable,
    BadCommunicationError,
    BadEncodingError,
    BadDecodingError,
    BadUnknownResponse,
    BadTimeout,
    BadNoCommunication,
    BadNotReadable,
    BadNotWritable,
    BadOutOfRange,
    BadNotFound,
    BadDeviceFailure,
}

impl StatusCode {
    pub const ALL: [StatusCode; 16] = [
        Self::Good,
        Self::GoodResultsMayBeIncomplete,
        Self::Uncertain,
        Self::BadInternalError,
        Self::BadResourceUnavailable,
        Self::BadCommunicationError,
        Self::BadEncodingError,
        Self::BadDecodingError,
        Self::BadUnknownResponse,
        Self::BadTimeout,
        Self::BadNoCommunication,
        Self::BadNotReadable,
        Self::BadNotWritable,
        Self::BadOutOfRange,
        Self::BadNotFound,
        Self::BadDeviceFailure,
    ];

    /// Numeric OPC UA status code
    pub const fn code(self) -> u32 {
        match self {
            Self::Good => 0x0000_0000,
            Self::GoodResultsMayBeIncomplete => 0x00BA_0000,
            Self::Uncertain => 0x4000_0000,
            Self::BadInternalError => 0x8002_0000,
            Self::BadResourceUnavailable => 0x8004_0000,
            Self::BadCommunicationError => 0x8005_0000,
            Self::BadEncodingError => 0x8006_0000,
            Self::BadDecodingError => 0x8007_0000,
            Self::BadUnknownResponse => 0x8009_0000,
            Self::BadTimeout => 0x800A_0000,
            Self::BadNoCommunication => 0x8031_0000,
            Self::BadNotReadable => 0x803A_0000,
            Self::BadNotWritable => 0x803B_0000,
            Self::BadOutOfRange => 0x803C_0000,
            Self::BadNotFound => 0x803E_0000,
            Self::BadDeviceFailure => 0x808B_0000,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::GoodResultsMayBeIncomplete => "GoodResultsMayBeIncomplete",
            Self::Uncertain => "Uncertain",
            Self::BadInternalError => "BadInternalError",
            Self::BadResourceUnavailable => "BadResourceUnavailable",
            Self::BadCommunicationError => "BadCommunicationError",
            Self::BadEncodingError => "BadEncodingError",
            Self::BadDecodingError => "BadDecodingError",
            Self::BadUnknownResponse => "BadUnknownResponse",
            Self::BadTimeout => "BadTimeout",
            Self::BadNoCommunication => "BadNoCommunication",
            Self::BadNotReadable => "BadNotReadable",
            Self::BadNotWritable => "BadNotWritable",
            Self::BadOutOfRange => "BadOutOfRange",
            Self::BadNotFound => "BadNotFound",
            Self::BadDeviceFailure => "BadDeviceFailure",
        }
    }

    /// Look up a code by its numeric value
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    pub const fn severity(self) -> Severity {
        match self.code() >> 30 {
            0 => Severity::Good,
            1 => Severity::Uncertain,
            _ => Severity::Bad,
        }
    }

    /// HTTP status used by the REST front ends for a non-good outcome
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Good | Self::GoodResultsMayBeIncomplete | Self::Uncertain => 200,
            Self::BadNotFound => 404,
            Self::BadNotReadable | Self::BadNotWritable => 405,
            Self::BadEncodingError | Self::BadOutOfRange => 400,
            Self::BadTimeout => 504,
            Self::BadNoCommunication
            | Self::BadCommunicationError
            | Self::BadDecodingError
            | Self::BadUnknownResponse
            | Self::BadDeviceFailure => 502,
            Self::BadResourceUnavailable => 503,
            Self::BadInternalError => 500,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one gateway operation
///
/// Equality compares the code only; the explanation is informational.
#[derive(Debug, Clone)]
pub struct DataStatus {
    code: StatusCode,
    explanation: String,
}

impl DataStatus {
    pub const GOOD: DataStatus = DataStatus::of(StatusCode::Good);
    pub const GOOD_RESULTS_MAY_BE_INCOMPLETE: DataStatus =
        DataStatus::of(StatusCode::GoodResultsMayBeIncomplete);
    pub const UNCERTAIN: DataStatus = DataStatus::of(StatusCode::Uncertain);
    pub const BAD_INTERNAL_ERROR: DataStatus = DataStatus::of(StatusCode::BadInternalError);
    pub const BAD_NO_COMMUNICATION: DataStatus = DataStatus::of(StatusCode::BadNoCommunication);
    pub const BAD_COMMUNICATION_ERROR: DataStatus =
        DataStatus::of(StatusCode::BadCommunicationError);
    pub const BAD_TIMEOUT: DataStatus = DataStatus::of(StatusCode::BadTimeout);
    pub const BAD_DECODING_ERROR: DataStatus = DataStatus::of(StatusCode::BadDecodingError);
    pub const BAD_ENCODING_ERROR: DataStatus = DataStatus::of(StatusCode::BadEncodingError);
    pub const BAD_NOT_FOUND: DataStatus = DataStatus::of(StatusCode::BadNotFound);
    pub const BAD_NOT_READABLE: DataStatus = DataStatus::of(StatusCode::BadNotReadable);
    pub const BAD_NOT_WRITABLE: DataStatus = DataStatus::of(StatusCode::BadNotWritable);
    pub const BAD_OUT_OF_RANGE: DataStatus = DataStatus::of(StatusCode::BadOutOfRange);
    pub const BAD_DEVICE_FAILURE: DataStatus = DataStatus::of(StatusCode::BadDeviceFailure);
    pub const BAD_RESOURCE_UNAVAILABLE: DataStatus =
        DataStatus::of(StatusCode::BadResourceUnavailable);
    pub const BAD_UNKNOWN_RESPONSE: DataStatus = DataStatus::of(StatusCode::BadUnknownResponse);

    const fn of(code: StatusCode) -> Self {
        Self {
            code,
            explanation: String::new(),
        }
    }

    pub fn new(code: StatusCode, explanation: impl Into<String>) -> Self {
        Self {
            code,
            explanation: explanation.into(),
        }
    }

    /// Map a failure raised inside an operation to its status
    pub fn from_error(err: &GatewayError) -> Self {
        let code = match err {
            GatewayError::ConnectionFailed { .. } | GatewayError::NotConnected => {
                StatusCode::BadNoCommunication
            },
            GatewayError::Io(_) => StatusCode::BadCommunicationError,
            GatewayError::Timeout(_) => StatusCode::BadTimeout,
            GatewayError::ResourceUnavailable(_) => StatusCode::BadResourceUnavailable,
            GatewayError::DeviceException { .. } | GatewayError::DeviceFailure(_) => {
                StatusCode::BadDeviceFailure
            },
            GatewayError::UnknownResponse(_) => StatusCode::BadUnknownResponse,
            GatewayError::Decoding(_) => StatusCode::BadDecodingError,
            GatewayError::Encoding(_) => StatusCode::BadEncodingError,
            GatewayError::OutOfRange { .. } => StatusCode::BadOutOfRange,
            GatewayError::NotFound(_) => StatusCode::BadNotFound,
            GatewayError::NotReadable(_) => StatusCode::BadNotReadable,
            GatewayError::NotWritable(_) => StatusCode::BadNotWritable,
            GatewayError::Configuration(_)
            | GatewayError::Internal(_)
            | GatewayError::Other(_) => StatusCode::BadInternalError,
        };
        Self::new(code, err.to_string())
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code
    }

    pub fn code(&self) -> u32 {
        self.code.code()
    }

    pub fn name(&self) -> &'static str {
        self.code.name()
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn is_good(&self) -> bool {
        self.code.severity() == Severity::Good
    }

    pub fn is_not_good(&self) -> bool {
        !self.is_good()
    }

    pub fn is_uncertain(&self) -> bool {
        self.code.severity() == Severity::Uncertain
    }

    pub fn is_bad(&self) -> bool {
        self.code.severity() == Severity::Bad
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl Default for DataStatus {
    fn default() -> Self {
        Self::GOOD
    }
}

impl PartialEq for DataStatus {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for DataStatus {}

impl From<&GatewayError> for DataStatus {
    fn from(err: &GatewayError) -> Self {
        Self::from_error(err)
    }
}

impl fmt::Display for DataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.explanation.is_empty() {
            write!(f, "{}", self.name())
        } else {
            write!(f, "{} ({})", self.name(), self.explanation)
        }
    }
}

impl Serialize for DataStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DataStatus", 3)?;
        state.serialize_field("code", &self.code())?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("explanation", &self.explanation)?;
        state.end()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_top_bits() {
        for status in StatusCode::ALL {
            let expected = match status.name() {
                name if name.starts_with("Bad") => Severity::Bad,
                "Uncertain" => Severity::Uncertain,
                _ => Severity::Good,
            };
            assert_eq!(status.severity(), expected, "{}", status);
        }
    }

    #[test]
    fn test_codes_are_unique_and_resolvable() {
        for status in StatusCode::ALL {
            assert_eq!(StatusCode::from_code(status.code()), Some(status));
        }
        assert_eq!(StatusCode::from_code(0x1234_5678), None);
    }

    #[test]
    fn test_equality_ignores_explanation() {
        let a = DataStatus::new(StatusCode::BadTimeout, "first");
        let b = DataStatus::new(StatusCode::BadTimeout, "second");
        assert_eq!(a, b);
        assert_ne!(a, DataStatus::GOOD);
    }

    #[test]
    fn test_incomplete_results_count_as_good() {
        assert!(DataStatus::GOOD_RESULTS_MAY_BE_INCOMPLETE.is_good());
        assert!(DataStatus::UNCERTAIN.is_uncertain());
        assert!(DataStatus::UNCERTAIN.is_not_good());
        assert!(DataStatus::BAD_NOT_FOUND.is_bad());
    }

    #[test]
    fn test_from_error_mapping() {
        let cases = [
            (
                GatewayError::connection_failed("10.0.0.1:502", "refused"),
                StatusCode::BadNoCommunication,
            ),
            (
                GatewayError::Io(std::io::Error::other("reset")),
                StatusCode::BadCommunicationError,
            ),
            (GatewayError::timeout("wallbox"), StatusCode::BadTimeout),
            (
                GatewayError::DeviceException {
                    function: 3,
                    code: 2,
                },
                StatusCode::BadDeviceFailure,
            ),
            (GatewayError::decoding("bad enum"), StatusCode::BadDecodingError),
            (GatewayError::encoding("abc"), StatusCode::BadEncodingError),
            (GatewayError::out_of_range(70000, 0, 65535), StatusCode::BadOutOfRange),
            (GatewayError::NotFound("X".into()), StatusCode::BadNotFound),
            (GatewayError::NotWritable("X".into()), StatusCode::BadNotWritable),
            (GatewayError::config("broken"), StatusCode::BadInternalError),
        ];
        for (err, expected) in cases {
            let status = DataStatus::from_error(&err);
            assert_eq!(status.status_code(), expected);
            assert_eq!(status.explanation(), err.to_string());
        }
    }

    #[test]
    fn test_serialize_shape() {
        let status = DataStatus::new(StatusCode::BadNotFound, "Foo");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["code"], 0x803E_0000u32);
        assert_eq!(json["name"], "BadNotFound");
        assert_eq!(json["explanation"], "Foo");
    }

    #[test]
    fn test_display() {
        assert_eq!(DataStatus::GOOD.to_string(), "Good");
        assert_eq!(
            DataStatus::new(StatusCode::BadTimeout, "10s").to_string(),
            "BadTimeout (10s)"
        );
    }
}
