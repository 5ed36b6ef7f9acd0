//! Error types for instrument operations.
//!
//! Every failure raised by a driver or by the device channel is a
//! [`DeviceError`]. Callers never match on individual variants to decide how
//! to react; they ask for the [`FailureClass`] instead, which is what the
//! retry policy and the gateway state machine act on.

use serde::{Deserialize, Serialize};

/// Result type alias for instrument operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureClass {
    /// Expected to succeed on retry (timeout, momentarily busy).
    Transient,

    /// Requires external intervention (disconnect, hardware fault).
    Fatal,

    /// The instrument rejected a parameter; not a device fault.
    InvalidInput,
}

/// Errors that can occur during instrument operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    /// Operation did not finish within the allowed time.
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// Instrument asked the host to retry later.
    #[error("Device busy: {message}")]
    Busy { message: String },

    /// No connection has been opened.
    #[error("Device not connected")]
    NotConnected,

    /// The connection dropped while in use.
    #[error("Connection lost: {message}")]
    ConnectionLost { message: String },

    /// Discovery found no instrument to open.
    #[error("No absorbance reader found")]
    NoDeviceFound,

    /// Instrument reported a hardware fault.
    #[error("Hardware fault: {message}")]
    HardwareFault { message: String },

    /// Instrument rejected a parameter as out of range.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Raw driver output could not be mapped to typed readings.
    #[error("Malformed device data: {message}")]
    MalformedData { message: String },

    /// Transient failures persisted past the retry budget.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<DeviceError>,
    },
}

impl DeviceError {
    /// Classify this failure for retry and state handling.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Timeout { .. } | Self::Busy { .. } => FailureClass::Transient,
            Self::InvalidInput { .. } => FailureClass::InvalidInput,
            Self::NotConnected
            | Self::ConnectionLost { .. }
            | Self::NoDeviceFound
            | Self::HardwareFault { .. }
            | Self::MalformedData { .. }
            | Self::RetriesExhausted { .. } => FailureClass::Fatal,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.class() == FailureClass::Fatal
    }

    /// Create a new timeout error.
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Create a new busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    /// Create a new connection lost error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    /// Create a new hardware fault error.
    pub fn hardware_fault(message: impl Into<String>) -> Self {
        Self::HardwareFault {
            message: message.into(),
        }
    }

    /// Create a new invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new malformed data error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedData {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DeviceError::timeout("measure", 3000), FailureClass::Transient)]
    #[case(DeviceError::busy("shutter moving"), FailureClass::Transient)]
    #[case(DeviceError::NotConnected, FailureClass::Fatal)]
    #[case(DeviceError::connection_lost("usb unplugged"), FailureClass::Fatal)]
    #[case(DeviceError::NoDeviceFound, FailureClass::Fatal)]
    #[case(DeviceError::hardware_fault("lamp failure"), FailureClass::Fatal)]
    #[case(DeviceError::malformed("95 values"), FailureClass::Fatal)]
    #[case(DeviceError::invalid_input("wavelength 455"), FailureClass::InvalidInput)]
    fn test_failure_class(#[case] error: DeviceError, #[case] expected: FailureClass) {
        assert_eq!(error.class(), expected);
    }

    #[test]
    fn test_retries_exhausted_is_fatal() {
        let error = DeviceError::RetriesExhausted {
            operation: "read_wells".to_string(),
            attempts: 3,
            last: Box::new(DeviceError::timeout("read_wells", 100)),
        };
        assert!(error.is_fatal());
        assert_eq!(
            error.to_string(),
            "read_wells failed after 3 attempts: read_wells timed out after 100ms"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            DeviceError::timeout("temperature", 3000).to_string(),
            "temperature timed out after 3000ms"
        );
        assert_eq!(DeviceError::NotConnected.to_string(), "Device not connected");
        assert_eq!(
            DeviceError::invalid_input("bad").to_string(),
            "Invalid input: bad"
        );
    }
}
