//! Error types surfaced to gateway callers.
//!
//! Every command fails with exactly one [`GatewayError`]; its [`ErrorKind`]
//! is the stable, serializable category callers branch on.

use autoabsorb_core::DeviceState;
use autoabsorb_hardware::{DeviceError, FailureClass};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assay::AssayStatus;

/// Reported when a read is requested with an empty plate slot.
pub(crate) const NO_PLATE_MESSAGE: &str = "no plate detected; insert a plate first";

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Stable failure category reported in the failure envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ValidationError")]
    Validation,
    DeviceUnavailable,
    #[serde(rename = "TransientDeviceError")]
    TransientDevice,
    #[serde(rename = "FatalDeviceError")]
    FatalDevice,
    NotFound,
    Conflict,
    AlreadyTerminal,
}

impl ErrorKind {
    /// Name used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::DeviceUnavailable => "DeviceUnavailable",
            ErrorKind::TransientDevice => "TransientDeviceError",
            ErrorKind::FatalDevice => "FatalDeviceError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::AlreadyTerminal => "AlreadyTerminal",
        }
    }
}

/// Errors returned by gateway commands.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Parameters failed validation; nothing was sent to the instrument.
    #[error("{message}")]
    Validation { message: String },

    /// The reader is not in a state that admits the command.
    #[error("Device is {state}")]
    DeviceUnavailable { state: DeviceState },

    /// A transient failure reached the caller (not retried, or the operation
    /// does not retry).
    #[error("{0}")]
    TransientDevice(DeviceError),

    /// The instrument failed in a way that needs intervention.
    #[error("{0}")]
    FatalDevice(DeviceError),

    #[error("Assay {0} not found")]
    NotFound(String),

    /// The command collides with work already in progress.
    #[error("{message}")]
    Conflict { message: String },

    #[error("Assay {id} is already {status}")]
    AlreadyTerminal { id: String, status: AssayStatus },
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Failure category for the envelope.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::DeviceUnavailable { .. } => ErrorKind::DeviceUnavailable,
            Self::TransientDevice(_) => ErrorKind::TransientDevice,
            Self::FatalDevice(_) => ErrorKind::FatalDevice,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::AlreadyTerminal { .. } => ErrorKind::AlreadyTerminal,
        }
    }
}

impl From<autoabsorb_core::Error> for GatewayError {
    fn from(error: autoabsorb_core::Error) -> Self {
        Self::validation(error.to_string())
    }
}

impl From<DeviceError> for GatewayError {
    fn from(error: DeviceError) -> Self {
        match error.class() {
            FailureClass::Transient => Self::TransientDevice(error),
            FailureClass::Fatal => Self::FatalDevice(error),
            FailureClass::InvalidInput => Self::validation(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DeviceError::busy("warming up"), ErrorKind::TransientDevice)]
    #[case(DeviceError::timeout("read_wells", 30_000), ErrorKind::TransientDevice)]
    #[case(DeviceError::NotConnected, ErrorKind::FatalDevice)]
    #[case(DeviceError::hardware_fault("lamp"), ErrorKind::FatalDevice)]
    #[case(DeviceError::malformed("short read"), ErrorKind::FatalDevice)]
    #[case(DeviceError::invalid_input("455 nm not fitted"), ErrorKind::Validation)]
    fn test_device_error_mapping(#[case] error: DeviceError, #[case] kind: ErrorKind) {
        assert_eq!(GatewayError::from(error).kind(), kind);
    }

    #[test]
    fn test_core_error_is_validation() {
        let error: GatewayError =
            autoabsorb_core::Error::out_of_range("wavelength_nm", 900, 350, 750).into();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(error.to_string(), "wavelength_nm must be 350-750, got 900");
    }

    #[rstest]
    #[case(ErrorKind::Validation, "\"ValidationError\"")]
    #[case(ErrorKind::DeviceUnavailable, "\"DeviceUnavailable\"")]
    #[case(ErrorKind::TransientDevice, "\"TransientDeviceError\"")]
    #[case(ErrorKind::FatalDevice, "\"FatalDeviceError\"")]
    #[case(ErrorKind::AlreadyTerminal, "\"AlreadyTerminal\"")]
    fn test_kind_wire_names(#[case] kind: ErrorKind, #[case] expected: &str) {
        assert_eq!(serde_json::to_string(&kind).unwrap(), expected);
        assert_eq!(format!("\"{}\"", kind.as_str()), expected);
    }

    #[test]
    fn test_unavailable_message_names_state() {
        let error = GatewayError::DeviceUnavailable {
            state: DeviceState::Busy,
        };
        assert_eq!(error.to_string(), "Device is Busy");
    }
}
