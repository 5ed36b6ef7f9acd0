//! Raw types exchanged with instrument drivers.
//!
//! These mirror what a vendor SDK hands back before any validation. The
//! [`parse`](crate::parse) module is the only place that turns them into the
//! typed readings of `autoabsorb-core`.

use autoabsorb_core::DeviceState;
use serde::{Deserialize, Serialize};

/// Generic device information.
///
/// Returned by the driver when a connection is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "Absorbance 96").
    pub name: String,

    /// Device model identifier.
    pub model: String,

    /// Optional device serial number.
    pub serial_number: Option<String>,

    /// Optional firmware version string.
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    /// Create a new DeviceInfo with required fields.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            serial_number: None,
            firmware_version: None,
        }
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set the firmware version.
    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }
}

/// Unvalidated output of a single full-plate measurement.
///
/// Drivers return one value per well in row-major order (A1, A2, ..., H12).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMeasurement {
    /// Wavelength the driver reports having measured at.
    pub wavelength_nm: u16,

    /// Absorbance values, row-major.
    pub values: Vec<f64>,
}

/// Status word reported by the instrument itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RawStatus {
    /// Powered and idle.
    Idle,

    /// A measurement is running on the instrument.
    Measuring,

    /// Instrument-side calibration in progress.
    Calibrating,

    /// Instrument reports a fault condition.
    Fault,
}

impl RawStatus {
    /// Map the instrument's status word onto the gateway state vocabulary.
    #[must_use]
    pub fn to_device_state(self) -> DeviceState {
        match self {
            RawStatus::Idle => DeviceState::Ready,
            RawStatus::Measuring => DeviceState::Busy,
            RawStatus::Calibrating => DeviceState::Calibrating,
            RawStatus::Fault => DeviceState::Error,
        }
    }
}
