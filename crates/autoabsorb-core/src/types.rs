use crate::{
    Result,
    constants::{MAX_WAVELENGTH_NM, MIN_WAVELENGTH_NM},
    error::Error,
    well::WellId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Operational state of the absorbance reader.
///
/// Exactly one value is current per gateway instance. Transitions are owned
/// by the gateway's state machine; callers only observe the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    /// No connection to the instrument (initial state).
    Disconnected,

    /// Connected and idle; instrument commands are admitted.
    Ready,

    /// An instrument operation is in flight.
    Busy,

    /// The instrument is recalibrating.
    Calibrating,

    /// A fatal failure occurred; requires an explicit reset or reconnect.
    Error,
}

impl DeviceState {
    /// Get the state name as reported by the `DeviceStatus` property.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Disconnected => "Disconnected",
            DeviceState::Ready => "Ready",
            DeviceState::Busy => "Busy",
            DeviceState::Calibrating => "Calibrating",
            DeviceState::Error => "Error",
        }
    }

    /// Returns `true` if instrument-touching commands are admitted.
    #[inline]
    #[must_use]
    pub fn admits_commands(self) -> bool {
        matches!(self, DeviceState::Ready)
    }

    /// Returns `true` if a physical link to the instrument is believed open.
    #[inline]
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            DeviceState::Ready | DeviceState::Busy | DeviceState::Calibrating
        )
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Disconnected" => Ok(DeviceState::Disconnected),
            "Ready" => Ok(DeviceState::Ready),
            "Busy" => Ok(DeviceState::Busy),
            "Calibrating" => Ok(DeviceState::Calibrating),
            "Error" => Ok(DeviceState::Error),
            other => Err(Error::Config(format!("Unknown device state: {other}"))),
        }
    }
}

/// Validate a wavelength against the declared command bounds.
///
/// # Errors
/// Returns `Error::OutOfRange` if `nm` is outside 350-750.
pub fn validate_wavelength(nm: i64) -> Result<u16> {
    if !(MIN_WAVELENGTH_NM..=MAX_WAVELENGTH_NM).contains(&nm) {
        return Err(Error::out_of_range(
            "wavelength_nm",
            nm,
            MIN_WAVELENGTH_NM,
            MAX_WAVELENGTH_NM,
        ));
    }
    // Bounds above guarantee the value fits.
    Ok(nm as u16)
}

/// Absorbance measured for one well at one wavelength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsorbanceReading {
    pub well: WellId,
    pub wavelength_nm: u16,
    pub value: f64,
    pub captured_at: DateTime<Utc>,
}

/// All readings produced by one physical plate read.
///
/// Built atomically: every reading shares the wavelength and the timestamp
/// of the read call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateReadResult {
    wavelength_nm: u16,
    captured_at: DateTime<Utc>,
    readings: BTreeMap<WellId, AbsorbanceReading>,
}

impl PlateReadResult {
    /// Assemble a result from `(well, value)` pairs of one read.
    ///
    /// A well appearing more than once keeps its last value.
    pub fn from_values(
        wavelength_nm: u16,
        captured_at: DateTime<Utc>,
        values: impl IntoIterator<Item = (WellId, f64)>,
    ) -> Self {
        let readings = values
            .into_iter()
            .map(|(well, value)| {
                let reading = AbsorbanceReading {
                    well,
                    wavelength_nm,
                    value,
                    captured_at,
                };
                (well, reading)
            })
            .collect();

        Self {
            wavelength_nm,
            captured_at,
            readings,
        }
    }

    #[must_use]
    pub fn wavelength_nm(&self) -> u16 {
        self.wavelength_nm
    }

    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Look up the reading for a single well.
    #[must_use]
    pub fn get(&self, well: &WellId) -> Option<&AbsorbanceReading> {
        self.readings.get(well)
    }

    /// Iterate readings in row-major well order.
    pub fn readings(&self) -> impl Iterator<Item = &AbsorbanceReading> {
        self.readings.values()
    }

    /// Flatten into `well label -> absorbance`, the shape returned to callers.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.readings
            .iter()
            .map(|(well, reading)| (well.to_string(), reading.value))
            .collect()
    }
}
