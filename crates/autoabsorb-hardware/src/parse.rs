//! Parsing boundary between raw driver output and typed readings.
//!
//! Nothing past this module handles untyped driver data. Output that cannot
//! be mapped cleanly is rejected as [`DeviceError::MalformedData`], which is
//! never retried.

use autoabsorb_core::{PlateFormat, PlateReadResult, WellId};
use chrono::{DateTime, Utc};

use crate::error::{DeviceError, Result};
use crate::types::RawMeasurement;

/// Plausible chamber temperature range in degrees Celsius.
const TEMPERATURE_RANGE_C: std::ops::RangeInclusive<f64> = -40.0..=120.0;

/// Map a full-plate measurement onto the requested wells.
///
/// All readings share `captured_at`, the time the physical read returned.
///
/// # Errors
/// Returns `DeviceError::MalformedData` if the driver reports a different
/// wavelength, returns the wrong number of values for `format`, or returns
/// a non-finite value.
pub fn plate_read(
    raw: &RawMeasurement,
    requested_nm: u16,
    wells: &[WellId],
    format: PlateFormat,
    captured_at: DateTime<Utc>,
) -> Result<PlateReadResult> {
    if raw.wavelength_nm != requested_nm {
        return Err(DeviceError::malformed(format!(
            "requested {requested_nm} nm but device measured {} nm",
            raw.wavelength_nm
        )));
    }

    if raw.values.len() != format.well_count() {
        return Err(DeviceError::malformed(format!(
            "expected {} values for a {format} plate, got {}",
            format.well_count(),
            raw.values.len()
        )));
    }

    if let Some(position) = raw.values.iter().position(|v| !v.is_finite()) {
        return Err(DeviceError::malformed(format!(
            "non-finite absorbance at plate position {position}"
        )));
    }

    let values = wells
        .iter()
        .map(|well| {
            format
                .index_of(*well)
                .map(|index| (*well, raw.values[index]))
                .ok_or_else(|| {
                    DeviceError::malformed(format!("{well} is not on a {format} plate"))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PlateReadResult::from_values(requested_nm, captured_at, values))
}

/// Validate a temperature reported by the driver.
///
/// # Errors
/// Returns `DeviceError::MalformedData` for non-finite or implausible values.
pub fn temperature(raw: f64) -> Result<f64> {
    if !raw.is_finite() || !TEMPERATURE_RANGE_C.contains(&raw) {
        return Err(DeviceError::malformed(format!(
            "implausible chamber temperature {raw}"
        )));
    }
    Ok(raw)
}

/// Normalize the wavelength list reported by the driver.
///
/// The result is sorted and free of duplicates.
///
/// # Errors
/// Returns `DeviceError::MalformedData` if the device reports no wavelengths.
pub fn wavelengths(mut raw: Vec<u16>) -> Result<Vec<u16>> {
    raw.sort_unstable();
    raw.dedup();
    if raw.is_empty() {
        return Err(DeviceError::malformed("device reports no wavelengths"));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_plate(nm: u16) -> RawMeasurement {
        RawMeasurement {
            wavelength_nm: nm,
            values: (0..96).map(|i| f64::from(i) / 100.0).collect(),
        }
    }

    fn wells(labels: &[&str]) -> Vec<WellId> {
        labels.iter().map(|l| l.parse().unwrap()).collect()
    }

    #[test]
    fn test_plate_read_selects_wells() {
        let now = Utc::now();
        let result = plate_read(
            &full_plate(450),
            450,
            &wells(&["A1", "A2", "B1", "H12"]),
            PlateFormat::Wells96,
            now,
        )
        .unwrap();

        let values = result.values();
        assert_eq!(values["A1"], 0.0);
        assert_eq!(values["A2"], 0.01);
        assert_eq!(values["B1"], 0.12);
        assert_eq!(values["H12"], 0.95);
        assert_eq!(result.captured_at(), now);
        assert_eq!(result.wavelength_nm(), 450);
    }

    #[test]
    fn test_plate_read_rejects_wrong_length() {
        let mut raw = full_plate(450);
        raw.values.pop();
        let err = plate_read(&raw, 450, &wells(&["A1"]), PlateFormat::Wells96, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DeviceError::MalformedData { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_plate_read_rejects_wrong_wavelength() {
        let err = plate_read(
            &full_plate(600),
            450,
            &wells(&["A1"]),
            PlateFormat::Wells96,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DeviceError::MalformedData { .. }));
    }

    #[test]
    fn test_plate_read_rejects_nan() {
        let mut raw = full_plate(450);
        raw.values[40] = f64::NAN;
        let err = plate_read(&raw, 450, &wells(&["A1"]), PlateFormat::Wells96, Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("position 40"));
    }

    #[test]
    fn test_temperature_bounds() {
        assert_eq!(temperature(25.4).unwrap(), 25.4);
        assert!(temperature(f64::INFINITY).is_err());
        assert!(temperature(500.0).is_err());
    }

    #[test]
    fn test_wavelengths_normalized() {
        assert_eq!(wavelengths(vec![600, 450, 450, 405]).unwrap(), vec![405, 450, 600]);
        assert!(wavelengths(Vec::new()).is_err());
    }
}
