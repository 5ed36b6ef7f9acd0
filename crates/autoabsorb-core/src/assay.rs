use crate::{
    Result,
    constants::{
        MAX_ASSAY_WAVELENGTHS, MAX_INTERVAL_SECONDS, MAX_NUM_READS, MAX_PLATE_ID_LENGTH,
        MIN_ASSAY_WAVELENGTHS, MIN_INTERVAL_SECONDS, MIN_NUM_READS,
    },
    error::Error,
    types::validate_wavelength,
};
use serde::Serialize;
use std::time::Duration;

/// Validated description of a kinetic assay.
///
/// Immutable once constructed; the scheduler reads every wavelength, in the
/// order given here, on each of `num_reads` ticks spaced `interval_seconds`
/// apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssayDefinition {
    plate_id: String,
    wavelengths: Vec<u16>,
    num_reads: u32,
    interval_seconds: u32,
}

impl AssayDefinition {
    /// Create an assay definition with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidAssay` for an empty or oversized plate id, an
    /// empty, oversized or repeating wavelength list, and `Error::OutOfRange`
    /// for any numeric parameter outside its declared bounds.
    pub fn new(
        plate_id: &str,
        wavelengths: &[i64],
        num_reads: i64,
        interval_seconds: i64,
    ) -> Result<Self> {
        let plate_id = plate_id.trim();
        if plate_id.is_empty() {
            return Err(Error::InvalidAssay("plate_id must not be empty".to_string()));
        }
        if plate_id.len() > MAX_PLATE_ID_LENGTH {
            return Err(Error::InvalidAssay(format!(
                "plate_id must be at most {MAX_PLATE_ID_LENGTH} chars, got {}",
                plate_id.len()
            )));
        }

        let count = wavelengths.len();
        if !(MIN_ASSAY_WAVELENGTHS..=MAX_ASSAY_WAVELENGTHS).contains(&count) {
            return Err(Error::InvalidAssay(format!(
                "an assay needs {MIN_ASSAY_WAVELENGTHS}-{MAX_ASSAY_WAVELENGTHS} wavelengths, got {count}"
            )));
        }

        let mut validated = Vec::with_capacity(count);
        for &nm in wavelengths {
            let nm = validate_wavelength(nm)?;
            if validated.contains(&nm) {
                return Err(Error::InvalidAssay(format!(
                    "wavelength {nm} nm is listed more than once"
                )));
            }
            validated.push(nm);
        }

        if !(MIN_NUM_READS..=MAX_NUM_READS).contains(&num_reads) {
            return Err(Error::out_of_range(
                "num_reads",
                num_reads,
                MIN_NUM_READS,
                MAX_NUM_READS,
            ));
        }

        if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&interval_seconds) {
            return Err(Error::out_of_range(
                "interval_seconds",
                interval_seconds,
                MIN_INTERVAL_SECONDS,
                MAX_INTERVAL_SECONDS,
            ));
        }

        Ok(Self {
            plate_id: plate_id.to_string(),
            wavelengths: validated,
            num_reads: num_reads as u32,
            interval_seconds: interval_seconds as u32,
        })
    }

    #[must_use]
    pub fn plate_id(&self) -> &str {
        &self.plate_id
    }

    /// Wavelengths in measurement order.
    #[must_use]
    pub fn wavelengths(&self) -> &[u16] {
        &self.wavelengths
    }

    #[must_use]
    pub fn num_reads(&self) -> u32 {
        self.num_reads
    }

    #[must_use]
    pub fn interval_seconds(&self) -> u32 {
        self.interval_seconds
    }

    /// Wait between the completion of one tick and the start of the next.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_seconds))
    }

    /// Nominal assay length: `interval_seconds * (num_reads - 1)`.
    #[must_use]
    pub fn expected_duration_seconds(&self) -> u64 {
        u64::from(self.interval_seconds) * u64::from(self.num_reads.saturating_sub(1))
    }
}
