//! Parameter bounds and defaults for the absorbance reader gateway.
//!
//! Every command parameter accepted by the gateway is validated against the
//! bounds defined here before the instrument is touched. Keeping them in one
//! place lets the command layer, the assay scheduler and the tests agree on
//! the declared constraints.
//!
//! # Usage
//!
//! ```
//! use autoabsorb_core::constants::*;
//!
//! fn wavelength_allowed(nm: i64) -> bool {
//!     (MIN_WAVELENGTH_NM..=MAX_WAVELENGTH_NM).contains(&nm)
//! }
//!
//! assert!(wavelength_allowed(450));
//! assert!(!wavelength_allowed(900));
//! ```

// ============================================================================
// Wavelengths
// ============================================================================

/// Shortest wavelength accepted by any command, in nanometres.
pub const MIN_WAVELENGTH_NM: i64 = 350;

/// Longest wavelength accepted by any command, in nanometres.
pub const MAX_WAVELENGTH_NM: i64 = 750;

/// Wavelength used when a caller does not specify one.
///
/// Tartrazine standard curves are read at 450 nm.
pub const DEFAULT_WAVELENGTH_NM: u16 = 450;

// ============================================================================
// Kinetic assays
// ============================================================================

/// Minimum number of wavelengths in one assay definition.
pub const MIN_ASSAY_WAVELENGTHS: usize = 1;

/// Maximum number of wavelengths in one assay definition.
pub const MAX_ASSAY_WAVELENGTHS: usize = 8;

/// Minimum number of timed reads in one assay.
pub const MIN_NUM_READS: i64 = 1;

/// Maximum number of timed reads in one assay.
pub const MAX_NUM_READS: i64 = 100;

/// Minimum spacing between two assay reads, in seconds.
pub const MIN_INTERVAL_SECONDS: i64 = 5;

/// Maximum spacing between two assay reads, in seconds (one hour).
pub const MAX_INTERVAL_SECONDS: i64 = 3600;

/// Maximum length of a caller supplied plate identifier.
pub const MAX_PLATE_ID_LENGTH: usize = 64;

// ============================================================================
// Wells
// ============================================================================

/// Sentinel accepted in place of an explicit well list.
///
/// Matching is case-insensitive.
pub const ALL_WELLS_SENTINEL: &str = "AllWells";

/// Separators accepted between wells in a well list (`"A1,A2 B3;C4"`).
pub const WELL_SEPARATORS: &[char] = &[',', ';', ' ', '\t', '\n'];
