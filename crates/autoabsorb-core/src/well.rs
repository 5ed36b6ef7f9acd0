//! Microplate formats and well addressing.
//!
//! Wells are addressed by a row letter and a 1-based column number (`"A1"`,
//! `"H12"`). A [`WellId`] on its own only checks the syntax; whether the well
//! exists on a plate depends on the [`PlateFormat`], so command parameters are
//! parsed with [`WellSelection::parse`] which checks both.
//!
//! # Examples
//!
//! ```
//! use autoabsorb_core::{PlateFormat, WellSelection};
//!
//! let selection = WellSelection::parse("A2, A1,A2", PlateFormat::Wells96).unwrap();
//! let wells: Vec<String> = selection
//!     .resolve(PlateFormat::Wells96)
//!     .iter()
//!     .map(ToString::to_string)
//!     .collect();
//! assert_eq!(wells, vec!["A1", "A2"]);
//!
//! let all = WellSelection::parse("AllWells", PlateFormat::Wells96).unwrap();
//! assert_eq!(all.resolve(PlateFormat::Wells96).len(), 96);
//! ```

use crate::{
    Result,
    constants::{ALL_WELLS_SENTINEL, WELL_SEPARATORS},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Largest row count of any supported plate (384-well, rows A-P).
const MAX_ROWS: u8 = 16;

/// Largest column count of any supported plate (384-well).
const MAX_COLUMNS: u8 = 24;

/// Supported microplate layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum PlateFormat {
    Wells6,
    Wells12,
    Wells24,
    Wells48,
    #[default]
    Wells96,
    Wells384,
}

impl PlateFormat {
    /// Number of rows (letters) on the plate.
    #[must_use]
    pub fn rows(self) -> u8 {
        match self {
            PlateFormat::Wells6 => 2,
            PlateFormat::Wells12 => 3,
            PlateFormat::Wells24 => 4,
            PlateFormat::Wells48 => 6,
            PlateFormat::Wells96 => 8,
            PlateFormat::Wells384 => 16,
        }
    }

    /// Number of columns on the plate.
    #[must_use]
    pub fn columns(self) -> u8 {
        match self {
            PlateFormat::Wells6 => 3,
            PlateFormat::Wells12 => 4,
            PlateFormat::Wells24 => 6,
            PlateFormat::Wells48 => 8,
            PlateFormat::Wells96 => 12,
            PlateFormat::Wells384 => 24,
        }
    }

    #[must_use]
    pub fn well_count(self) -> usize {
        usize::from(self.rows()) * usize::from(self.columns())
    }

    /// Returns `true` if the well exists on this plate.
    #[must_use]
    pub fn contains(self, well: WellId) -> bool {
        well.row < self.rows() && well.column <= self.columns()
    }

    /// Row-major position of a well, as laid out in a full-plate read.
    #[must_use]
    pub fn index_of(self, well: WellId) -> Option<usize> {
        if !self.contains(well) {
            return None;
        }
        Some(usize::from(well.row) * usize::from(self.columns()) + usize::from(well.column) - 1)
    }

    /// Every well on the plate in row-major order (A1, A2, ..., B1, ...).
    #[must_use]
    pub fn all_wells(self) -> Vec<WellId> {
        (0..self.rows())
            .flat_map(|row| (1..=self.columns()).map(move |column| WellId { row, column }))
            .collect()
    }
}

impl From<PlateFormat> for u16 {
    fn from(format: PlateFormat) -> u16 {
        match format {
            PlateFormat::Wells6 => 6,
            PlateFormat::Wells12 => 12,
            PlateFormat::Wells24 => 24,
            PlateFormat::Wells48 => 48,
            PlateFormat::Wells96 => 96,
            PlateFormat::Wells384 => 384,
        }
    }
}

impl TryFrom<u16> for PlateFormat {
    type Error = Error;

    fn try_from(wells: u16) -> Result<Self> {
        match wells {
            6 => Ok(PlateFormat::Wells6),
            12 => Ok(PlateFormat::Wells12),
            24 => Ok(PlateFormat::Wells24),
            48 => Ok(PlateFormat::Wells48),
            96 => Ok(PlateFormat::Wells96),
            384 => Ok(PlateFormat::Wells384),
            other => Err(Error::Config(format!("Unsupported plate format: {other} wells"))),
        }
    }
}

impl fmt::Display for PlateFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-well", u16::from(*self))
    }
}

/// Well address: row letter plus 1-based column number.
///
/// Ordering is row-major, so sorted collections of wells match the physical
/// read order of the plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WellId {
    row: u8,
    column: u8,
}

impl WellId {
    /// Create a well from a zero-based row index and a 1-based column.
    ///
    /// # Errors
    /// Returns `Error::InvalidWell` if the address is outside the largest
    /// supported plate.
    pub fn new(row: u8, column: u8) -> Result<Self> {
        if row >= MAX_ROWS || column == 0 || column > MAX_COLUMNS {
            return Err(Error::InvalidWell(format!(
                "row index {row}, column {column} is outside A-P/1-{MAX_COLUMNS}"
            )));
        }
        Ok(Self { row, column })
    }

    /// Parse a well and check that it exists on `format`.
    ///
    /// # Errors
    /// Returns `Error::InvalidWell` for malformed input or wells beyond the
    /// plate.
    pub fn parse_for(input: &str, format: PlateFormat) -> Result<Self> {
        let well: WellId = input.parse()?;
        if !format.contains(well) {
            return Err(Error::InvalidWell(format!(
                "{well} does not exist on a {format} plate"
            )));
        }
        Ok(well)
    }

    /// Row letter (`'A'` for the first row).
    #[must_use]
    pub fn row_letter(&self) -> char {
        char::from(b'A' + self.row)
    }

    /// Zero-based row index.
    #[must_use]
    pub fn row(&self) -> u8 {
        self.row
    }

    /// 1-based column number.
    #[must_use]
    pub fn column(&self) -> u8 {
        self.column
    }
}

impl fmt::Display for WellId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.row_letter(), self.column)
    }
}

impl std::str::FromStr for WellId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Normalize: trim and uppercase
        let normalized = s.trim().to_ascii_uppercase();
        let mut chars = normalized.chars();

        let letter = chars
            .next()
            .filter(char::is_ascii_uppercase)
            .ok_or_else(|| Error::InvalidWell(format!("'{s}' must start with a row letter")))?;

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidWell(format!(
                "'{s}' must be a row letter followed by a column number"
            )));
        }

        let column: u8 = digits
            .parse()
            .map_err(|_| Error::InvalidWell(format!("column in '{s}' is out of range")))?;

        WellId::new(letter as u8 - b'A', column)
    }
}

impl TryFrom<String> for WellId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<WellId> for String {
    fn from(well: WellId) -> String {
        well.to_string()
    }
}

/// The set of wells a read applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WellSelection {
    /// Every well of the configured plate format.
    All,

    /// An explicit, deduplicated set of wells.
    Wells(BTreeSet<WellId>),
}

impl WellSelection {
    /// Parse a comma separated well list or the `AllWells` sentinel.
    ///
    /// Duplicates collapse; ordering of the input is irrelevant.
    ///
    /// # Errors
    /// Returns `Error::InvalidWell` if the list is empty, a token is
    /// malformed, or a well does not exist on `format`.
    pub fn parse(input: &str, format: PlateFormat) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case(ALL_WELLS_SENTINEL) {
            return Ok(WellSelection::All);
        }

        let wells = trimmed
            .split(WELL_SEPARATORS)
            .filter(|token| !token.is_empty())
            .map(|token| WellId::parse_for(token, format))
            .collect::<Result<BTreeSet<_>>>()?;

        if wells.is_empty() {
            return Err(Error::InvalidWell(format!(
                "well list is empty; use {ALL_WELLS_SENTINEL} to read the whole plate"
            )));
        }

        Ok(WellSelection::Wells(wells))
    }

    /// Expand into the concrete wells, in row-major order.
    #[must_use]
    pub fn resolve(&self, format: PlateFormat) -> Vec<WellId> {
        match self {
            WellSelection::All => format.all_wells(),
            WellSelection::Wells(wells) => wells
                .iter()
                .copied()
                .filter(|well| format.contains(*well))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, WellSelection::All)
    }
}

impl fmt::Display for WellSelection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WellSelection::All => f.write_str(ALL_WELLS_SENTINEL),
            WellSelection::Wells(wells) => {
                let labels: Vec<String> = wells.iter().map(ToString::to_string).collect();
                f.write_str(&labels.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("A1", 0, 1)]
    #[case("h12", 7, 12)]
    #[case(" B07 ", 1, 7)]
    #[case("P24", 15, 24)]
    fn test_well_id_valid(#[case] input: &str, #[case] row: u8, #[case] column: u8) {
        let well: WellId = input.parse().unwrap();
        assert_eq!(well.row(), row);
        assert_eq!(well.column(), column);
    }

    #[rstest]
    #[case("")]
    #[case("1A")]
    #[case("A")]
    #[case("A0")]
    #[case("A25")]
    #[case("Q1")]
    #[case("A1B")]
    #[case("A-1")]
    #[case("A999")]
    fn test_well_id_invalid(#[case] input: &str) {
        assert!(input.parse::<WellId>().is_err());
    }

    #[rstest]
    #[case(PlateFormat::Wells96, "H12", true)]
    #[case(PlateFormat::Wells96, "I1", false)]
    #[case(PlateFormat::Wells96, "A13", false)]
    #[case(PlateFormat::Wells24, "D6", true)]
    #[case(PlateFormat::Wells24, "E1", false)]
    #[case(PlateFormat::Wells384, "P24", true)]
    fn test_well_on_plate(#[case] format: PlateFormat, #[case] well: &str, #[case] ok: bool) {
        assert_eq!(WellId::parse_for(well, format).is_ok(), ok);
    }

    #[test]
    fn test_well_display_round_trip() {
        let well = WellId::new(7, 12).unwrap();
        assert_eq!(well.to_string(), "H12");
        assert_eq!("H12".parse::<WellId>().unwrap(), well);
    }

    #[test]
    fn test_well_ordering_is_row_major() {
        let a12: WellId = "A12".parse().unwrap();
        let b1: WellId = "B1".parse().unwrap();
        let a2: WellId = "A2".parse().unwrap();
        assert!(a2 < a12);
        assert!(a12 < b1);
    }

    #[rstest]
    #[case(PlateFormat::Wells6, 6)]
    #[case(PlateFormat::Wells12, 12)]
    #[case(PlateFormat::Wells24, 24)]
    #[case(PlateFormat::Wells48, 48)]
    #[case(PlateFormat::Wells96, 96)]
    #[case(PlateFormat::Wells384, 384)]
    fn test_plate_format_counts(#[case] format: PlateFormat, #[case] count: usize) {
        assert_eq!(format.well_count(), count);
        assert_eq!(format.all_wells().len(), count);
        assert_eq!(usize::from(u16::from(format)), count);
        assert_eq!(PlateFormat::try_from(count as u16).unwrap(), format);
    }

    #[test]
    fn test_index_of_matches_all_wells_order() {
        let format = PlateFormat::Wells96;
        for (i, well) in format.all_wells().into_iter().enumerate() {
            assert_eq!(format.index_of(well), Some(i));
        }
        assert_eq!(format.index_of("I1".parse().unwrap()), None);
    }

    #[test]
    fn test_selection_all_wells_sentinel() {
        for input in ["AllWells", "allwells", " ALLWELLS "] {
            let selection = WellSelection::parse(input, PlateFormat::Wells96).unwrap();
            assert!(selection.is_all());
        }
    }

    #[test]
    fn test_selection_deduplicates() {
        let selection = WellSelection::parse("A2,A1;a2 A1", PlateFormat::Wells96).unwrap();
        let wells = selection.resolve(PlateFormat::Wells96);
        assert_eq!(wells.len(), 2);
        assert_eq!(selection.to_string(), "A1,A2");
    }

    #[rstest]
    #[case("")]
    #[case(" , ;")]
    #[case("A1,Z9")]
    #[case("A1,I1")]
    fn test_selection_invalid(#[case] input: &str) {
        assert!(WellSelection::parse(input, PlateFormat::Wells96).is_err());
    }

    #[test]
    fn test_plate_format_serde() {
        let json = serde_json::to_string(&PlateFormat::Wells384).unwrap();
        assert_eq!(json, "384");
        let format: PlateFormat = serde_json::from_str("24").unwrap();
        assert_eq!(format, PlateFormat::Wells24);
        assert!(serde_json::from_str::<PlateFormat>("100").is_err());
    }

    #[test]
    fn test_well_serializes_as_label() {
        let well: WellId = "C4".parse().unwrap();
        assert_eq!(serde_json::to_string(&well).unwrap(), "\"C4\"");
    }
}
