use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Parameter validation
    #[error("{field} must be {min}-{max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Invalid well: {0}")]
    InvalidWell(String),

    #[error("Invalid assay definition: {0}")]
    InvalidAssay(String),

    // State machine
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build an [`Error::OutOfRange`] for a named parameter.
    pub fn out_of_range(field: &'static str, value: i64, min: i64, max: i64) -> Self {
        Self::OutOfRange {
            field,
            value,
            min,
            max,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
