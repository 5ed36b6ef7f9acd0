//! Assay run records.
//!
//! An [`AssayRun`] is owned by the scheduler; callers only ever receive
//! cloned snapshots. `reads` is append-only and `read_index` values are
//! contiguous from 0.

use std::collections::BTreeMap;
use std::fmt;

use autoabsorb_core::{AssayDefinition, PlateReadResult};
use autoabsorb_hardware::DeviceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, GatewayError};

/// Opaque assay identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssayId(String);

impl AssayId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssayId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AssayId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for AssayId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of an assay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssayStatus {
    Scheduled,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl AssayStatus {
    /// Scheduled or Running: blocks a new RunAssay.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, AssayStatus::Scheduled | AssayStatus::Running)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for AssayStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AssayStatus::Scheduled => "Scheduled",
            AssayStatus::Running => "Running",
            AssayStatus::Completed => "Completed",
            AssayStatus::Cancelled => "Cancelled",
            AssayStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Result of reading one wavelength during a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReadOutcome {
    /// Absorbance per well label.
    Measured {
        captured_at: DateTime<Utc>,
        data: BTreeMap<String, f64>,
    },
    Failed { kind: ErrorKind, message: String },
}

/// One wavelength of one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WavelengthRead {
    pub wavelength_nm: u16,
    #[serde(flatten)]
    pub outcome: ReadOutcome,
}

impl WavelengthRead {
    pub fn measured(result: &PlateReadResult) -> Self {
        Self {
            wavelength_nm: result.wavelength_nm(),
            outcome: ReadOutcome::Measured {
                captured_at: result.captured_at(),
                data: result.values(),
            },
        }
    }

    pub fn failed(wavelength_nm: u16, error: &DeviceError) -> Self {
        let error = GatewayError::from(error.clone());
        Self {
            wavelength_nm,
            outcome: ReadOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_measured(&self) -> bool {
        matches!(self.outcome, ReadOutcome::Measured { .. })
    }
}

/// One tick of an assay: every wavelength of the definition, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssayRead {
    pub read_index: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub measurements: Vec<WavelengthRead>,
}

/// Snapshot of an assay run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssayRun {
    pub id: AssayId,
    pub definition: AssayDefinition,
    pub status: AssayStatus,
    pub reads: Vec<AssayRead>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Why the run failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl AssayRun {
    pub(crate) fn new(id: AssayId, definition: AssayDefinition) -> Self {
        Self {
            id,
            definition,
            status: AssayStatus::Scheduled,
            reads: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
            failure: None,
        }
    }

    /// Index the next appended read will get.
    #[must_use]
    pub fn next_read_index(&self) -> u32 {
        u32::try_from(self.reads.len()).unwrap_or(u32::MAX)
    }

    /// Move to a terminal status. Ignored if the run already ended.
    pub(crate) fn finish(&mut self, status: AssayStatus, failure: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.failure = failure;
        self.finished_at = Some(Utc::now());
        true
    }
}
