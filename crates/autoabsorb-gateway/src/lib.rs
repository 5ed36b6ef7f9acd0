//! Command gateway for a microplate absorbance reader.
//!
//! This crate turns an [`InstrumentDriver`] into a safe, concurrently usable
//! service:
//!
//! - [`StateMachine`] / [`StateHandle`]: the reader lifecycle
//!   (Disconnected, Ready, Busy, Calibrating, Error) and the Busy gate.
//! - [`AssayScheduler`]: timed kinetic assays with cooperative cancellation.
//! - [`Gateway`]: validation, admission and dispatch for every command and
//!   property.
//! - [`Command`]: the JSON wire form, answered with success/failure
//!   envelopes.
//!
//! [`InstrumentDriver`]: autoabsorb_hardware::InstrumentDriver

pub mod assay;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod instrument;
pub mod scheduler;
pub mod state;
pub mod state_machine;

pub use assay::{AssayId, AssayRead, AssayRun, AssayStatus, ReadOutcome, WavelengthRead};
pub use commands::{Command, Property, WellsArg};
pub use config::{GatewayConfig, RetryConfig};
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::{AssayAccepted, Gateway, PlateReading, PlateValidation};
pub use scheduler::AssayScheduler;
pub use state::{BusyGuard, StateHandle};
pub use state_machine::{StateMachine, StateMachineBuilder, StateTransition};
