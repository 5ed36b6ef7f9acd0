//! Mock device implementations for testing and development.
//!
//! This module provides a simulated absorbance reader that can be controlled
//! programmatically without requiring physical hardware.

pub mod reader;

// Re-export commonly used types
pub use reader::{DriverOp, MeasureRecord, MockReader, MockReaderHandle};
