//! Instrument access layer for the AutoAbsorb plate reader gateway.
//!
//! This crate owns everything between the gateway and the vendor SDK of a
//! microplate absorbance reader:
//!
//! - [`InstrumentDriver`]: the blocking interface a vendor SDK binding
//!   implements (connect, measure, status, temperature, plate presence).
//! - [`DeviceChannel`]: the single owner of the driver. Serializes every call
//!   through one FIFO lock with a bounded wait, and runs the blocking calls
//!   off the async executor.
//! - [`RetryPolicy`]: bounded exponential backoff for transient failures.
//! - [`parse`]: the one place raw driver output becomes typed readings.
//! - [`mock::MockReader`]: a scriptable simulated reader for development and
//!   tests.
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`][error::Result] with a [`DeviceError`].
//! Every error has a [`FailureClass`] (transient, fatal, invalid input);
//! retry and state handling decide on the class, never on the variant.
//!
//! # Example
//!
//! ```
//! use autoabsorb_hardware::{ChannelConfig, DeviceChannel, RetryPolicy};
//! use autoabsorb_hardware::mock::MockReader;
//!
//! #[tokio::main]
//! async fn main() -> autoabsorb_hardware::Result<()> {
//!     let (reader, _handle) = MockReader::new();
//!     let channel = DeviceChannel::new(reader, ChannelConfig::default());
//!     let retry = RetryPolicy::default();
//!
//!     channel.connect().await?;
//!     let wells: Vec<autoabsorb_core::WellId> = vec!["A1".parse().unwrap()];
//!     let result = retry.run("read_wells", || channel.read_wells(450, &wells)).await?;
//!     assert_eq!(result.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! [`InstrumentDriver`]: traits::InstrumentDriver

pub mod channel;
pub mod error;
pub mod mock;
pub mod parse;
pub mod retry;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use channel::{ChannelConfig, DeviceChannel};
pub use error::{DeviceError, FailureClass, Result};
pub use retry::RetryPolicy;
pub use traits::InstrumentDriver;
pub use types::{DeviceInfo, RawMeasurement, RawStatus};
