//! Instrument driver trait definition.
//!
//! Vendor SDKs for plate readers are blocking libraries holding a single
//! device handle. [`InstrumentDriver`] captures exactly that shape: plain
//! `&mut self` methods that block until the instrument answers. Drivers are
//! never called directly by the gateway; the [`DeviceChannel`] owns the one
//! driver instance, serializes access to it and runs each call on the
//! blocking thread pool.
//!
//! [`DeviceChannel`]: crate::channel::DeviceChannel

use crate::error::Result;
use crate::types::{DeviceInfo, RawMeasurement, RawStatus};

/// Blocking interface to a microplate absorbance reader.
///
/// # Errors
///
/// Implementations report failures as [`DeviceError`](crate::DeviceError)
/// variants that classify correctly: a dropped link must surface as
/// `ConnectionLost`, a rejected parameter as `InvalidInput`, and a
/// "retry later" answer as `Busy` or `Timeout`.
///
/// # Examples
///
/// ```
/// use autoabsorb_hardware::mock::MockReader;
/// use autoabsorb_hardware::traits::InstrumentDriver;
///
/// let (mut reader, _handle) = MockReader::new();
/// let info = reader.connect().unwrap();
/// assert_eq!(info.name, "Mock Absorbance Reader");
///
/// let raw = reader.measure(450).unwrap();
/// assert_eq!(raw.values.len(), 96);
/// ```
pub trait InstrumentDriver: Send + 'static {
    /// Open the device handle.
    fn connect(&mut self) -> Result<DeviceInfo>;

    /// Close the device handle. Closing a closed handle is not an error.
    fn disconnect(&mut self) -> Result<()>;

    /// Measure the whole plate at one wavelength.
    fn measure(&mut self, wavelength_nm: u16) -> Result<RawMeasurement>;

    /// Read the instrument's own status word.
    fn status(&mut self) -> Result<RawStatus>;

    /// Chamber temperature in degrees Celsius.
    fn temperature(&mut self) -> Result<f64>;

    /// Whether a plate is seated in the slot.
    fn plate_present(&mut self) -> Result<bool>;

    /// Wavelengths the instrument's filters support, in nanometres.
    fn available_wavelengths(&mut self) -> Result<Vec<u16>>;

    /// Whether chamber temperature control is enabled.
    fn temperature_control(&mut self) -> Result<bool>;

    /// Enable or disable chamber temperature control.
    fn set_temperature_control(&mut self, enabled: bool) -> Result<()>;
}
