//! Mock absorbance reader for testing and development.
//!
//! This module provides a simulated plate reader that can be controlled
//! programmatically for testing without requiring physical hardware.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use autoabsorb_core::{PlateFormat, WellId};
use parking_lot::Mutex;

use crate::{
    DeviceError, Result,
    traits::InstrumentDriver,
    types::{DeviceInfo, RawMeasurement, RawStatus},
};

/// Driver primitives, used to script failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Connect,
    Disconnect,
    Measure,
    Status,
    Temperature,
    PlatePresent,
    AvailableWavelengths,
    TemperatureControl,
    SetTemperatureControl,
}

/// One physical measurement observed by the mock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureRecord {
    /// Wavelength requested.
    pub wavelength_nm: u16,

    /// When the driver call started (tokio clock, so paused tests see
    /// virtual time).
    pub at: tokio::time::Instant,
}

/// Filters fitted to the simulated instrument.
const DEFAULT_WAVELENGTHS: [u16; 4] = [405, 450, 560, 620];

#[derive(Debug)]
struct MockState {
    device_present: bool,
    connected: bool,
    status: RawStatus,
    temperature: f64,
    temperature_control: bool,
    plate_present: bool,
    wavelengths: Vec<u16>,
    plate_format: PlateFormat,
    values: HashMap<(u16, WellId), f64>,
    scripted: HashMap<DriverOp, VecDeque<DeviceError>>,
    scripted_wavelengths: HashMap<u16, VecDeque<DeviceError>>,
    calls: HashMap<DriverOp, u64>,
    measure_log: Vec<MeasureRecord>,
    call_delay: Duration,
    corrupt_next: bool,
    in_flight: usize,
    max_in_flight: usize,
}

impl MockState {
    fn new(plate_format: PlateFormat) -> Self {
        Self {
            device_present: true,
            connected: false,
            status: RawStatus::Idle,
            temperature: 25.0,
            temperature_control: false,
            plate_present: true,
            wavelengths: DEFAULT_WAVELENGTHS.to_vec(),
            plate_format,
            values: HashMap::new(),
            scripted: HashMap::new(),
            scripted_wavelengths: HashMap::new(),
            calls: HashMap::new(),
            measure_log: Vec::new(),
            call_delay: Duration::ZERO,
            corrupt_next: false,
            in_flight: 0,
            max_in_flight: 0,
        }
    }

    /// Simulated absorbance: a gradient across the plate that rises slowly
    /// with every measurement, like a developing colour reaction.
    fn simulated_value(&self, wavelength_nm: u16, well: WellId, measurement: usize) -> f64 {
        if let Some(value) = self.values.get(&(wavelength_nm, well)) {
            return *value;
        }
        0.045
            + 0.015 * f64::from(well.row())
            + 0.01 * f64::from(well.column() - 1)
            + 0.001 * measurement as f64
    }
}

/// Mock absorbance reader for testing and development.
///
/// # Examples
///
/// ```
/// use autoabsorb_hardware::mock::{DriverOp, MockReader};
/// use autoabsorb_hardware::traits::InstrumentDriver;
///
/// let (mut reader, handle) = MockReader::new();
/// reader.connect().unwrap();
///
/// handle.set_temperature(37.0);
/// assert_eq!(reader.temperature().unwrap(), 37.0);
/// assert_eq!(handle.calls(DriverOp::Temperature), 1);
/// ```
#[derive(Debug)]
pub struct MockReader {
    state: Arc<Mutex<MockState>>,
    name: String,
}

impl MockReader {
    /// Create a new 96-well mock reader with the default name.
    ///
    /// Returns a tuple of (MockReader, MockReaderHandle) where the handle
    /// can be used to script the instrument's behaviour.
    pub fn new() -> (Self, MockReaderHandle) {
        Self::with_format("Mock Absorbance Reader".to_string(), PlateFormat::Wells96)
    }

    /// Create a new mock reader with a custom name and plate format.
    pub fn with_format(name: String, plate_format: PlateFormat) -> (Self, MockReaderHandle) {
        let state = Arc::new(Mutex::new(MockState::new(plate_format)));
        let reader = Self {
            state: Arc::clone(&state),
            name,
        };
        (reader, MockReaderHandle { state })
    }

    /// Record the call, apply scripted failures and the simulated latency.
    fn begin(&self, op: DriverOp) -> Result<()> {
        let (scripted, delay) = {
            let mut state = self.state.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            let scripted = state.scripted.get_mut(&op).and_then(VecDeque::pop_front);
            (scripted, state.call_delay)
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        state.in_flight -= 1;

        if let Some(error) = scripted {
            if matches!(error, DeviceError::ConnectionLost { .. }) {
                state.connected = false;
            }
            return Err(error);
        }

        let needs_link = !matches!(op, DriverOp::Connect | DriverOp::Disconnect);
        if needs_link && !state.connected {
            return Err(DeviceError::NotConnected);
        }
        Ok(())
    }
}

impl InstrumentDriver for MockReader {
    fn connect(&mut self) -> Result<DeviceInfo> {
        self.begin(DriverOp::Connect)?;
        let mut state = self.state.lock();
        if !state.device_present {
            return Err(DeviceError::NoDeviceFound);
        }
        state.connected = true;
        Ok(DeviceInfo::new(self.name.clone(), "MOCK-ABS")
            .with_serial_number("MOCK-0001")
            .with_firmware_version(autoabsorb_core::VERSION))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.begin(DriverOp::Disconnect)?;
        self.state.lock().connected = false;
        Ok(())
    }

    fn measure(&mut self, wavelength_nm: u16) -> Result<RawMeasurement> {
        let at = tokio::time::Instant::now();
        self.begin(DriverOp::Measure)?;
        let mut state = self.state.lock();

        if let Some(error) = state
            .scripted_wavelengths
            .get_mut(&wavelength_nm)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if !state.wavelengths.contains(&wavelength_nm) {
            return Err(DeviceError::invalid_input(format!(
                "wavelength {wavelength_nm} nm is not fitted"
            )));
        }

        let measurement = state.measure_log.len();
        state.measure_log.push(MeasureRecord { wavelength_nm, at });

        let mut values: Vec<f64> = state
            .plate_format
            .all_wells()
            .into_iter()
            .map(|well| state.simulated_value(wavelength_nm, well, measurement))
            .collect();

        if state.corrupt_next {
            state.corrupt_next = false;
            values.truncate(values.len() / 2);
        }

        Ok(RawMeasurement {
            wavelength_nm,
            values,
        })
    }

    fn status(&mut self) -> Result<RawStatus> {
        self.begin(DriverOp::Status)?;
        Ok(self.state.lock().status)
    }

    fn temperature(&mut self) -> Result<f64> {
        self.begin(DriverOp::Temperature)?;
        Ok(self.state.lock().temperature)
    }

    fn plate_present(&mut self) -> Result<bool> {
        self.begin(DriverOp::PlatePresent)?;
        Ok(self.state.lock().plate_present)
    }

    fn available_wavelengths(&mut self) -> Result<Vec<u16>> {
        self.begin(DriverOp::AvailableWavelengths)?;
        Ok(self.state.lock().wavelengths.clone())
    }

    fn temperature_control(&mut self) -> Result<bool> {
        self.begin(DriverOp::TemperatureControl)?;
        Ok(self.state.lock().temperature_control)
    }

    fn set_temperature_control(&mut self, enabled: bool) -> Result<()> {
        self.begin(DriverOp::SetTemperatureControl)?;
        self.state.lock().temperature_control = enabled;
        Ok(())
    }
}

/// Handle for controlling a mock reader.
///
/// Clones share the same simulated instrument.
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockReaderHandle {
    /// Fix the absorbance returned for one well at one wavelength.
    pub fn set_value(&self, wavelength_nm: u16, well: WellId, value: f64) {
        self.state.lock().values.insert((wavelength_nm, well), value);
    }

    /// Make the next call of `op` fail with `error`.
    ///
    /// Calls queue up: scripting the same op twice fails the next two calls.
    pub fn fail_next(&self, op: DriverOp, error: DeviceError) {
        self.state
            .lock()
            .scripted
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Make the next `count` calls of `op` fail with `error`.
    pub fn fail_times(&self, op: DriverOp, count: usize, error: DeviceError) {
        for _ in 0..count {
            self.fail_next(op, error.clone());
        }
    }

    /// Make the next `count` measurements at `wavelength_nm` fail with
    /// `error`; other wavelengths are unaffected.
    pub fn fail_wavelength(&self, wavelength_nm: u16, count: usize, error: DeviceError) {
        let mut state = self.state.lock();
        let queue = state.scripted_wavelengths.entry(wavelength_nm).or_default();
        queue.extend(std::iter::repeat_n(error, count));
    }

    /// Return half a plate from the next measurement.
    pub fn corrupt_next_measurement(&self) {
        self.state.lock().corrupt_next = true;
    }

    /// Simulate the instrument being unplugged: calls fail until reconnect.
    pub fn drop_connection(&self) {
        self.state.lock().connected = false;
    }

    /// Control whether discovery finds an instrument at all.
    pub fn set_device_present(&self, present: bool) {
        self.state.lock().device_present = present;
    }

    pub fn set_status(&self, status: RawStatus) {
        self.state.lock().status = status;
    }

    pub fn set_temperature(&self, celsius: f64) {
        self.state.lock().temperature = celsius;
    }

    pub fn set_plate_present(&self, present: bool) {
        self.state.lock().plate_present = present;
    }

    pub fn set_wavelengths(&self, wavelengths: Vec<u16>) {
        self.state.lock().wavelengths = wavelengths;
    }

    /// Block every driver call for `delay` (real time) before it answers.
    pub fn set_call_delay(&self, delay: Duration) {
        self.state.lock().call_delay = delay;
    }

    /// Number of times `op` reached the driver.
    pub fn calls(&self, op: DriverOp) -> u64 {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Total number of driver calls of any kind.
    pub fn total_calls(&self) -> u64 {
        self.state.lock().calls.values().sum()
    }

    /// Every successful measurement, in order.
    pub fn measurements(&self) -> Vec<MeasureRecord> {
        self.state.lock().measure_log.clone()
    }

    /// Highest number of driver calls observed executing at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn temperature_control(&self) -> bool {
        self.state.lock().temperature_control
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_connection() {
        let (mut reader, _handle) = MockReader::new();
        assert_eq!(reader.measure(450).unwrap_err(), DeviceError::NotConnected);
        reader.connect().unwrap();
        assert!(reader.measure(450).is_ok());
    }

    #[test]
    fn test_full_plate_values() {
        let (mut reader, handle) = MockReader::new();
        reader.connect().unwrap();
        let h12: WellId = "H12".parse().unwrap();
        handle.set_value(450, h12, 1.5);

        let raw = reader.measure(450).unwrap();
        assert_eq!(raw.values.len(), 96);
        assert_eq!(raw.values[95], 1.5);
        assert_eq!(raw.wavelength_nm, 450);
    }

    #[test]
    fn test_unfitted_wavelength_rejected() {
        let (mut reader, _handle) = MockReader::new();
        reader.connect().unwrap();
        let err = reader.measure(700).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidInput { .. }));
    }

    #[test]
    fn test_scripted_failures_in_order() {
        let (mut reader, handle) = MockReader::new();
        reader.connect().unwrap();
        handle.fail_times(DriverOp::Temperature, 2, DeviceError::busy("warming up"));

        assert!(reader.temperature().is_err());
        assert!(reader.temperature().is_err());
        assert_eq!(reader.temperature().unwrap(), 25.0);
        assert_eq!(handle.calls(DriverOp::Temperature), 3);
    }

    #[test]
    fn test_connection_lost_disconnects() {
        let (mut reader, handle) = MockReader::new();
        reader.connect().unwrap();
        handle.fail_next(DriverOp::Measure, DeviceError::connection_lost("cable"));

        assert!(reader.measure(450).is_err());
        assert!(!handle.is_connected());
        assert_eq!(reader.measure(450).unwrap_err(), DeviceError::NotConnected);
    }

    #[test]
    fn test_wavelength_failures_leave_other_wavelengths() {
        let (mut reader, handle) = MockReader::new();
        reader.connect().unwrap();
        handle.fail_wavelength(620, 1, DeviceError::busy("filter wheel"));

        assert!(reader.measure(450).is_ok());
        assert!(reader.measure(620).is_err());
        assert!(reader.measure(620).is_ok());
        let order: Vec<u16> = handle.measurements().iter().map(|m| m.wavelength_nm).collect();
        assert_eq!(order, vec![450, 620]);
    }

    #[test]
    fn test_dropped_connection_until_reconnect() {
        let (mut reader, handle) = MockReader::new();
        reader.connect().unwrap();
        handle.drop_connection();

        assert_eq!(reader.status().unwrap_err(), DeviceError::NotConnected);
        reader.connect().unwrap();
        assert_eq!(reader.status().unwrap(), RawStatus::Idle);
    }

    #[test]
    fn test_no_device_found() {
        let (mut reader, handle) = MockReader::new();
        handle.set_device_present(false);
        assert_eq!(reader.connect().unwrap_err(), DeviceError::NoDeviceFound);
    }

    #[test]
    fn test_simulated_values_drift_between_reads() {
        let (mut reader, _handle) = MockReader::new();
        reader.connect().unwrap();
        let first = reader.measure(450).unwrap();
        let second = reader.measure(450).unwrap();
        assert!(second.values[0] > first.values[0]);
    }
}
