//! Serialized access to the single instrument link.
//!
//! The [`DeviceChannel`] owns the one [`InstrumentDriver`] of a gateway and is
//! the only path into it. Every primitive goes through the same operation
//! lock, so the physical device never sees two interleaved calls.
//!
//! # Architecture
//!
//! ```text
//! ReadPlate ──┐
//!             │     ┌──────────────┐      ┌──────────────────┐
//! Assay tick ─┼────►│ FIFO op lock │─────►│ spawn_blocking   │──► driver
//!             │     │ (tokio Mutex)│      │ (one call a time)│
//! Property  ──┘     └──────────────┘      └──────────────────┘
//! ```
//!
//! Waiters queue in arrival order (tokio's mutex is fair). Each call carries
//! a deadline that covers both the time spent queued and the driver call
//! itself; when it expires the caller gets a transient
//! [`DeviceError::Timeout`]. A driver call that has already started is never
//! interrupted: it keeps the lock until the driver returns.
//!
//! # Examples
//!
//! ```
//! use autoabsorb_hardware::channel::{ChannelConfig, DeviceChannel};
//! use autoabsorb_hardware::mock::MockReader;
//!
//! #[tokio::main]
//! async fn main() -> autoabsorb_hardware::Result<()> {
//!     let (reader, _handle) = MockReader::new();
//!     let channel = DeviceChannel::new(reader, ChannelConfig::default());
//!
//!     channel.connect().await?;
//!     let temperature = channel.get_temperature().await?;
//!     assert!(temperature > 0.0);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use autoabsorb_core::{DeviceState, PlateFormat, PlateReadResult, WellId};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{DeviceError, Result};
use crate::parse;
use crate::traits::InstrumentDriver;
use crate::types::DeviceInfo;

/// Default bound on queue time plus execution time of one call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Plate layout the driver reports values for.
    pub plate_format: PlateFormat,

    /// Maximum time a call may spend queued plus executing.
    pub call_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            plate_format: PlateFormat::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Exclusive, FIFO-ordered access to one instrument driver.
pub struct DeviceChannel {
    /// The driver; the mutex is the single-operation lock.
    driver: Arc<Mutex<Box<dyn InstrumentDriver>>>,

    /// Plate layout used to interpret full-plate reads.
    plate_format: PlateFormat,

    /// Deadline for queue plus execution of one call.
    call_timeout: Duration,

    /// Number of calls that reached the driver.
    driver_calls: Arc<AtomicU64>,
}

impl std::fmt::Debug for DeviceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceChannel")
            .field("plate_format", &self.plate_format)
            .field("call_timeout", &self.call_timeout)
            .field("driver_calls", &self.driver_calls())
            .finish_non_exhaustive()
    }
}

impl DeviceChannel {
    /// Take ownership of a driver.
    pub fn new(driver: impl InstrumentDriver, config: ChannelConfig) -> Self {
        Self {
            driver: Arc::new(Mutex::new(Box::new(driver))),
            plate_format: config.plate_format,
            call_timeout: config.call_timeout,
            driver_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Plate layout this channel reads.
    #[must_use]
    pub fn plate_format(&self) -> PlateFormat {
        self.plate_format
    }

    /// Number of driver calls executed so far.
    #[must_use]
    pub fn driver_calls(&self) -> u64 {
        self.driver_calls.load(Ordering::Relaxed)
    }

    /// Open the instrument connection.
    pub async fn connect(&self) -> Result<DeviceInfo> {
        let info = self.execute("connect", |driver| driver.connect()).await?;
        debug!("Connected to {} ({})", info.name, info.model);
        Ok(info)
    }

    /// Close the instrument connection.
    pub async fn disconnect(&self) -> Result<()> {
        self.execute("disconnect", |driver| driver.disconnect()).await
    }

    /// Measure the plate at one wavelength and keep the requested wells.
    ///
    /// The whole plate is read in one physical call; every returned reading
    /// carries the timestamp of that call.
    pub async fn read_wells(&self, wavelength_nm: u16, wells: &[WellId]) -> Result<PlateReadResult> {
        let raw = self
            .execute("read_wells", move |driver| driver.measure(wavelength_nm))
            .await?;
        let captured_at = Utc::now();
        parse::plate_read(&raw, wavelength_nm, wells, self.plate_format, captured_at)
    }

    /// Device state as reported by the instrument.
    pub async fn get_status(&self) -> Result<DeviceState> {
        let raw = self.execute("get_status", |driver| driver.status()).await?;
        Ok(raw.to_device_state())
    }

    /// Chamber temperature in degrees Celsius.
    pub async fn get_temperature(&self) -> Result<f64> {
        let raw = self
            .execute("get_temperature", |driver| driver.temperature())
            .await?;
        parse::temperature(raw)
    }

    /// Whether a plate is seated.
    pub async fn check_plate_present(&self) -> Result<bool> {
        self.execute("check_plate_present", |driver| driver.plate_present())
            .await
    }

    /// Sorted list of supported wavelengths.
    pub async fn available_wavelengths(&self) -> Result<Vec<u16>> {
        let raw = self
            .execute("available_wavelengths", |driver| {
                driver.available_wavelengths()
            })
            .await?;
        parse::wavelengths(raw)
    }

    /// Whether chamber temperature control is on.
    pub async fn temperature_control(&self) -> Result<bool> {
        self.execute("temperature_control", |driver| driver.temperature_control())
            .await
    }

    /// Switch chamber temperature control on or off.
    pub async fn set_temperature_control(&self, enabled: bool) -> Result<()> {
        self.execute("set_temperature_control", move |driver| {
            driver.set_temperature_control(enabled)
        })
        .await
    }

    /// Run one driver call under the operation lock.
    async fn execute<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn InstrumentDriver) -> Result<T> + Send + 'static,
    {
        let driver = Arc::clone(&self.driver);
        let driver_calls = Arc::clone(&self.driver_calls);

        let work = async move {
            let guard = driver.lock_owned().await;
            trace!(operation, "device channel acquired");
            driver_calls.fetch_add(1, Ordering::Relaxed);

            // The guard moves into the blocking task so the lock is held until
            // the driver returns, even if the caller stops waiting.
            tokio::task::spawn_blocking(move || {
                let mut guard = guard;
                call(&mut **guard)
            })
            .await
            .map_err(|e| DeviceError::hardware_fault(format!("{operation} driver call aborted: {e}")))?
        };

        match tokio::time::timeout(self.call_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                let duration_ms = u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!("Device channel {} timed out after {}ms", operation, duration_ms);
                Err(DeviceError::timeout(operation, duration_ms))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{DriverOp, MockReader};

    fn channel() -> (DeviceChannel, crate::mock::MockReaderHandle) {
        let (reader, handle) = MockReader::new();
        (DeviceChannel::new(reader, ChannelConfig::default()), handle)
    }

    #[tokio::test]
    async fn test_read_wells_maps_values() {
        let (channel, handle) = channel();
        let a1: WellId = "A1".parse().unwrap();
        let a2: WellId = "A2".parse().unwrap();
        handle.set_value(450, a1, 0.231);
        handle.set_value(450, a2, 0.198);

        channel.connect().await.unwrap();
        let result = channel.read_wells(450, &[a1, a2]).await.unwrap();

        assert_eq!(result.values().get("A1"), Some(&0.231));
        assert_eq!(result.values().get("A2"), Some(&0.198));
        assert_eq!(handle.calls(DriverOp::Measure), 1);
        assert_eq!(channel.driver_calls(), 2);
    }

    #[tokio::test]
    async fn test_calls_before_connect_fail_fatal() {
        let (channel, _handle) = channel();
        let err = channel.get_temperature().await.unwrap_err();
        assert_eq!(err, DeviceError::NotConnected);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (channel, handle) = channel();
        channel.connect().await.unwrap();
        assert_eq!(channel.get_status().await.unwrap(), DeviceState::Ready);

        handle.set_status(crate::types::RawStatus::Fault);
        assert_eq!(channel.get_status().await.unwrap(), DeviceState::Error);
    }

    #[tokio::test]
    async fn test_scripted_failure_passes_through() {
        let (channel, handle) = channel();
        channel.connect().await.unwrap();
        handle.fail_next(DriverOp::PlatePresent, DeviceError::busy("door open"));

        let err = channel.check_plate_present().await.unwrap_err();
        assert!(err.is_transient());
        assert!(channel.check_plate_present().await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_calls_never_overlap() {
        let (reader, handle) = MockReader::new();
        handle.set_call_delay(Duration::from_millis(20));
        let channel = Arc::new(DeviceChannel::new(reader, ChannelConfig::default()));
        channel.connect().await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let channel = Arc::clone(&channel);
            tasks.push(tokio::spawn(async move {
                channel.get_temperature().await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(handle.calls(DriverOp::Temperature), 6);
        assert_eq!(handle.max_concurrent_calls(), 1);
    }

    #[tokio::test]
    async fn test_queue_wait_is_bounded() {
        let (reader, handle) = MockReader::new();
        handle.set_call_delay(Duration::from_millis(300));
        let config = ChannelConfig {
            call_timeout: Duration::from_millis(100),
            ..ChannelConfig::default()
        };
        let channel = DeviceChannel::new(reader, config);

        let err = channel.connect().await.unwrap_err();
        assert!(matches!(err, DeviceError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_read_is_fatal() {
        let (channel, handle) = channel();
        channel.connect().await.unwrap();
        handle.corrupt_next_measurement();

        let a1: WellId = "A1".parse().unwrap();
        let err = channel.read_wells(450, &[a1]).await.unwrap_err();
        assert!(matches!(err, DeviceError::MalformedData { .. }));
    }
}
