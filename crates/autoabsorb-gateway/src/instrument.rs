//! Device channel + retry policy + state machine, as one unit.
//!
//! Every instrument call made by the gateway or an assay run goes through
//! [`Instrument`]: the retry policy wraps the channel call, and any outcome
//! that classifies as fatal (including exhausted retries) moves the reader
//! to Error before the error is handed back. Invalid-input rejections pass
//! through without touching the state.

use std::future::Future;

use autoabsorb_core::{DeviceState, PlateFormat, PlateReadResult, WellId};
use autoabsorb_hardware::{DeviceChannel, DeviceInfo, RetryPolicy};
use tracing::error;

use crate::state::StateHandle;

type DeviceResult<T> = autoabsorb_hardware::Result<T>;

#[derive(Debug)]
pub struct Instrument {
    channel: DeviceChannel,
    retry: RetryPolicy,
    state: StateHandle,
}

impl Instrument {
    pub fn new(channel: DeviceChannel, retry: RetryPolicy, state: StateHandle) -> Self {
        Self {
            channel,
            retry,
            state,
        }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn plate_format(&self) -> PlateFormat {
        self.channel.plate_format()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Number of calls that reached the driver.
    pub fn driver_calls(&self) -> u64 {
        self.channel.driver_calls()
    }

    /// Run a channel call through the retry policy, recording fatal
    /// failures on the state machine.
    async fn call<T, F, Fut>(&self, operation: &str, call: F) -> DeviceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DeviceResult<T>>,
    {
        let result = self.retry.run(operation, call).await;
        if let Err(err) = &result
            && err.is_fatal()
        {
            error!("{} failed: {}", operation, err);
            self.state.fail(&format!("{operation}: {err}"));
        }
        result
    }

    /// Open the link. Fatal failures leave the state untouched; the caller
    /// owns the Disconnected → Ready transition.
    pub async fn connect(&self) -> DeviceResult<DeviceInfo> {
        self.retry.run("connect", || self.channel.connect()).await
    }

    /// Close the link, without retries.
    pub async fn disconnect(&self) -> DeviceResult<()> {
        self.channel.disconnect().await
    }

    pub async fn read_wells(
        &self,
        wavelength_nm: u16,
        wells: &[WellId],
    ) -> DeviceResult<PlateReadResult> {
        self.call("read_wells", || self.channel.read_wells(wavelength_nm, wells))
            .await
    }

    /// Status as reported by the instrument itself.
    pub async fn reported_status(&self) -> DeviceResult<DeviceState> {
        self.call("get_status", || self.channel.get_status()).await
    }

    pub async fn temperature(&self) -> DeviceResult<f64> {
        self.call("get_temperature", || self.channel.get_temperature())
            .await
    }

    pub async fn plate_present(&self) -> DeviceResult<bool> {
        self.call("check_plate_present", || self.channel.check_plate_present())
            .await
    }

    pub async fn available_wavelengths(&self) -> DeviceResult<Vec<u16>> {
        self.call("available_wavelengths", || {
            self.channel.available_wavelengths()
        })
        .await
    }

    pub async fn temperature_control(&self) -> DeviceResult<bool> {
        self.call("temperature_control", || self.channel.temperature_control())
            .await
    }

    pub async fn set_temperature_control(&self, enabled: bool) -> DeviceResult<()> {
        self.call("set_temperature_control", || {
            self.channel.set_temperature_control(enabled)
        })
        .await
    }
}
