//! Command gateway for one absorbance reader.
//!
//! [`Gateway`] is the single entry point callers use. Every command runs the
//! same pipeline:
//!
//! ```text
//! parameters ──► validation ──► admission ──► retry ──► device channel
//!                    │              │                        │
//!              ValidationError  DeviceUnavailable      state machine
//!                                   Conflict           (Busy / Error)
//! ```
//!
//! Validation never touches the instrument or the state machine. Admission
//! claims the reader (Ready → Busy) for ReadPlate and ValidatePlate; RunAssay
//! hands off to the [`AssayScheduler`] and returns at once. Property reads
//! bypass the Busy gate but still queue on the channel lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use autoabsorb_core::{
    AssayDefinition, DeviceState, PlateFormat, PlateReadResult, WellSelection,
    validate_wavelength,
};
use autoabsorb_hardware::{DeviceChannel, DeviceInfo, InstrumentDriver};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::assay::{AssayId, AssayRun};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, NO_PLATE_MESSAGE, Result};
use crate::instrument::Instrument;
use crate::scheduler::AssayScheduler;
use crate::state::{BusyGuard, StateHandle};
use crate::state_machine::StateTransition;

/// Readings of one ReadPlate call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateReading {
    /// Absorbance per well label.
    pub data: BTreeMap<String, f64>,

    /// Wavelength in nm.
    pub wavelength: u16,

    /// When the plate was read.
    pub timestamp: DateTime<Utc>,
}

impl From<&PlateReadResult> for PlateReading {
    fn from(result: &PlateReadResult) -> Self {
        Self {
            data: result.values(),
            wavelength: result.wavelength_nm(),
            timestamp: result.captured_at(),
        }
    }
}

/// Reply to an accepted RunAssay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssayAccepted {
    pub assay_id: AssayId,
    pub expected_duration_seconds: u64,
}

/// Reply to ValidatePlate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlateValidation {
    pub plate_detected: bool,

    /// The instrument itself reports being idle.
    pub device_ready: bool,

    /// Status reported by the instrument.
    pub device_status: DeviceState,
}

/// Gateway over one absorbance reader.
///
/// # Examples
///
/// ```
/// use autoabsorb_gateway::{Gateway, GatewayConfig};
/// use autoabsorb_hardware::mock::MockReader;
///
/// #[tokio::main]
/// async fn main() -> Result<(), autoabsorb_gateway::GatewayError> {
///     let (reader, _handle) = MockReader::new();
///     let gateway = Gateway::new(reader, GatewayConfig::default());
///
///     gateway.connect().await?;
///     let reading = gateway.read_plate(450, "A1,A2").await?;
///     assert_eq!(reading.data.len(), 2);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Gateway {
    instrument: Arc<Instrument>,
    scheduler: AssayScheduler,
    config: GatewayConfig,
    device_info: Mutex<Option<DeviceInfo>>,

    /// Serializes connect, disconnect, reset and assay admission.
    lifecycle: tokio::sync::Mutex<()>,
}

impl Gateway {
    /// Take ownership of a driver. The reader starts Disconnected.
    pub fn new(driver: impl InstrumentDriver, config: GatewayConfig) -> Self {
        let channel = DeviceChannel::new(driver, config.channel_config());
        let instrument = Arc::new(Instrument::new(
            channel,
            config.retry_policy(),
            StateHandle::default(),
        ));
        Self {
            scheduler: AssayScheduler::new(Arc::clone(&instrument)),
            instrument,
            config,
            device_info: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Build a gateway and connect if the configuration asks for it.
    pub async fn start(driver: impl InstrumentDriver, config: GatewayConfig) -> Result<Self> {
        let auto_connect = config.auto_connect;
        let gateway = Self::new(driver, config);
        if auto_connect {
            gateway.connect().await?;
        }
        Ok(gateway)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn plate_format(&self) -> PlateFormat {
        self.instrument.plate_format()
    }

    fn state(&self) -> &StateHandle {
        self.instrument.state()
    }

    /// Number of calls that reached the driver.
    pub fn driver_calls(&self) -> u64 {
        self.instrument.driver_calls()
    }

    // ---- lifecycle ----

    /// Open the instrument link.
    ///
    /// From Disconnected this connects; from Error it performs a reset.
    /// Connecting an already connected reader returns the known info.
    pub async fn connect(&self) -> Result<DeviceInfo> {
        let _lifecycle = self.lifecycle.lock().await;
        match self.state().current() {
            DeviceState::Disconnected => self.open_link().await,
            DeviceState::Error => self.reset_link().await,
            state => self
                .device_info()
                .ok_or(GatewayError::DeviceUnavailable { state }),
        }
    }

    /// Close the instrument link.
    ///
    /// # Errors
    ///
    /// `Conflict` while an assay is active; `DeviceUnavailable` while an
    /// operation or calibration is in progress.
    pub async fn disconnect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(active) = self.scheduler.active() {
            return Err(GatewayError::conflict(format!(
                "assay {active} is active; cancel it before disconnecting"
            )));
        }

        match self.state().current() {
            DeviceState::Disconnected => Ok(()),
            state @ (DeviceState::Ready | DeviceState::Error) => {
                self.close_link().await;
                self.state().transition(DeviceState::Disconnected, "disconnect")?;
                info!("Disconnected from reader (was {})", state);
                Ok(())
            }
            state => Err(GatewayError::DeviceUnavailable { state }),
        }
    }

    /// Tear the link down and reconnect: Error → Disconnected → Ready.
    ///
    /// Also accepted from Ready and Disconnected, where an active assay
    /// blocks it. Recovery from Error is never blocked.
    pub async fn reset(&self) -> Result<DeviceInfo> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state().current() != DeviceState::Error
            && let Some(active) = self.scheduler.active()
        {
            return Err(GatewayError::conflict(format!(
                "assay {active} is active; cancel it before resetting"
            )));
        }
        self.reset_link().await
    }

    async fn reset_link(&self) -> Result<DeviceInfo> {
        match self.state().current() {
            DeviceState::Disconnected => {}
            DeviceState::Ready | DeviceState::Error => {
                self.close_link().await;
                self.state().transition(DeviceState::Disconnected, "reset")?;
            }
            state => return Err(GatewayError::DeviceUnavailable { state }),
        }
        self.open_link().await
    }

    async fn open_link(&self) -> Result<DeviceInfo> {
        let info = match self.instrument.connect().await {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to connect to reader: {}", e);
                return Err(e.into());
            }
        };
        self.state().transition(DeviceState::Ready, "connect")?;
        info!(
            "Connected to {} ({}, firmware {})",
            info.name,
            info.model,
            info.firmware_version.as_deref().unwrap_or("unknown")
        );
        *self.device_info.lock() = Some(info.clone());
        Ok(info)
    }

    /// Best-effort close; a dead link is already closed.
    async fn close_link(&self) {
        if let Err(e) = self.instrument.disconnect().await {
            warn!("Ignoring error while closing reader link: {}", e);
        }
        *self.device_info.lock() = None;
    }

    /// Cancel active assays, wait for them, and close the link.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        let _lifecycle = self.lifecycle.lock().await;
        if self.state().current() != DeviceState::Disconnected {
            self.close_link().await;
            self.state().force_disconnected("shutdown");
        }
        info!("Gateway shut down");
    }

    // ---- commands ----

    fn admit(&self, operation: &str) -> Result<BusyGuard> {
        self.state()
            .try_begin(operation)
            .map_err(|state| GatewayError::DeviceUnavailable { state })
    }

    /// Read absorbance at one wavelength for a well selection.
    ///
    /// `wells` is a separated list of labels (`"A1,B2"`) or `"AllWells"`.
    pub async fn read_plate(&self, wavelength_nm: i64, wells: &str) -> Result<PlateReading> {
        let wavelength_nm = validate_wavelength(wavelength_nm)?;
        let selection = WellSelection::parse(wells, self.plate_format())?;
        let wells = selection.resolve(self.plate_format());

        let _busy = self.admit("read_plate")?;
        if !self.instrument.plate_present().await? {
            return Err(GatewayError::validation(NO_PLATE_MESSAGE));
        }
        let result = self.instrument.read_wells(wavelength_nm, &wells).await?;
        Ok(PlateReading::from(&result))
    }

    /// Start a kinetic assay. Returns as soon as the run is accepted.
    pub async fn run_assay(
        &self,
        plate_id: &str,
        wavelengths: &[i64],
        num_reads: i64,
        interval_seconds: i64,
    ) -> Result<AssayAccepted> {
        let definition =
            AssayDefinition::new(plate_id, wavelengths, num_reads, interval_seconds)?;
        let expected_duration_seconds = definition.expected_duration_seconds();

        // Held so Disconnect and Reset cannot close the link under a new run.
        let _lifecycle = self.lifecycle.lock().await;
        let assay_id = self.scheduler.start(definition).await?;
        Ok(AssayAccepted {
            assay_id,
            expected_duration_seconds,
        })
    }

    pub fn get_assay_result(&self, assay_id: &str) -> Result<AssayRun> {
        self.scheduler.get(&AssayId::from(assay_id))
    }

    pub fn cancel_assay(&self, assay_id: &str) -> Result<AssayRun> {
        self.scheduler.cancel(&AssayId::from(assay_id))
    }

    pub fn discard_assay(&self, assay_id: &str) -> Result<AssayRun> {
        self.scheduler.discard(&AssayId::from(assay_id))
    }

    pub fn list_assays(&self) -> Vec<AssayRun> {
        self.scheduler.list()
    }

    /// Check for a seated plate and ask the instrument for its status.
    pub async fn validate_plate(&self) -> Result<PlateValidation> {
        let _busy = self.admit("validate_plate")?;
        let plate_detected = self.instrument.plate_present().await?;
        let device_status = self.instrument.reported_status().await?;
        Ok(PlateValidation {
            plate_detected,
            device_ready: device_status == DeviceState::Ready,
            device_status,
        })
    }

    /// Enter calibration (Ready → Calibrating).
    pub fn begin_calibration(&self) -> Result<()> {
        match self
            .state()
            .transition_from(DeviceState::Ready, DeviceState::Calibrating, "calibration")
        {
            Some(_) => {
                info!("Calibration started");
                Ok(())
            }
            None => Err(GatewayError::DeviceUnavailable {
                state: self.state().current(),
            }),
        }
    }

    /// Leave calibration (Calibrating → Ready).
    pub fn finish_calibration(&self) -> Result<()> {
        match self
            .state()
            .transition_from(DeviceState::Calibrating, DeviceState::Ready, "calibration")
        {
            Some(_) => {
                info!("Calibration finished");
                Ok(())
            }
            None => Err(GatewayError::DeviceUnavailable {
                state: self.state().current(),
            }),
        }
    }

    // ---- properties ----

    pub fn device_status(&self) -> DeviceState {
        self.state().current()
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.device_info.lock().clone()
    }

    /// Most recent state transitions, oldest first.
    pub fn state_history(&self, count: usize) -> Vec<StateTransition> {
        self.state().history(count)
    }

    /// Properties need an open link but not the Busy gate.
    fn require_link(&self) -> Result<()> {
        match self.state().current() {
            DeviceState::Disconnected => Err(GatewayError::DeviceUnavailable {
                state: DeviceState::Disconnected,
            }),
            _ => Ok(()),
        }
    }

    /// Chamber temperature in degrees Celsius.
    pub async fn current_temperature(&self) -> Result<f64> {
        self.require_link()?;
        Ok(self.instrument.temperature().await?)
    }

    pub async fn available_wavelengths(&self) -> Result<Vec<u16>> {
        self.require_link()?;
        Ok(self.instrument.available_wavelengths().await?)
    }

    pub async fn temperature_control(&self) -> Result<bool> {
        self.require_link()?;
        Ok(self.instrument.temperature_control().await?)
    }

    /// Switch temperature control. Refused while the reader is in Error.
    pub async fn set_temperature_control(&self, enabled: bool) -> Result<()> {
        match self.state().current() {
            state @ (DeviceState::Disconnected | DeviceState::Error) => {
                Err(GatewayError::DeviceUnavailable { state })
            }
            _ => {
                self.instrument.set_temperature_control(enabled).await?;
                info!(
                    "Temperature control {}",
                    if enabled { "enabled" } else { "disabled" }
                );
                Ok(())
            }
        }
    }
}
