//! Kinetic assay scheduling.
//!
//! Each accepted assay runs as its own tokio task. The task fires tick 0
//! immediately, then sleeps `interval` after each tick completes before
//! firing the next, so drift from slow reads never shortens the gap between
//! reads.
//!
//! A tick waits for the reader to become Ready, holds it Busy for the whole
//! tick, and reads every wavelength of the definition in order. A failed
//! read is recorded in the tick and the run carries on, unless the failure
//! is fatal, in which case the run ends as Failed.
//!
//! Cancellation is cooperative: [`AssayScheduler::cancel`] trips the run's
//! `CancellationToken`, which is observed between ticks. A tick that is
//! already reading completes and is recorded before the run is marked
//! Cancelled.

use std::collections::HashMap;
use std::sync::Arc;

use autoabsorb_core::{AssayDefinition, WellId};
use autoabsorb_hardware::DeviceError;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assay::{AssayId, AssayRead, AssayRun, AssayStatus, WavelengthRead};
use crate::error::{GatewayError, NO_PLATE_MESSAGE, Result};
use crate::instrument::Instrument;

struct RunEntry {
    run: AssayRun,
    cancel: CancellationToken,
    tick_in_flight: bool,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    instrument: Arc<Instrument>,
    runs: Mutex<HashMap<AssayId, RunEntry>>,
}

/// Owns every assay run of one gateway.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct AssayScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AssayScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssayScheduler")
            .field("runs", &self.inner.runs.lock().len())
            .finish_non_exhaustive()
    }
}

impl AssayScheduler {
    pub fn new(instrument: Arc<Instrument>) -> Self {
        Self {
            inner: Arc::new(Inner {
                instrument,
                runs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Accept an assay and fire its first tick.
    ///
    /// # Errors
    ///
    /// - `Conflict` if another run is Scheduled or Running
    /// - `DeviceUnavailable` if the reader is not Ready
    /// - `Validation` if no plate is seated or a wavelength is not offered by
    ///   the instrument
    /// - a device error if the wavelength query itself fails
    pub async fn start(&self, definition: AssayDefinition) -> Result<AssayId> {
        {
            let runs = self.inner.runs.lock();
            self.admit(&runs)?;
        }

        if !self.inner.instrument.plate_present().await? {
            return Err(GatewayError::validation(NO_PLATE_MESSAGE));
        }

        let available = self.inner.instrument.available_wavelengths().await?;
        if let Some(nm) = definition
            .wavelengths()
            .iter()
            .find(|nm| !available.contains(nm))
        {
            return Err(GatewayError::validation(format!(
                "wavelength {nm} nm is not available on this reader (available: {available:?})"
            )));
        }

        let id = AssayId::generate();
        let cancel = CancellationToken::new();

        let mut runs = self.inner.runs.lock();
        self.admit(&runs)?;

        let mut run = AssayRun::new(id.clone(), definition.clone());
        run.status = AssayStatus::Running;
        let task = tokio::spawn(drive(
            Arc::clone(&self.inner),
            id.clone(),
            definition.clone(),
            cancel.clone(),
        ));
        runs.insert(
            id.clone(),
            RunEntry {
                run,
                cancel,
                tick_in_flight: false,
                task: Some(task),
            },
        );

        info!(
            "Assay {} accepted: plate {}, {} reads at {:?} nm every {}s",
            id,
            definition.plate_id(),
            definition.num_reads(),
            definition.wavelengths(),
            definition.interval_seconds()
        );
        Ok(id)
    }

    /// No run may be active and the reader must be Ready. An active run
    /// reports Conflict even while its own tick holds the reader Busy.
    fn admit(&self, runs: &HashMap<AssayId, RunEntry>) -> Result<()> {
        if let Some(active) = runs.values().find(|entry| entry.run.status.is_active()) {
            return Err(GatewayError::conflict(format!(
                "assay {} is still {}",
                active.run.id, active.run.status
            )));
        }
        let state = self.inner.instrument.state().current();
        if !state.admits_commands() {
            return Err(GatewayError::DeviceUnavailable { state });
        }
        Ok(())
    }

    /// Request cancellation.
    ///
    /// Returns the snapshot at the time of the request. If no tick is
    /// reading, the run is Cancelled immediately; otherwise it becomes
    /// Cancelled once the in-flight tick has been recorded.
    pub fn cancel(&self, id: &AssayId) -> Result<AssayRun> {
        let mut runs = self.inner.runs.lock();
        let entry = runs
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        if entry.run.status.is_terminal() {
            return Err(GatewayError::AlreadyTerminal {
                id: id.to_string(),
                status: entry.run.status,
            });
        }

        entry.cancel.cancel();
        if !entry.tick_in_flight {
            entry.run.finish(AssayStatus::Cancelled, None);
        }
        info!("Assay {} cancellation requested", id);
        Ok(entry.run.clone())
    }

    /// Snapshot of a run. Never waits for a tick.
    pub fn get(&self, id: &AssayId) -> Result<AssayRun> {
        self.inner
            .runs
            .lock()
            .get(id)
            .map(|entry| entry.run.clone())
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    /// Snapshots of every retained run, oldest first.
    pub fn list(&self) -> Vec<AssayRun> {
        let mut runs: Vec<AssayRun> = self
            .inner
            .runs
            .lock()
            .values()
            .map(|entry| entry.run.clone())
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        runs
    }

    /// Id of the Scheduled or Running assay, if any.
    pub fn active(&self) -> Option<AssayId> {
        self.inner
            .runs
            .lock()
            .values()
            .find(|entry| entry.run.status.is_active())
            .map(|entry| entry.run.id.clone())
    }

    /// Drop a finished run from memory and return its final snapshot.
    pub fn discard(&self, id: &AssayId) -> Result<AssayRun> {
        let mut runs = self.inner.runs.lock();
        let entry = runs
            .get(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        if entry.run.status.is_active() {
            return Err(GatewayError::conflict(format!(
                "assay {id} is still {}; cancel it first",
                entry.run.status
            )));
        }
        let entry = runs
            .remove(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        debug!("Assay {} discarded", id);
        Ok(entry.run)
    }

    /// Cancel every active run and wait for all run tasks to finish.
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut runs = self.inner.runs.lock();
            runs.values_mut()
                .filter_map(|entry| {
                    if entry.run.status.is_active() {
                        entry.cancel.cancel();
                        if !entry.tick_in_flight {
                            entry.run.finish(AssayStatus::Cancelled, None);
                        }
                    }
                    entry.task.take()
                })
                .collect()
        };

        for task in tasks {
            if let Err(e) = task.await {
                warn!("Assay task ended abnormally: {}", e);
            }
        }
    }
}

impl Inner {
    /// Mark a tick as reading. Fails if the run ended in the meantime.
    fn begin_tick(&self, id: &AssayId) -> bool {
        let mut runs = self.runs.lock();
        match runs.get_mut(id) {
            Some(entry) if entry.run.status.is_active() && !entry.cancel.is_cancelled() => {
                entry.tick_in_flight = true;
                true
            }
            _ => false,
        }
    }

    /// Append a completed tick.
    fn end_tick(
        &self,
        id: &AssayId,
        started_at: chrono::DateTime<Utc>,
        measurements: Vec<WavelengthRead>,
    ) -> Option<u32> {
        let mut runs = self.runs.lock();
        let entry = runs.get_mut(id)?;
        entry.tick_in_flight = false;
        let read_index = entry.run.next_read_index();
        entry.run.reads.push(AssayRead {
            read_index,
            started_at,
            completed_at: Utc::now(),
            measurements,
        });
        Some(read_index)
    }

    fn finish(&self, id: &AssayId, status: AssayStatus, failure: Option<String>) {
        let mut runs = self.runs.lock();
        if let Some(entry) = runs.get_mut(id) {
            entry.tick_in_flight = false;
            if entry.run.finish(status, failure) {
                info!(
                    "Assay {} {} after {} reads",
                    id,
                    status,
                    entry.run.reads.len()
                );
            }
        }
    }
}

/// Body of one assay run.
async fn drive(
    inner: Arc<Inner>,
    id: AssayId,
    definition: AssayDefinition,
    cancel: CancellationToken,
) {
    let wells = inner.instrument.plate_format().all_wells();

    for tick in 0..definition.num_reads() {
        if tick > 0 {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(definition.interval()) => {}
            }
        }

        let guard = match inner
            .instrument
            .state()
            .begin_when_ready("assay_read", &cancel)
            .await
        {
            Ok(Some(guard)) => guard,
            Ok(None) => break,
            Err(state) => {
                inner.finish(
                    &id,
                    AssayStatus::Failed,
                    Some(format!("device is {state}")),
                );
                return;
            }
        };
        if !inner.begin_tick(&id) {
            break;
        }

        let started_at = Utc::now();
        let (measurements, fatal) = read_tick(&inner, &id, tick, &definition, &wells).await;
        drop(guard);

        if let Some(read_index) = inner.end_tick(&id, started_at, measurements) {
            debug!("Assay {} recorded read {}", id, read_index);
        }
        if let Some(error) = fatal {
            inner.finish(&id, AssayStatus::Failed, Some(error.to_string()));
            return;
        }
    }

    let status = if cancel.is_cancelled() {
        AssayStatus::Cancelled
    } else {
        AssayStatus::Completed
    };
    inner.finish(&id, status, None);
}

/// Read every wavelength of one tick, in order.
///
/// An empty plate slot fails each wavelength of the tick without measuring.
/// Reading stops at the first fatal failure, which is returned alongside.
async fn read_tick(
    inner: &Inner,
    id: &AssayId,
    tick: u32,
    definition: &AssayDefinition,
    wells: &[WellId],
) -> (Vec<WavelengthRead>, Option<DeviceError>) {
    let wavelengths = definition.wavelengths();
    let mut measurements = Vec::with_capacity(wavelengths.len());

    match inner.instrument.plate_present().await {
        Ok(true) => {}
        Ok(false) => {
            warn!("Assay {} tick {}: {}", id, tick, NO_PLATE_MESSAGE);
            let error = DeviceError::invalid_input(NO_PLATE_MESSAGE);
            measurements.extend(
                wavelengths
                    .iter()
                    .map(|&nm| WavelengthRead::failed(nm, &error)),
            );
            return (measurements, None);
        }
        Err(error) => {
            warn!("Assay {} tick {} plate check failed: {}", id, tick, error);
            measurements.extend(
                wavelengths
                    .iter()
                    .map(|&nm| WavelengthRead::failed(nm, &error)),
            );
            return (measurements, error.is_fatal().then_some(error));
        }
    }

    for &nm in wavelengths {
        match inner.instrument.read_wells(nm, wells).await {
            Ok(result) => measurements.push(WavelengthRead::measured(&result)),
            Err(error) => {
                warn!("Assay {} tick {} at {} nm failed: {}", id, tick, nm, error);
                measurements.push(WavelengthRead::failed(nm, &error));
                if error.is_fatal() {
                    return (measurements, Some(error));
                }
            }
        }
    }
    (measurements, None)
}
