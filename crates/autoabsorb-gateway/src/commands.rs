//! Wire commands and response envelopes.
//!
//! Commands arrive as JSON objects tagged by `command`:
//!
//! ```json
//! {"command": "ReadPlate", "wavelength_nm": 450, "wells": "A1,A2"}
//! ```
//!
//! Every command produces exactly one envelope. Success carries the reply
//! fields next to `success`:
//!
//! ```json
//! {"success": true, "data": {"A1": 0.231, "A2": 0.198}, "wavelength": 450, "timestamp": "..."}
//! ```
//!
//! Failure carries the error category and a human readable message:
//!
//! ```json
//! {"success": false, "error": {"kind": "ValidationError", "message": "..."}}
//! ```

use autoabsorb_core::DeviceState;
use autoabsorb_core::constants::{ALL_WELLS_SENTINEL, DEFAULT_WAVELENGTH_NM};
use autoabsorb_hardware::DeviceInfo;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::assay::AssayRun;
use crate::error::{ErrorKind, GatewayError, Result};
use crate::gateway::Gateway;
use crate::state_machine::StateTransition;

/// Default number of transitions returned by `History`.
const DEFAULT_HISTORY_COUNT: usize = 20;

/// Readable (and sometimes writable) reader properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Property {
    DeviceStatus,
    CurrentTemperature,
    AvailableWavelengths,
    TemperatureControl,
    DeviceInfo,
}

/// Well argument: a separated list, a JSON array of labels, or `AllWells`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WellsArg {
    Text(String),
    List(Vec<String>),
}

impl Default for WellsArg {
    fn default() -> Self {
        WellsArg::Text(ALL_WELLS_SENTINEL.to_string())
    }
}

impl WellsArg {
    fn to_selection_string(&self) -> String {
        match self {
            WellsArg::Text(text) => text.clone(),
            WellsArg::List(labels) => labels.join(","),
        }
    }
}

fn default_wavelength() -> i64 {
    i64::from(DEFAULT_WAVELENGTH_NM)
}

fn default_history_count() -> usize {
    DEFAULT_HISTORY_COUNT
}

/// A gateway command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    Connect,
    Disconnect,
    Reset,
    ReadPlate {
        #[serde(default = "default_wavelength")]
        wavelength_nm: i64,
        #[serde(default)]
        wells: WellsArg,
    },
    RunAssay {
        plate_id: String,
        wavelengths: Vec<i64>,
        num_reads: i64,
        interval_seconds: i64,
    },
    GetAssayResult {
        assay_id: String,
    },
    CancelAssay {
        assay_id: String,
    },
    DiscardAssay {
        assay_id: String,
    },
    ListAssays,
    ValidatePlate,
    BeginCalibration,
    FinishCalibration,
    GetProperty {
        property: Property,
    },
    SetProperty {
        property: Property,
        value: Value,
    },
    History {
        #[serde(default = "default_history_count")]
        count: usize,
    },
}

impl Command {
    /// Parse one JSON command.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| GatewayError::validation(format!("invalid command: {e}")))
    }
}

#[derive(Serialize)]
struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
struct Connection {
    device_status: DeviceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_info: Option<DeviceInfo>,
}

#[derive(Serialize)]
struct PropertyValue {
    property: Property,
    value: Value,
}

#[derive(Serialize)]
struct AssayList {
    assays: Vec<AssayRun>,
}

#[derive(Serialize)]
struct History {
    transitions: Vec<StateTransition>,
}

fn success<T: Serialize>(body: T) -> Value {
    match serde_json::to_value(Success {
        success: true,
        body,
    }) {
        Ok(value) => value,
        Err(e) => {
            error!("Failed to encode response: {}", e);
            failure_envelope(
                ErrorKind::FatalDevice,
                &format!("response encoding failed: {e}"),
            )
        }
    }
}

fn failure_envelope(kind: ErrorKind, message: &str) -> Value {
    json!({
        "success": false,
        "error": {
            "kind": kind.as_str(),
            "message": message,
        }
    })
}

/// Envelope for a failed command.
pub fn failure(error: &GatewayError) -> Value {
    failure_envelope(error.kind(), &error.to_string())
}

fn respond<T: Serialize>(result: Result<T>) -> Value {
    match result {
        Ok(body) => success(body),
        Err(e) => {
            debug!("Command failed: {}", e);
            failure(&e)
        }
    }
}

impl Gateway {
    /// Execute a command and wrap the outcome in an envelope.
    pub async fn execute(&self, command: Command) -> Value {
        match command {
            Command::Connect => {
                let result = self.connect().await;
                respond(result.map(|info| self.connection(Some(info))))
            }
            Command::Disconnect => {
                let result = self.disconnect().await;
                respond(result.map(|()| self.connection(None)))
            }
            Command::Reset => {
                let result = self.reset().await;
                respond(result.map(|info| self.connection(Some(info))))
            }
            Command::ReadPlate {
                wavelength_nm,
                wells,
            } => respond(
                self.read_plate(wavelength_nm, &wells.to_selection_string())
                    .await,
            ),
            Command::RunAssay {
                plate_id,
                wavelengths,
                num_reads,
                interval_seconds,
            } => respond(
                self.run_assay(&plate_id, &wavelengths, num_reads, interval_seconds)
                    .await,
            ),
            Command::GetAssayResult { assay_id } => respond(self.get_assay_result(&assay_id)),
            Command::CancelAssay { assay_id } => respond(self.cancel_assay(&assay_id)),
            Command::DiscardAssay { assay_id } => respond(self.discard_assay(&assay_id)),
            Command::ListAssays => respond(Ok(AssayList {
                assays: self.list_assays(),
            })),
            Command::ValidatePlate => respond(self.validate_plate().await),
            Command::BeginCalibration => {
                respond(self.begin_calibration().map(|()| self.connection(None)))
            }
            Command::FinishCalibration => {
                respond(self.finish_calibration().map(|()| self.connection(None)))
            }
            Command::GetProperty { property } => respond(self.get_property(property).await),
            Command::SetProperty { property, value } => {
                respond(self.set_property(property, value).await)
            }
            Command::History { count } => respond(Ok(History {
                transitions: self.state_history(count),
            })),
        }
    }

    /// Parse and execute one JSON command.
    pub async fn execute_json(&self, json: &str) -> Value {
        match Command::from_json(json) {
            Ok(command) => self.execute(command).await,
            Err(e) => failure(&e),
        }
    }

    fn connection(&self, device_info: Option<DeviceInfo>) -> Connection {
        Connection {
            device_status: self.device_status(),
            device_info,
        }
    }

    async fn get_property(&self, property: Property) -> Result<PropertyValue> {
        let value = match property {
            Property::DeviceStatus => Value::from(self.device_status().as_str()),
            Property::CurrentTemperature => Value::from(self.current_temperature().await?),
            Property::AvailableWavelengths => Value::from(self.available_wavelengths().await?),
            Property::TemperatureControl => Value::from(self.temperature_control().await?),
            Property::DeviceInfo => match self.device_info() {
                Some(info) => serde_json::to_value(info)
                    .map_err(|e| GatewayError::validation(e.to_string()))?,
                None => Value::Null,
            },
        };
        Ok(PropertyValue { property, value })
    }

    async fn set_property(&self, property: Property, value: Value) -> Result<PropertyValue> {
        match property {
            Property::TemperatureControl => {
                let enabled = value.as_bool().ok_or_else(|| {
                    GatewayError::validation(format!(
                        "TemperatureControl takes a boolean, got {value}"
                    ))
                })?;
                self.set_temperature_control(enabled).await?;
                Ok(PropertyValue {
                    property,
                    value: Value::Bool(enabled),
                })
            }
            other => Err(GatewayError::validation(format!(
                "property {other:?} is read-only"
            ))),
        }
    }
}
