//! Gateway configuration.

use std::path::Path;
use std::time::Duration;

use autoabsorb_core::{Error, PlateFormat, Result};
use autoabsorb_hardware::{ChannelConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Retry budget as it appears in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries per device call, including the first.
    pub max_attempts: u32,

    /// Backoff before the first retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Backoff ceiling, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        RetryPolicy::new(config.max_attempts)
            .with_base_delay(Duration::from_millis(config.base_delay_ms))
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
    }
}

/// Configuration for one gateway instance.
///
/// # Examples
///
/// ```
/// use autoabsorb_core::PlateFormat;
/// use autoabsorb_gateway::GatewayConfig;
///
/// let config = GatewayConfig::default()
///     .plate_format(PlateFormat::Wells384)
///     .max_attempts(5);
///
/// assert_eq!(config.plate_format, PlateFormat::Wells384);
/// assert_eq!(config.retry.max_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Plate layout the reader is fitted for
    pub plate_format: PlateFormat,

    /// Retry policy for device calls
    pub retry: RetryConfig,

    /// Bound on queue time plus execution of one device call
    pub call_timeout_ms: u64,

    /// Connect to the instrument when the gateway starts
    pub auto_connect: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            plate_format: PlateFormat::default(),
            retry: RetryConfig::default(),
            call_timeout_ms: 30_000,
            auto_connect: true,
        }
    }
}

impl GatewayConfig {
    /// Parse a JSON configuration document. Missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Check values that deserialize fine but make no sense.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(Error::Config("call_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Set the plate format
    pub fn plate_format(mut self, format: PlateFormat) -> Self {
        self.plate_format = format;
        self
    }

    /// Set the retry attempt budget
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// Set the backoff bounds
    pub fn retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry.base_delay_ms = duration_ms(base);
        self.retry.max_delay_ms = duration_ms(max);
        self
    }

    /// Set the per-call deadline
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set whether to connect on startup
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            plate_format: self.plate_format,
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
