//! Command-line arguments and their merge into [`GatewayConfig`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use autoabsorb_core::PlateFormat;
use autoabsorb_gateway::GatewayConfig;
use clap::{Parser, Subcommand};

/// Absorbance reader gateway
#[derive(Parser, Debug)]
#[command(name = "autoabsorb")]
#[command(about = "Drive a microplate absorbance reader with JSON commands", long_about = None)]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Plate format in wells (6, 12, 24, 48, 96 or 384)
    #[arg(long, global = true)]
    pub plate_format: Option<u16>,

    /// Attempts per instrument call, including the first
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Bound on one instrument call, queueing included
    #[arg(long, global = true)]
    pub call_timeout_ms: Option<u64>,

    /// Start Disconnected; wait for a Connect command
    #[arg(long, global = true)]
    pub no_connect: bool,

    #[command(subcommand)]
    pub command: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Read one JSON command per line from stdin, answer on stdout (default)
    Serve,

    /// Execute a single JSON command and exit
    Exec {
        /// The command, e.g. '{"command":"ReadPlate","wells":"A1"}'
        command: String,
    },
}

impl Cli {
    /// Configuration file (or defaults) with command-line overrides applied.
    pub fn gateway_config(&self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => GatewayConfig::default(),
        };

        if let Some(wells) = self.plate_format {
            config = config.plate_format(PlateFormat::try_from(wells)?);
        }
        if let Some(attempts) = self.max_attempts {
            config = config.max_attempts(attempts);
        }
        if let Some(ms) = self.call_timeout_ms {
            config = config.call_timeout(Duration::from_millis(ms));
        }
        if self.no_connect {
            config = config.auto_connect(false);
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    pub fn mode(&self) -> Mode {
        self.command.clone().unwrap_or(Mode::Serve)
    }
}
