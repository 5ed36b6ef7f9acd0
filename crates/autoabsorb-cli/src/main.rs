//! # autoabsorb
//!
//! Command-line front end for the absorbance reader gateway.
//!
//! ## Serve mode (default)
//!
//! ```bash
//! $ autoabsorb --plate-format 96
//! {"command":"ReadPlate","wavelength_nm":450,"wells":"A1,A2"}
//! {"success":true,"data":{"A1":0.045,"A2":0.055},"wavelength":450,"timestamp":"..."}
//! ```
//!
//! ## One-shot mode
//!
//! ```bash
//! autoabsorb exec '{"command":"GetProperty","property":"AvailableWavelengths"}'
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use anyhow::Result;
use autoabsorb_gateway::Gateway;
use autoabsorb_hardware::mock::MockReader;
use clap::Parser;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod args;
mod session;

use args::{Cli, Mode};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.gateway_config()?;

    // Only the simulated reader ships; vendor drivers plug in here.
    let (reader, _handle) = MockReader::with_format(
        "Mock Absorbance Reader".to_string(),
        config.plate_format,
    );
    let gateway = Gateway::start(reader, config).await?;
    info!(
        "autoabsorb {} ready ({} plates)",
        autoabsorb_core::VERSION,
        gateway.plate_format()
    );

    match cli.mode() {
        Mode::Exec { command } => {
            let reply = gateway.execute_json(&command).await;
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(format!("{}\n", serde_json::to_string(&reply)?).as_bytes())
                .await?;
            stdout.flush().await?;
        }
        Mode::Serve => {
            let input = BufReader::new(tokio::io::stdin());
            tokio::select! {
                served = session::serve(&gateway, input, tokio::io::stdout()) => {
                    let executed = served?;
                    info!("Input closed after {} commands", executed);
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!("Failed to listen for ctrl-c: {}", e);
                    }
                    info!("Interrupted");
                }
            }
        }
    }

    gateway.shutdown().await;
    Ok(())
}
