//! Common test utilities for gateway integration tests.
//!
//! Every helper builds a [`Gateway`] over a [`MockReader`] and hands back the
//! mock's control handle, so tests can script instrument behaviour and
//! inspect what reached the driver.

#![allow(dead_code)]

use std::time::Duration;

use autoabsorb_gateway::{AssayRun, Gateway, GatewayConfig};
use autoabsorb_hardware::mock::{MockReader, MockReaderHandle};

/// Gateway with default configuration, not yet connected.
pub fn gateway() -> (Gateway, MockReaderHandle) {
    let (reader, handle) = MockReader::new();
    (Gateway::new(reader, GatewayConfig::default()), handle)
}

/// Gateway with default configuration, connected and Ready.
pub async fn connected_gateway() -> (Gateway, MockReaderHandle) {
    let (gateway, handle) = gateway();
    gateway.connect().await.expect("mock reader connects");
    (gateway, handle)
}

/// Poll an assay snapshot until `done` holds.
///
/// Uses tokio's clock, so under a paused runtime the wait costs no real
/// time.
pub async fn wait_for_assay(
    gateway: &Gateway,
    assay_id: &str,
    done: impl Fn(&AssayRun) -> bool,
) -> AssayRun {
    loop {
        let run = gateway
            .get_assay_result(assay_id)
            .expect("assay is retained");
        if done(&run) {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the assay reaches a terminal status.
pub async fn wait_for_terminal(gateway: &Gateway, assay_id: &str) -> AssayRun {
    wait_for_assay(gateway, assay_id, |run| run.status.is_terminal()).await
}
