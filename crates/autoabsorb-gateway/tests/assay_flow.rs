//! Integration tests for kinetic assays.
//!
//! All tests run on tokio's paused clock: intervals of seconds elapse
//! instantly, and the mock reader timestamps every measurement with the
//! same virtual clock.

mod common;

use std::time::Duration;

use autoabsorb_core::DeviceState;
use autoabsorb_gateway::{AssayStatus, ErrorKind, ReadOutcome};
use autoabsorb_hardware::DeviceError;
use autoabsorb_hardware::mock::DriverOp;
use rstest::rstest;

#[tokio::test(start_paused = true)]
async fn test_three_reads_contiguous_indices() {
    let (gateway, handle) = common::connected_gateway().await;

    let accepted = gateway
        .run_assay("plate-1", &[450], 3, 5)
        .await
        .unwrap();
    assert_eq!(accepted.expected_duration_seconds, 10);

    let run = common::wait_for_terminal(&gateway, accepted.assay_id.as_str()).await;
    assert_eq!(run.status, AssayStatus::Completed);

    let indices: Vec<u32> = run.reads.iter().map(|r| r.read_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let measurements = handle.measurements();
    assert_eq!(measurements.len(), 3);
    for pair in measurements.windows(2) {
        assert!(pair[1].at.duration_since(pair[0].at) >= Duration::from_secs(5));
    }
}

#[tokio::test(start_paused = true)]
async fn test_interval_counts_from_tick_completion() {
    let (gateway, handle) = common::connected_gateway().await;
    // Two retries on the second wavelength stretch tick 0 by the backoff
    // (100 ms + 200 ms) after its first measurement.
    handle.fail_wavelength(620, 2, DeviceError::busy("filter wheel"));

    let accepted = gateway
        .run_assay("plate-1", &[450, 620], 2, 5)
        .await
        .unwrap();
    let run = common::wait_for_terminal(&gateway, accepted.assay_id.as_str()).await;
    assert_eq!(run.status, AssayStatus::Completed);

    let measurements = handle.measurements();
    let order: Vec<u16> = measurements.iter().map(|m| m.wavelength_nm).collect();
    assert_eq!(order, vec![450, 620, 450, 620]);

    let tick0_start = measurements[0].at;
    let tick0_end = measurements[1].at;
    let tick1_start = measurements[2].at;
    assert!(tick0_end.duration_since(tick0_start) >= Duration::from_millis(300));
    assert!(tick1_start.duration_since(tick0_end) >= Duration::from_secs(5));
    assert!(tick1_start.duration_since(tick0_start) > Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_fires_immediately() {
    let (gateway, handle) = common::connected_gateway().await;
    let start = tokio::time::Instant::now();

    let accepted = gateway
        .run_assay("plate-1", &[450], 2, 60)
        .await
        .unwrap();
    common::wait_for_assay(&gateway, accepted.assay_id.as_str(), |run| {
        run.reads.len() == 1
    })
    .await;

    let first = handle.measurements()[0].at;
    assert!(first.duration_since(start) < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_wavelengths_read_in_given_order() {
    let (gateway, handle) = common::connected_gateway().await;

    let accepted = gateway
        .run_assay("plate-1", &[620, 405, 560], 1, 5)
        .await
        .unwrap();
    let run = common::wait_for_terminal(&gateway, accepted.assay_id.as_str()).await;

    let order: Vec<u16> = handle.measurements().iter().map(|m| m.wavelength_nm).collect();
    assert_eq!(order, vec![620, 405, 560]);
    assert_eq!(run.reads[0].measurements.len(), 3);
    match &run.reads[0].measurements[0].outcome {
        ReadOutcome::Measured { data, .. } => assert_eq!(data.len(), 96),
        other => panic!("expected a measurement, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_conflict_until_first_run_terminates() {
    let (gateway, _handle) = common::connected_gateway().await;

    let first = gateway
        .run_assay("plate-1", &[450], 2, 5)
        .await
        .unwrap();
    let err = gateway
        .run_assay("plate-2", &[450], 2, 5)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    common::wait_for_terminal(&gateway, first.assay_id.as_str()).await;
    let second = gateway
        .run_assay("plate-2", &[450], 2, 5)
        .await
        .unwrap();
    assert_ne!(first.assay_id, second.assay_id);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_first_read() {
    let (gateway, handle) = common::connected_gateway().await;

    let accepted = gateway
        .run_assay("plate-1", &[450], 3, 5)
        .await
        .unwrap();
    let id = accepted.assay_id.as_str();
    common::wait_for_assay(&gateway, id, |run| run.reads.len() == 1).await;

    let snapshot = gateway.cancel_assay(id).unwrap();
    assert_eq!(snapshot.status, AssayStatus::Cancelled);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let run = gateway.get_assay_result(id).unwrap();
    assert_eq!(run.status, AssayStatus::Cancelled);
    assert_eq!(run.reads.len(), 1);
    assert_eq!(handle.calls(DriverOp::Measure), 1);

    let err = gateway.cancel_assay(id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);
}

#[rstest]
#[case(&[900], 3, 5)]
#[case(&[349], 3, 5)]
#[case(&[450], 0, 5)]
#[case(&[450], 101, 5)]
#[case(&[450], 3, 4)]
#[case(&[450], 3, 3601)]
#[case(&[], 3, 5)]
#[case(&[405, 450, 560, 620, 405, 450, 560, 620, 405], 3, 5)]
#[tokio::test]
async fn test_invalid_assay_never_reaches_device(
    #[case] wavelengths: &[i64],
    #[case] num_reads: i64,
    #[case] interval_seconds: i64,
) {
    let (gateway, handle) = common::connected_gateway().await;
    let calls_before = handle.total_calls();

    let err = gateway
        .run_assay("plate-1", wavelengths, num_reads, interval_seconds)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(handle.total_calls(), calls_before);
    assert!(gateway.list_assays().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_read_failure_recovered_inside_assay() {
    let (gateway, handle) = common::connected_gateway().await;
    handle.fail_times(DriverOp::Measure, 2, DeviceError::busy("lamp settling"));

    let accepted = gateway
        .run_assay("plate-1", &[450], 2, 5)
        .await
        .unwrap();
    let run = common::wait_for_terminal(&gateway, accepted.assay_id.as_str()).await;

    assert_eq!(run.status, AssayStatus::Completed);
    assert!(
        run.reads
            .iter()
            .all(|read| read.measurements.iter().all(|m| m.is_measured()))
    );
    assert_eq!(gateway.device_status(), DeviceState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_fails_run_not_gateway() {
    let (gateway, handle) = common::connected_gateway().await;

    let accepted = gateway
        .run_assay("plate-1", &[450], 3, 5)
        .await
        .unwrap();
    let id = accepted.assay_id.as_str();
    common::wait_for_assay(&gateway, id, |run| run.reads.len() == 1).await;

    handle.fail_next(DriverOp::Measure, DeviceError::hardware_fault("lamp failure"));
    let run = common::wait_for_terminal(&gateway, id).await;

    assert_eq!(run.status, AssayStatus::Failed);
    assert_eq!(run.reads.len(), 2);
    match &run.reads[1].measurements[0].outcome {
        ReadOutcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::FatalDevice),
        other => panic!("expected a failed read, got {other:?}"),
    }
    assert_eq!(gateway.device_status(), DeviceState::Error);

    // The gateway itself keeps serving and recovers through reset.
    gateway.reset().await.unwrap();
    assert!(gateway.read_plate(450, "A1").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_tick_waits_out_calibration() {
    let (gateway, handle) = common::connected_gateway().await;

    let accepted = gateway
        .run_assay("plate-1", &[450], 2, 5)
        .await
        .unwrap();
    let id = accepted.assay_id.as_str();
    common::wait_for_assay(&gateway, id, |run| run.reads.len() == 1).await;

    gateway.begin_calibration().unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(handle.calls(DriverOp::Measure), 1);

    gateway.finish_calibration().unwrap();
    let run = common::wait_for_terminal(&gateway, id).await;
    assert_eq!(run.status, AssayStatus::Completed);
    assert_eq!(run.reads.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_read_plate_interleaves_with_assay() {
    let (gateway, _handle) = common::connected_gateway().await;

    let accepted = gateway
        .run_assay("plate-1", &[450], 3, 60)
        .await
        .unwrap();
    let id = accepted.assay_id.as_str();
    common::wait_for_assay(&gateway, id, |run| run.reads.len() == 1).await;

    let reading = gateway.read_plate(560, "B3").await.unwrap();
    assert_eq!(reading.wavelength, 560);

    let run = common::wait_for_terminal(&gateway, id).await;
    assert_eq!(run.status, AssayStatus::Completed);
    assert_eq!(run.reads.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_discard_and_shutdown() {
    let (gateway, _handle) = common::connected_gateway().await;

    let done = gateway
        .run_assay("plate-1", &[450], 1, 5)
        .await
        .unwrap();
    common::wait_for_terminal(&gateway, done.assay_id.as_str()).await;
    gateway.discard_assay(done.assay_id.as_str()).unwrap();
    assert_eq!(
        gateway.get_assay_result(done.assay_id.as_str()).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let running = gateway
        .run_assay("plate-2", &[450], 10, 600)
        .await
        .unwrap();
    gateway.shutdown().await;

    let run = gateway
        .get_assay_result(running.assay_id.as_str())
        .unwrap();
    assert_eq!(run.status, AssayStatus::Cancelled);
    assert_eq!(gateway.device_status(), DeviceState::Disconnected);
}
