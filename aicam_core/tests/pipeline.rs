//! End-to-end: simulated camera -> reader -> sequencer -> round report.

use aicam_core::error::CamError;
use aicam_core::reader::Reader;
use aicam_core::runner::run_round;
use aicam_core::{
    RoundPlan, RoundStatus, Sequencer, SignalMap, SmoothingCfg, StateOp, StepSpec,
};
use aicam_hardware::SimulatedCamera;
use aicam_traits::clock::MonotonicClock;
use std::time::Duration;

fn fast_smoothing() -> SmoothingCfg {
    SmoothingCfg {
        sample_period_ms: 20,
        window_samples: 5,
        debounce_timeout_ms: 200,
        max_id: 3,
    }
}

fn fast_sequencer() -> Sequencer {
    Sequencer::builder()
        .with_signal_map(SignalMap::two_flags())
        .with_smoothing(fast_smoothing())
        .build()
        .expect("build sequencer")
}

fn spawn_sim(ids: impl Into<Vec<u8>>) -> Reader {
    let cam = SimulatedCamera::new(ids).with_frame_gap(Duration::from_millis(5));
    Reader::spawn(cam, Duration::from_millis(10), MonotonicClock::new())
}

/// Rest then a gated step whose op empties the state, i.e. expecting id 2.
fn short_plan() -> RoundPlan {
    RoundPlan::new(vec![
        StepSpec::rest(Duration::from_millis(100)),
        StepSpec::gated(StateOp::Remove(0), Duration::from_millis(800)),
    ])
}

#[test]
fn matching_camera_completes_round() {
    let reader = spawn_sim([2]);
    let mut seq = fast_sequencer();
    let report = run_round(&reader, &mut seq, short_plan(), None).expect("round runs");
    assert!(report.is_complete(), "status: {:?}", report.status);
    assert_eq!(report.passed(), 2);
}

#[test]
fn mismatching_camera_fails_round_without_error() {
    let reader = spawn_sim([1]);
    let mut seq = fast_sequencer();
    let report = run_round(&reader, &mut seq, short_plan(), None).expect("failure is an outcome");
    match report.status {
        RoundStatus::Failed(f) => {
            assert_eq!(f.step, 1);
            assert_eq!(f.resolved, Some(1));
            assert_eq!(f.expected, Some(2));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
fn device_loss_cancels_round_and_surfaces_typed_error() {
    // One frame, then the device goes away mid-round.
    let cam = SimulatedCamera::once([2]).with_frame_gap(Duration::from_millis(1));
    let reader = Reader::spawn(cam, Duration::from_millis(10), MonotonicClock::new());
    let mut seq = fast_sequencer();

    let err = run_round(&reader, &mut seq, short_plan(), None).expect_err("link dies");
    assert!(matches!(
        err.downcast_ref::<CamError>(),
        Some(CamError::DeviceLost)
    ));
    assert!(!seq.round_active(), "round must be cancelled");
    // A new round can start once a new link is up.
    let reader = spawn_sim([2]);
    let report = run_round(&reader, &mut seq, short_plan(), None).expect("fresh round");
    assert!(report.is_complete());
}

#[test]
fn external_stop_cancels_cleanly() {
    let reader = spawn_sim([2]);
    let mut seq = fast_sequencer();
    let stop = || true;
    let err = run_round(&reader, &mut seq, short_plan(), Some(&stop)).expect_err("stopped");
    assert!(matches!(
        err.downcast_ref::<CamError>(),
        Some(CamError::State(_))
    ));
    assert!(!seq.round_active());
}

#[test]
fn sentinel_frames_clear_the_tracked_signal() {
    // The camera alternates a valid pose with the no-detection sentinel;
    // with a majority of valid samples the round still completes.
    let reader = spawn_sim([2, 2, 2, 255]);
    let mut seq = fast_sequencer();
    let report = run_round(&reader, &mut seq, short_plan(), None).expect("round runs");
    assert!(report.is_complete(), "status: {:?}", report.status);
}
