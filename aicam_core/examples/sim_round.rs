//! Full pipeline against the simulated camera: bytes -> frames -> signal
//! -> sequenced round.

use aicam_core::reader::Reader;
use aicam_core::runner::run_round;
use aicam_core::{RoundPlan, Sequencer, SignalMap, SmoothingCfg, StateOp, StepSpec};
use aicam_hardware::SimulatedCamera;
use aicam_traits::clock::MonotonicClock;
use std::time::Duration;

fn main() -> eyre::Result<()> {
    let camera = SimulatedCamera::new([2]).with_frame_gap(Duration::from_millis(10));
    let reader = Reader::spawn(camera, Duration::from_millis(20), MonotonicClock::new());

    let mut sequencer = Sequencer::builder()
        .with_signal_map(SignalMap::two_flags())
        .with_smoothing(SmoothingCfg {
            sample_period_ms: 20,
            window_samples: 5,
            ..SmoothingCfg::default()
        })
        .build()?;

    // An empty flag set maps to pose 2, which is what the camera reports.
    let plan = RoundPlan::new(vec![
        StepSpec::rest(Duration::from_millis(200)),
        StepSpec::gated(StateOp::Remove(0), Duration::from_millis(1000)),
    ]);

    let report = run_round(&reader, &mut sequencer, plan, None)?;
    println!("status: {:?}", report.status);
    println!("passed {} of {} steps", report.passed(), report.outcomes.len());
    Ok(())
}
