//! Drive a round by hand: no camera, no reader thread, just ticks.

use aicam_core::{
    RoundEvent, RoundPlan, RoundStatus, Sequencer, SignalMap, SmoothingCfg, StateOp, StepSpec,
};
use std::time::Duration;

fn main() -> eyre::Result<()> {
    let mut sequencer = Sequencer::builder()
        .with_signal_map(SignalMap::two_flags())
        .with_smoothing(SmoothingCfg {
            sample_period_ms: 10,
            window_samples: 5,
            ..SmoothingCfg::default()
        })
        .with_observer(|event: RoundEvent| println!("event: {event:?}"))
        .build()?;

    // Rest briefly, then expect the camera to see pose 0 ("flag 0 raised").
    sequencer.start_round(RoundPlan::new(vec![
        StepSpec::rest(Duration::from_millis(50)),
        StepSpec::gated(StateOp::Insert(0), Duration::from_millis(500)),
    ]))?;

    loop {
        // Pretend the camera reports pose 0 every sampling period.
        match sequencer.tick(Some(0))? {
            RoundStatus::Running => std::thread::sleep(Duration::from_millis(10)),
            status => {
                println!("round finished: {status:?}");
                println!("outcomes: {:?}", sequencer.outcomes());
                return Ok(());
            }
        }
    }
}
