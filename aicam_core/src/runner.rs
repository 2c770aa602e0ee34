//! Blocking round orchestration: reader drain + sequencer ticks.

use crate::error::{CamError, Result as CoreResult};
use crate::reader::{LinkStatus, Reader};
use crate::{RoundPlan, RoundStatus, Sequencer, SignalId};
use std::time::Duration;

/// Terminal result of one round.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub status: RoundStatus,
    pub outcomes: Vec<Option<bool>>,
}

impl RoundReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| **o == Some(true)).count()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, RoundStatus::Complete)
    }
}

#[inline]
fn link_error(status: LinkStatus) -> CamError {
    match status {
        LinkStatus::Lost => CamError::DeviceLost,
        _ => CamError::Channel("byte channel closed".into()),
    }
}

/// Run one round to its terminal state.
///
/// Drains the reader once per sampling period, tracks the latest signal
/// (the sentinel clears it), and ticks the sequencer. A link fault cancels
/// the in-flight round and surfaces as a typed error; a failed round is a
/// normal return, not an error. `stop` is polled each iteration so an
/// external shutdown (ctrl-c, unmount) can cancel cleanly.
pub fn run_round(
    reader: &Reader,
    sequencer: &mut Sequencer,
    plan: RoundPlan,
    stop: Option<&dyn Fn() -> bool>,
) -> CoreResult<RoundReport> {
    let period = Duration::from_millis(sequencer.smoothing_cfg().sample_period_ms);
    sequencer.start_round(plan)?;
    tracing::info!("round start");

    let mut latest: Option<SignalId> = None;
    loop {
        if let Some(stop) = stop
            && stop()
        {
            sequencer.cancel_round();
            tracing::info!("round cancelled by caller");
            return Err(crate::error::Report::new(CamError::State(
                "round cancelled".into(),
            )));
        }

        let status = reader.status();
        if status.is_down() {
            sequencer.cancel_round();
            let err = link_error(status);
            tracing::error!(error = %err, "link down, round cancelled");
            return Err(crate::error::Report::new(err));
        }

        if let Some(sample) = reader.latest() {
            // Some(id): new candidate; None: the no-detection sentinel.
            latest = sample;
        }

        match sequencer.tick(latest)? {
            RoundStatus::Running => std::thread::sleep(period),
            status => {
                return Ok(RoundReport {
                    status,
                    outcomes: sequencer.outcomes().to_vec(),
                });
            }
        }
    }
}
