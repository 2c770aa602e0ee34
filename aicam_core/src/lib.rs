#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core pipeline for camera-driven game rounds (hardware-agnostic).
//!
//! Raw bytes from an `aicam_traits::ByteSource` are reassembled into frames,
//! frames yield (id, confidence) candidates, candidates are smoothed into a
//! stable signal, and the signal gates a timed sequence of game steps.
//!
//! ## Architecture
//!
//! - **Protocol**: frame decoder + candidate extractor (`protocol` module)
//! - **Smoothing**: majority vote and debounce (`smoothing` module)
//! - **Reader**: background byte pump over a bounded channel (`reader`)
//! - **Sequencer**: the timed round state machine (this module)
//! - **Runner**: blocking round loop tying it together (`runner`)
//!
//! All timing goes through `aicam_traits::Clock`, so rounds are fully
//! deterministic under a test clock.

// Module declarations
pub mod error;
pub mod mocks;
pub mod protocol;
pub mod reader;
pub mod runner;
pub mod smoothing;

use crate::error::{BuildError, CamError, Result};
use aicam_traits::clock::{Clock, MonotonicClock};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use protocol::{Candidate, CandidateKind, Command, Frame, FrameDecoder, SignalId};
pub use reader::{LinkStatus, Reader};
pub use smoothing::{Debouncer, SampleWindow, resolve_majority};

/// Smoothing cadence and id domain for sequenced rounds.
#[derive(Debug, Clone, Copy)]
pub struct SmoothingCfg {
    /// Sampling period for gated steps (ms).
    pub sample_period_ms: u64,
    /// Samples per evaluation window; a full window decides early.
    pub window_samples: usize,
    /// Debounce timeout for live consumers (ms).
    pub debounce_timeout_ms: u64,
    /// Largest valid id; everything above it is ignored at the window.
    pub max_id: SignalId,
}

impl Default for SmoothingCfg {
    fn default() -> Self {
        Self {
            sample_period_ms: 100,
            window_samples: 20,
            debounce_timeout_ms: 200,
            max_id: 3,
        }
    }
}

impl From<&aicam_config::SmoothingCfg> for SmoothingCfg {
    fn from(c: &aicam_config::SmoothingCfg) -> Self {
        Self {
            sample_period_ms: c.sample_period_ms,
            window_samples: c.window_samples,
            debounce_timeout_ms: c.debounce_timeout_ms,
            max_id: c.max_id,
        }
    }
}

/// Accumulated membership flags (bitmask over flag indices 0..8).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateSet(u8);

impl StateSet {
    pub const EMPTY: Self = Self(0);

    pub fn with(flags: &[u8]) -> Self {
        flags.iter().fold(Self::EMPTY, |s, &f| s.insert(f))
    }

    #[must_use]
    pub fn insert(self, flag: u8) -> Self {
        Self(self.0 | (1 << (flag & 7)))
    }

    #[must_use]
    pub fn remove(self, flag: u8) -> Self {
        Self(self.0 & !(1 << (flag & 7)))
    }

    pub fn contains(self, flag: u8) -> bool {
        self.0 & (1 << (flag & 7)) != 0
    }

    /// Apply a command's set operation.
    #[must_use]
    pub fn apply(self, op: StateOp) -> Self {
        match op {
            StateOp::Insert(flag) => self.insert(flag),
            StateOp::Remove(flag) => self.remove(flag),
        }
    }
}

/// Set operation a step command applies to the accumulated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOp {
    Insert(u8),
    Remove(u8),
}

impl From<&aicam_config::CommandCfg> for StateOp {
    fn from(c: &aicam_config::CommandCfg) -> Self {
        match c.op {
            aicam_config::OpKind::Insert => Self::Insert(c.flag),
            aicam_config::OpKind::Remove => Self::Remove(c.flag),
        }
    }
}

/// Data table mapping an accumulated flag set to the signal id the camera
/// is expected to report for it. A missing entry means "no requirement".
#[derive(Debug, Clone)]
pub struct SignalMap {
    entries: Vec<(StateSet, SignalId)>,
}

impl SignalMap {
    pub fn new(entries: Vec<(StateSet, SignalId)>) -> Self {
        Self { entries }
    }

    /// The stock two-flag pose map: nothing raised -> 2, first flag -> 0,
    /// second flag -> 1, both -> 3.
    pub fn two_flags() -> Self {
        Self::new(vec![
            (StateSet::EMPTY, 2),
            (StateSet::EMPTY.insert(0), 0),
            (StateSet::EMPTY.insert(1), 1),
            (StateSet::EMPTY.insert(0).insert(1), 3),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expected id for `set`, or `None` when the map has no requirement.
    pub fn expected(&self, set: StateSet) -> Option<SignalId> {
        self.entries
            .iter()
            .find(|(s, _)| *s == set)
            .map(|&(_, id)| id)
    }
}

impl From<&aicam_config::SignalCfg> for SignalMap {
    fn from(c: &aicam_config::SignalCfg) -> Self {
        Self::new(
            c.map
                .iter()
                .map(|entry| (StateSet::with(&entry.flags), entry.id))
                .collect(),
        )
    }
}

/// One unit of a round plan. A step is gated iff it carries an op: gated
/// steps must match the smoothed signal before their deadline, rest steps
/// pass unconditionally when their (short) duration elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSpec {
    pub op: Option<StateOp>,
    pub duration: Duration,
}

impl StepSpec {
    pub fn rest(duration: Duration) -> Self {
        Self { op: None, duration }
    }

    pub fn gated(op: StateOp, duration: Duration) -> Self {
        Self {
            op: Some(op),
            duration,
        }
    }

    pub fn is_gated(&self) -> bool {
        self.op.is_some()
    }
}

/// Ordered list of steps executed as one round.
#[derive(Debug, Clone, Default)]
pub struct RoundPlan {
    pub steps: Vec<StepSpec>,
}

impl RoundPlan {
    pub fn new(steps: Vec<StepSpec>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The call-and-answer topology: every slot is announced first (ungated,
    /// long when it carries a command, short otherwise), then answered in
    /// the same order (gated when it carries a command, a short rest
    /// otherwise).
    pub fn call_and_answer(
        calls: &[Option<StateOp>],
        command_step: Duration,
        rest_step: Duration,
    ) -> Self {
        let mut steps = Vec::with_capacity(calls.len() * 2);
        for call in calls {
            steps.push(StepSpec::rest(if call.is_some() {
                command_step
            } else {
                rest_step
            }));
        }
        for call in calls {
            steps.push(match call {
                Some(op) => StepSpec::gated(*op, command_step),
                None => StepSpec::rest(rest_step),
            });
        }
        Self::new(steps)
    }
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEvent {
    /// The tracked signal changed (for live display).
    SignalUpdate { signal: Option<SignalId> },
    StepStarted { index: usize, gated: bool },
    StepPassed { index: usize },
    StepFailed {
        index: usize,
        resolved: Option<SignalId>,
        expected: Option<SignalId>,
    },
    RoundComplete { outcomes: Vec<Option<bool>> },
}

/// Why a round ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundFailure {
    pub step: usize,
    pub resolved: Option<SignalId>,
    pub expected: Option<SignalId>,
}

impl core::fmt::Display for RoundFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "step {} resolved {:?}, expected {:?}",
            self.step, self.resolved, self.expected
        )
    }
}

/// Public status of a single sequencer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    /// Keep ticking; the round is still in flight.
    Running,
    /// Every step passed; the round is over.
    Complete,
    /// A gated step mismatched (or timed out without a match); terminal.
    Failed(RoundFailure),
}

/// Per-step gate state: the op under test, the expected id computed at
/// step entry, and the sample window scoped to this step.
#[derive(Debug)]
struct StepGate {
    op: StateOp,
    expected: Option<SignalId>,
    window: SampleWindow,
}

#[derive(Debug)]
struct ActiveRound {
    plan: RoundPlan,
    cursor: usize,
    flags: StateSet,
    deadline_ms: u64,
    gate: Option<StepGate>,
}

impl ActiveRound {
    fn arm_step(
        &mut self,
        now_ms: u64,
        map: &SignalMap,
        smoothing: &SmoothingCfg,
        events: &mut Vec<RoundEvent>,
    ) {
        let spec = self.plan.steps[self.cursor];
        self.deadline_ms = now_ms + spec.duration.as_millis() as u64;
        self.gate = spec.op.map(|op| StepGate {
            op,
            expected: map.expected(self.flags.apply(op)),
            window: SampleWindow::new(smoothing.window_samples),
        });
        tracing::debug!(
            step = self.cursor,
            gated = spec.is_gated(),
            duration_ms = spec.duration.as_millis() as u64,
            "step start"
        );
        events.push(RoundEvent::StepStarted {
            index: self.cursor,
            gated: spec.is_gated(),
        });
    }

    /// Advance the round by one tick. Both completion paths of a gated step
    /// (window full first, deadline first) funnel through the single
    /// `settle` transition below, so a finalized step can never be mutated
    /// twice.
    fn advance(
        &mut self,
        sample: Option<SignalId>,
        now_ms: u64,
        map: &SignalMap,
        smoothing: &SmoothingCfg,
        outcomes: &mut [Option<bool>],
        events: &mut Vec<RoundEvent>,
    ) -> RoundStatus {
        match &mut self.gate {
            None => {
                if now_ms < self.deadline_ms {
                    return RoundStatus::Running;
                }
                self.settle(now_ms, map, smoothing, outcomes, events)
            }
            Some(gate) => {
                if let Some(id) = sample {
                    gate.window.push(id, smoothing.max_id);
                }
                if !gate.window.is_full() && now_ms < self.deadline_ms {
                    return RoundStatus::Running;
                }
                let resolved = gate.window.resolve();
                let expected = gate.expected;
                // No requirement for this state: satisfied by anything,
                // including silence.
                let pass = match expected {
                    Some(exp) => resolved == Some(exp),
                    None => true,
                };
                if !pass {
                    outcomes[self.cursor] = Some(false);
                    tracing::info!(
                        step = self.cursor,
                        ?resolved,
                        ?expected,
                        "step failed"
                    );
                    events.push(RoundEvent::StepFailed {
                        index: self.cursor,
                        resolved,
                        expected,
                    });
                    return RoundStatus::Failed(RoundFailure {
                        step: self.cursor,
                        resolved,
                        expected,
                    });
                }
                self.settle(now_ms, map, smoothing, outcomes, events)
            }
        }
    }

    /// The single pass transition: record the outcome, commit the op,
    /// advance the cursor, arm the next step or finish the round.
    fn settle(
        &mut self,
        now_ms: u64,
        map: &SignalMap,
        smoothing: &SmoothingCfg,
        outcomes: &mut [Option<bool>],
        events: &mut Vec<RoundEvent>,
    ) -> RoundStatus {
        outcomes[self.cursor] = Some(true);
        if let Some(gate) = self.gate.take() {
            // Commit the command only once its step passed.
            self.flags = self.flags.apply(gate.op);
        }
        events.push(RoundEvent::StepPassed { index: self.cursor });
        self.cursor += 1;
        if self.cursor >= self.plan.len() {
            tracing::info!(steps = self.plan.len(), "round complete");
            events.push(RoundEvent::RoundComplete {
                outcomes: outcomes.to_vec(),
            });
            return RoundStatus::Complete;
        }
        self.arm_step(now_ms, map, smoothing, events);
        RoundStatus::Running
    }
}

/// The timed step-sequencing state machine.
///
/// One `Sequencer` lives as long as the game; rounds are started one at a
/// time (single-flight: starting while a round is in flight is rejected)
/// and driven by `tick` at the sampling cadence with the latest tracked
/// signal.
pub struct Sequencer {
    map: SignalMap,
    smoothing: SmoothingCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    observer: Option<Box<dyn FnMut(RoundEvent)>>,
    active: Option<ActiveRound>,
    outcomes: Vec<Option<bool>>,
    last_signal: Option<SignalId>,
}

impl core::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sequencer")
            .field("round_active", &self.active.is_some())
            .field("cursor", &self.cursor())
            .field("last_signal", &self.last_signal)
            .finish()
    }
}

impl Sequencer {
    /// Start building a Sequencer.
    pub fn builder() -> SequencerBuilder<Missing> {
        SequencerBuilder::default()
    }

    pub fn smoothing_cfg(&self) -> &SmoothingCfg {
        &self.smoothing
    }

    /// Index of the step currently in flight, if any.
    pub fn cursor(&self) -> Option<usize> {
        self.active.as_ref().map(|r| r.cursor)
    }

    pub fn round_active(&self) -> bool {
        self.active.is_some()
    }

    /// Per-step outcomes of the in-flight round, or of the last one once
    /// it reached a terminal state.
    pub fn outcomes(&self) -> &[Option<bool>] {
        &self.outcomes
    }

    /// Latest signal observed by `tick` (for display).
    pub fn current_signal(&self) -> Option<SignalId> {
        self.last_signal
    }

    /// Arm a new round. Rejected while one is in flight — cancel it or let
    /// it reach `Complete`/`Failed` first.
    pub fn start_round(&mut self, plan: RoundPlan) -> Result<()> {
        if self.active.is_some() {
            return Err(eyre::Report::new(CamError::RoundInProgress));
        }
        if plan.is_empty() {
            return Err(eyre::Report::new(CamError::Config(
                "round plan has no steps".into(),
            )));
        }
        if plan.steps.iter().any(|s| s.duration.is_zero()) {
            return Err(eyre::Report::new(CamError::Config(
                "step durations must be > 0".into(),
            )));
        }
        // Fresh epoch per round; all step deadlines count from here.
        self.epoch = self.clock.now();
        self.outcomes = vec![None; plan.len()];
        self.last_signal = None;
        let mut round = ActiveRound {
            plan,
            cursor: 0,
            flags: StateSet::EMPTY,
            deadline_ms: 0,
            gate: None,
        };
        let mut events = Vec::new();
        round.arm_step(0, &self.map, &self.smoothing, &mut events);
        self.active = Some(round);
        self.flush(events);
        Ok(())
    }

    /// Advance the round by one tick with the latest tracked signal.
    ///
    /// The caller invokes this once per sampling period; within a gated
    /// step the window-full check and the deadline race here, and the first
    /// to trigger performs the step's one and only transition.
    pub fn tick(&mut self, sample: Option<SignalId>) -> Result<RoundStatus> {
        let Some(round) = self.active.as_mut() else {
            return Err(eyre::Report::new(CamError::NoRound));
        };
        let now_ms = self.clock.ms_since(self.epoch);
        let mut events = Vec::new();
        if sample != self.last_signal {
            self.last_signal = sample;
            events.push(RoundEvent::SignalUpdate { signal: sample });
        }
        let status = round.advance(
            sample,
            now_ms,
            &self.map,
            &self.smoothing,
            &mut self.outcomes,
            &mut events,
        );
        if !matches!(status, RoundStatus::Running) {
            // Terminal: drop all in-flight step state (window, deadline).
            self.active = None;
        }
        self.flush(events);
        Ok(status)
    }

    /// Drop the in-flight round, cancelling its pending deadline and
    /// sampling window. Used on disconnect and shutdown.
    pub fn cancel_round(&mut self) {
        if self.active.take().is_some() {
            tracing::debug!("round cancelled");
        }
    }

    fn flush(&mut self, events: Vec<RoundEvent>) {
        if let Some(observer) = self.observer.as_mut() {
            for event in events {
                observer(event);
            }
        }
    }
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

use std::marker::PhantomData;

/// Builder for `Sequencer`. The signal map is mandatory; everything else
/// has defaults. Validated on `build()`.
pub struct SequencerBuilder<M> {
    map: Option<SignalMap>,
    smoothing: Option<SmoothingCfg>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    observer: Option<Box<dyn FnMut(RoundEvent)>>,
    _m: PhantomData<M>,
}

impl Default for SequencerBuilder<Missing> {
    fn default() -> Self {
        Self {
            map: None,
            smoothing: None,
            clock: None,
            observer: None,
            _m: PhantomData,
        }
    }
}

impl<M> SequencerBuilder<M> {
    pub fn with_smoothing(mut self, smoothing: SmoothingCfg) -> Self {
        self.smoothing = Some(smoothing);
        self
    }

    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Register the presentation-layer callback for `RoundEvent`s.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(RoundEvent) + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Fallible build available in any type-state; returns a detailed
    /// BuildError for missing pieces.
    pub fn try_build(self) -> Result<Sequencer> {
        let map = self
            .map
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSignalMap))?;
        if map.is_empty() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "signal map must not be empty",
            )));
        }
        let smoothing = self.smoothing.unwrap_or_default();
        if smoothing.sample_period_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "sample_period_ms must be >= 1",
            )));
        }
        if smoothing.window_samples == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "window_samples must be >= 1",
            )));
        }
        if smoothing.debounce_timeout_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "debounce_timeout_ms must be >= 1",
            )));
        }
        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let epoch = clock.now();
        Ok(Sequencer {
            map,
            smoothing,
            clock,
            epoch,
            observer: self.observer,
            active: None,
            outcomes: Vec::new(),
            last_signal: None,
        })
    }
}

impl SequencerBuilder<Missing> {
    pub fn with_signal_map(self, map: SignalMap) -> SequencerBuilder<Set> {
        SequencerBuilder {
            map: Some(map),
            smoothing: self.smoothing,
            clock: self.clock,
            observer: self.observer,
            _m: PhantomData,
        }
    }
}

impl SequencerBuilder<Set> {
    /// Validate and build. Only available once the signal map is set.
    pub fn build(self) -> Result<Sequencer> {
        self.try_build()
    }
}

#[cfg(test)]
mod state_set_tests {
    use super::*;

    #[test]
    fn insert_remove_roundtrip() {
        let s = StateSet::EMPTY.insert(0).insert(1);
        assert!(s.contains(0) && s.contains(1));
        let s = s.remove(0);
        assert!(!s.contains(0) && s.contains(1));
        // Removing an absent flag is a no-op.
        assert_eq!(s.remove(5), s);
    }

    #[test]
    fn two_flag_map_matches_pose_table() {
        let map = SignalMap::two_flags();
        assert_eq!(map.expected(StateSet::EMPTY), Some(2));
        assert_eq!(map.expected(StateSet::EMPTY.insert(0)), Some(0));
        assert_eq!(map.expected(StateSet::EMPTY.insert(1)), Some(1));
        assert_eq!(map.expected(StateSet::with(&[0, 1])), Some(3));
        assert_eq!(map.expected(StateSet::with(&[2])), None);
    }
}

#[cfg(test)]
mod plan_tests {
    use super::*;

    #[test]
    fn call_and_answer_mirrors_slots() {
        let calls = [
            Some(StateOp::Insert(0)),
            None,
            Some(StateOp::Remove(1)),
            None,
        ];
        let plan = RoundPlan::call_and_answer(
            &calls,
            Duration::from_millis(2000),
            Duration::from_millis(500),
        );
        assert_eq!(plan.len(), 8);
        // Announce half is never gated.
        assert!(plan.steps[..4].iter().all(|s| !s.is_gated()));
        // Answer half is gated exactly where a command sits.
        assert!(plan.steps[4].is_gated());
        assert!(!plan.steps[5].is_gated());
        assert!(plan.steps[6].is_gated());
        assert!(!plan.steps[7].is_gated());
        assert_eq!(plan.steps[0].duration, Duration::from_millis(2000));
        assert_eq!(plan.steps[1].duration, Duration::from_millis(500));
    }
}
