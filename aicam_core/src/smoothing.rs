//! Temporal smoothing of the candidate id stream.
//!
//! Two modes, chosen per consumer:
//! - majority vote over a bounded per-step window (`SampleWindow` +
//!   `resolve_majority`) for sequenced rounds, and
//! - hold-then-revert debouncing (`Debouncer`) where per-frame
//!   responsiveness matters more than noise rejection.
//!
//! Both are plain values owned by their caller and driven by explicit
//! milliseconds from the clock; there is no hidden global state.

use crate::protocol::SignalId;

/// Resolve a window of ids to the most frequent one.
///
/// Ties resolve to the id whose last occurrence index is greatest — the
/// most recently seen wins. An empty window resolves to no signal.
pub fn resolve_majority(samples: &[SignalId]) -> Option<SignalId> {
    if samples.is_empty() {
        return None;
    }
    // ids are u8; direct-index tables beat a map at this size
    let mut count = [0u32; 256];
    let mut last_index = [0usize; 256];
    for (index, &id) in samples.iter().enumerate() {
        count[id as usize] += 1;
        last_index[id as usize] = index;
    }
    let mut best: Option<SignalId> = None;
    for id in 0..=255u8 {
        let c = count[id as usize];
        if c == 0 {
            continue;
        }
        match best {
            None => best = Some(id),
            Some(b) => {
                let bc = count[b as usize];
                if c > bc || (c == bc && last_index[id as usize] > last_index[b as usize]) {
                    best = Some(id);
                }
            }
        }
    }
    best
}

/// Bounded sample buffer scoped to one gated step.
///
/// Invariant: `len() <= capacity()`; the window is discarded with its step,
/// never rolled across steps.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: Vec<SignalId>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Accept a sample if it is inside the valid id domain. The caller has
    /// already turned the 255 sentinel into "no sample".
    pub fn push(&mut self, id: SignalId, max_id: SignalId) {
        if id > max_id || self.is_full() {
            return;
        }
        self.samples.push(id);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Majority-vote resolution of the collected samples.
    pub fn resolve(&self) -> Option<SignalId> {
        resolve_majority(&self.samples)
    }
}

/// Debounced live signal: the most recent valid id stays active until the
/// timeout elapses with no valid observation, then reverts to neutral
/// exactly once.
#[derive(Debug)]
pub struct Debouncer {
    active: Option<SignalId>,
    /// Absolute expiry time; None when nothing is armed.
    deadline_ms: Option<u64>,
    timeout_ms: u64,
}

impl Debouncer {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            active: None,
            deadline_ms: None,
            timeout_ms,
        }
    }

    pub fn signal(&self) -> Option<SignalId> {
        self.active
    }

    /// Record a decoded observation: `Some(id)` for a usable target,
    /// `None` for a message carrying no usable target (which clears the
    /// signal immediately). Returns `Some(new_signal)` when the active
    /// signal changed.
    pub fn observe(
        &mut self,
        id: Option<SignalId>,
        now_ms: u64,
    ) -> Option<Option<SignalId>> {
        match id {
            Some(id) => {
                self.deadline_ms = Some(now_ms + self.timeout_ms);
                if self.active != Some(id) {
                    self.active = Some(id);
                    tracing::trace!(id, "debounce signal set");
                    return Some(self.active);
                }
                None
            }
            None => {
                self.deadline_ms = None;
                if self.active.is_some() {
                    self.active = None;
                    return Some(None);
                }
                None
            }
        }
    }

    /// Advance to `now_ms`; expires the active signal if it outlived the
    /// timeout. The reversion fires once: after it, the debouncer is
    /// disarmed until the next observation.
    pub fn tick(&mut self, now_ms: u64) -> Option<Option<SignalId>> {
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.deadline_ms = None;
                if self.active.is_some() {
                    self.active = None;
                    tracing::trace!("debounce signal expired");
                    return Some(None);
                }
                None
            }
            _ => None,
        }
    }
}
