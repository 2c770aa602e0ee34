//! Background byte-channel pump.
//!
//! Spawns a thread that exclusively owns the `ByteSource` and a fresh
//! `FrameDecoder`, processes bytes strictly in arrival order, and pushes
//! extracted samples over a bounded channel. The 255 no-detection sentinel
//! is delivered as `None` so consumers can clear their tracked signal.
//! Link state is published through an atomic; `last_ok` tracks the last
//! decoded frame for stall introspection.
//!
//! Safety: each `Reader` spawns exactly one thread that is shut down when
//! the `Reader` is dropped, preventing thread leaks.

use crossbeam_channel as xch;

use aicam_traits::{ByteSource, Clock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::CamError;
use crate::protocol::{FrameDecoder, NO_DETECTION, SignalId, extract};

/// Published state of the byte channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkStatus {
    /// Reader thread is pumping bytes.
    Connected = 0,
    /// Clean end of stream.
    Closed = 1,
    /// Device lost or read fault. Treated like `Closed` by consumers.
    Lost = 2,
}

impl LinkStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Connected,
            1 => Self::Closed,
            _ => Self::Lost,
        }
    }

    /// True for both termination flavors; the core treats them identically.
    pub fn is_down(self) -> bool {
        !matches!(self, Self::Connected)
    }
}

pub struct Reader {
    rx: xch::Receiver<Option<SignalId>>,
    status: Arc<AtomicU8>,
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Reader {
    /// Take exclusive ownership of `source` and start pumping it.
    ///
    /// The channel is bounded and fed with `try_send`: the read loop never
    /// blocks on a slow consumer, the consumer drains and keeps the latest
    /// sample.
    pub fn spawn<B: ByteSource + Send + 'static, C: Clock + Send + Sync + 'static>(
        mut source: B,
        timeout: Duration,
        clock: C,
    ) -> Self {
        let (tx, rx) = xch::bounded(8);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let status = Arc::new(AtomicU8::new(LinkStatus::Connected as u8));
        let status_clone = status.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; 256];
            'pump: loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("reader thread received shutdown signal");
                    break;
                }

                match source.read(&mut buf, timeout) {
                    // Nothing arrived within the timeout; channel still up.
                    Ok(0) => continue,
                    Ok(n) => {
                        for &byte in &buf[..n] {
                            let Some(frame) = decoder.feed(byte) else {
                                continue;
                            };
                            last_ok_clone.store(clock.ms_since(epoch), Ordering::Relaxed);
                            let Some(candidate) = extract(&frame).first().copied() else {
                                continue;
                            };
                            let sample = if candidate.id == NO_DETECTION {
                                None
                            } else {
                                Some(candidate.id)
                            };
                            match tx.try_send(sample) {
                                Ok(()) => {}
                                Err(xch::TrySendError::Full(_)) => {
                                    // Consumer is lagging; it only wants the
                                    // latest value anyway.
                                    tracing::trace!("sample channel full, dropping");
                                }
                                Err(xch::TrySendError::Disconnected(_)) => {
                                    tracing::debug!(
                                        "reader consumer disconnected, exiting thread"
                                    );
                                    break 'pump;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let mapped = map_source_error(e.as_ref());
                        let ended = match mapped {
                            CamError::DeviceLost => LinkStatus::Lost,
                            _ => LinkStatus::Closed,
                        };
                        tracing::warn!(error = %mapped, "byte channel ended");
                        status_clone.store(ended as u8, Ordering::Relaxed);
                        break;
                    }
                }
            }
            // Shutdown and consumer-gone paths end as a clean close.
            let _ = status_clone.compare_exchange(
                LinkStatus::Connected as u8,
                LinkStatus::Closed as u8,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
            tracing::trace!("reader thread exiting cleanly");
        });

        Self {
            rx,
            status,
            last_ok,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Drain queued samples and return the most recent, if any arrived
    /// since the last call. `Some(None)` means the sentinel was observed.
    pub fn latest(&self) -> Option<Option<SignalId>> {
        self.rx.try_iter().last()
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus::from_raw(self.status.load(Ordering::Relaxed))
    }

    /// Milliseconds since the last decoded frame, given `now_ms` relative
    /// to this reader's epoch.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Convenience helper using a real monotonic clock.
    pub fn stalled_for_now(&self) -> u64 {
        let now_ms = {
            let dur = Instant::now().saturating_duration_since(self.epoch);
            let ms = dur.as_millis();
            (ms.min(u128::from(u64::MAX))) as u64
        };
        self.stalled_for(now_ms)
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // The thread exits at the next loop head, or after the in-flight
        // read returns (bounded by the source timeout).
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("reader thread joined successfully");
                }
                Err(e) => {
                    // Thread panicked; log but don't propagate (we're in Drop)
                    tracing::warn!(?e, "reader thread panicked during shutdown");
                }
            }
        }
    }
}

/// Map a byte-source error to a typed `CamError`, downcasting hardware
/// errors when the `hardware-errors` feature is enabled.
pub(crate) fn map_source_error(e: &(dyn std::error::Error + 'static)) -> CamError {
    #[cfg(feature = "hardware-errors")]
    if let Some(hw) = e.downcast_ref::<aicam_hardware::error::HwError>() {
        use aicam_hardware::error::HwError;
        return match hw {
            HwError::Disconnected => CamError::DeviceLost,
            HwError::Busy(p) => CamError::Busy(p.clone()),
            HwError::Timeout => CamError::Channel("read timeout".into()),
            other => CamError::Channel(other.to_string()),
        };
    }
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("disconnect") || lower.contains("device has been lost") {
        CamError::DeviceLost
    } else {
        CamError::Channel(s)
    }
}
