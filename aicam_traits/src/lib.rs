pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// A sequential, exclusively-owned byte channel (serial port, simulator).
///
/// `read` fills `buf` with whatever arrived on the channel:
/// - `Ok(n)` with `n > 0`: `n` bytes were received, in arrival order.
/// - `Ok(0)`: nothing arrived within `timeout`; the channel is still up.
/// - `Err(_)`: the channel ended — device lost or stream closed. Both are
///   treated identically by callers: terminate the read loop and release
///   the source.
pub trait ByteSource {
    fn read(
        &mut self,
        buf: &mut [u8],
        timeout: std::time::Duration,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
}
