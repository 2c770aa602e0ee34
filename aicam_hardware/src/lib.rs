//! Byte sources for the AI camera link.
//!
//! `SimulatedCamera` synthesizes well-formed classification frames from a
//! scripted id sequence and is always available; `SerialCamera` (feature
//! `hardware`) reads the real device through the `serialport` crate. Both
//! implement `aicam_traits::ByteSource` so the core never knows which one
//! it is talking to.

pub mod error;

use aicam_traits::ByteSource;
use std::collections::VecDeque;
use std::time::Duration;

use crate::error::HwError;

// Device-side framing constants (see the camera's wire format):
// HEAD | CMD | LEN_LO | LEN_HI | PAYLOAD.. | TRAILER(4) | END
const FRAME_HEAD: u8 = 0xFD;
const FRAME_END: u8 = 0xED;
const CMD_CLASSIFICATION: u8 = 1;

/// Simulated camera: emits one classification frame per scripted id, at a
/// fixed frame gap, in configurable chunk sizes so byte-stream reassembly
/// gets exercised the way a real serial link would.
pub struct SimulatedCamera {
    ids: Vec<u8>,
    idx: usize,
    cycle: bool,
    pending: VecDeque<u8>,
    chunk: usize,
    frame_gap: Duration,
}

impl SimulatedCamera {
    /// Emit `ids` one frame each, then cycle from the start.
    pub fn new(ids: impl Into<Vec<u8>>) -> Self {
        Self {
            ids: ids.into(),
            idx: 0,
            cycle: true,
            pending: VecDeque::new(),
            chunk: 16,
            frame_gap: Duration::from_millis(50),
        }
    }

    /// Emit the script once; afterwards the source reports end-of-stream.
    pub fn once(ids: impl Into<Vec<u8>>) -> Self {
        let mut cam = Self::new(ids);
        cam.cycle = false;
        cam
    }

    pub fn with_frame_gap(mut self, gap: Duration) -> Self {
        self.frame_gap = gap;
        self
    }

    /// Max bytes handed out per read; small values split frames across reads.
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.ids.is_empty() {
            return None;
        }
        if self.idx >= self.ids.len() {
            if !self.cycle {
                return None;
            }
            self.idx = 0;
        }
        let id = self.ids[self.idx];
        self.idx += 1;
        Some(classification_frame(&[(id, 90)]))
    }
}

/// Build one classification frame: type byte then (id, confidence) pairs.
/// The 4-byte trailer is reserved by the device for an integrity word the
/// host never checks; the simulator leaves it zeroed.
pub fn classification_frame(pairs: &[(u8, u8)]) -> Vec<u8> {
    let len = 1 + 2 * pairs.len() as u16;
    let mut out = Vec::with_capacity(4 + len as usize + 5);
    out.push(FRAME_HEAD);
    out.push(CMD_CLASSIFICATION);
    out.push((len & 0xFF) as u8);
    out.push((len >> 8) as u8);
    out.push(0); // classification type byte, unused by the host
    for &(id, confidence) in pairs {
        out.push(id);
        out.push(confidence);
    }
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.push(FRAME_END);
    out
}

impl ByteSource for SimulatedCamera {
    fn read(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        if self.pending.is_empty() {
            std::thread::sleep(self.frame_gap.min(timeout));
            match self.next_frame() {
                Some(frame) => self.pending.extend(frame),
                None => return Err(Box::new(HwError::Disconnected)),
            }
        }
        let n = buf.len().min(self.chunk).min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            // n is bounded by pending.len(), so pop_front cannot fail
            *slot = self.pending.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

#[cfg(feature = "hardware")]
pub use serial::SerialCamera;

#[cfg(feature = "hardware")]
mod serial {
    use super::*;

    /// Real camera over a serial port (9600 8N1 on the stock device).
    pub struct SerialCamera {
        port: Box<dyn serialport::SerialPort>,
        path: String,
    }

    impl SerialCamera {
        pub fn open(path: &str, baud: u32) -> crate::error::Result<Self> {
            match serialport::new(path, baud)
                .timeout(Duration::from_millis(50))
                .open()
            {
                Ok(port) => {
                    tracing::info!(path, baud, "serial camera opened");
                    Ok(Self {
                        port,
                        path: path.to_string(),
                    })
                }
                Err(e) => Err(match e.kind() {
                    serialport::ErrorKind::NoDevice => HwError::Disconnected,
                    serialport::ErrorKind::Io(
                        std::io::ErrorKind::ResourceBusy | std::io::ErrorKind::PermissionDenied,
                    ) => HwError::Busy(path.to_string()),
                    _ => HwError::Serial(e.to_string()),
                }),
            }
        }
    }

    impl ByteSource for SerialCamera {
        fn read(
            &mut self,
            buf: &mut [u8],
            timeout: Duration,
        ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
            if self.port.timeout() != timeout {
                self.port.set_timeout(timeout).map_err(
                    |e| -> Box<dyn std::error::Error + Send + Sync> {
                        Box::new(HwError::Serial(e.to_string()))
                    },
                )?;
            }
            match self.port.read(buf) {
                // EOF on a serial line means the device went away
                Ok(0) => {
                    tracing::warn!(path = %self.path, "serial camera stream ended");
                    Err(Box::new(HwError::Disconnected))
                }
                Ok(n) => Ok(n),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    Ok(0)
                }
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::warn!(path = %self.path, "serial camera disconnected");
                    Err(Box::new(HwError::Disconnected))
                }
                Err(e) => Err(Box::new(HwError::Io(e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn classification_frame_is_well_formed() {
        let bytes = classification_frame(&[(2, 90)]);
        assert_eq!(bytes[0], FRAME_HEAD);
        assert_eq!(bytes[1], CMD_CLASSIFICATION);
        // len = type byte + one (id, confidence) pair
        assert_eq!(bytes[2], 3);
        assert_eq!(bytes[3], 0);
        assert_eq!(&bytes[4..7], &[0, 2, 90]);
        assert_eq!(*bytes.last().unwrap(), FRAME_END);
        assert_eq!(bytes.len(), 4 + 3 + 4 + 1);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(64)]
    fn simulated_camera_delivers_whole_frames_across_chunks(#[case] chunk: usize) {
        let mut cam = SimulatedCamera::once([2])
            .with_chunk(chunk)
            .with_frame_gap(Duration::from_millis(0));
        let mut collected = Vec::new();
        let mut buf = [0u8; 32];
        loop {
            match cam.read(&mut buf, Duration::from_millis(1)) {
                Ok(0) => continue,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(_) => break, // script exhausted
            }
        }
        assert_eq!(collected, classification_frame(&[(2, 90)]));
    }

    #[test]
    fn exhausted_one_shot_script_reports_disconnect() {
        let mut cam = SimulatedCamera::once([0]).with_frame_gap(Duration::from_millis(0));
        let mut buf = [0u8; 64];
        while cam.read(&mut buf, Duration::from_millis(1)).is_ok() {}
        // stays down on subsequent reads
        assert!(cam.read(&mut buf, Duration::from_millis(1)).is_err());
    }
}
