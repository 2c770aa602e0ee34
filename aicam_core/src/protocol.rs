//! Camera wire protocol: frame reassembly and candidate extraction.
//!
//! One parameterized implementation serves every consumer; the games only
//! differ in sequencer configuration, never in how bytes become frames.
//!
//! Wire format, fields in order:
//! `HEAD(1) | CMD(1) | LEN_LO(1) | LEN_HI(1) | PAYLOAD(LEN) | TRAILER(4) | END(1)`
//!
//! The trailer is reserved by the device for an integrity word that is
//! never computed or compared on either side; it is read and stored, not
//! validated. Framing is tolerant by design: malformed input never errors,
//! it just never completes a frame.

/// Frame head marker.
pub const FRAME_HEAD: u8 = 0xFD;
/// Frame end marker.
pub const FRAME_END: u8 = 0xED;
/// Wire id meaning "no detection"; must never reach the smoothing window.
pub const NO_DETECTION: u8 = 255;

/// A recognized object id as reported by the camera.
pub type SignalId = u8;

/// Known message commands. The command byte is carried raw in `Frame` so
/// unknown values pass through framing; they simply yield no candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    KeypointBoxDetection,
    Classification,
    Detection,
}

impl Command {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::KeypointBoxDetection),
            1 => Some(Self::Classification),
            2 => Some(Self::Detection),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            Self::KeypointBoxDetection => 0,
            Self::Classification => 1,
            Self::Detection => 2,
        }
    }
}

/// One reassembled message from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw command byte.
    pub command: u8,
    /// Payload length as declared on the wire (little-endian 16-bit).
    pub declared_len: u16,
    /// Exactly `declared_len` bytes.
    pub payload: Vec<u8>,
    /// Stored unchecked.
    pub trailer: [u8; 4],
}

impl Frame {
    pub fn command(&self) -> Option<Command> {
        Command::from_raw(self.command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    WaitStart,
    Header,
    Payload,
    Trailer,
    Terminator,
}

#[derive(Debug)]
struct PartialFrame {
    command: u8,
    declared_len: u16,
    payload: Vec<u8>,
    trailer: [u8; 4],
}

/// Byte-at-a-time frame reassembler.
///
/// `feed` takes one byte and returns at most one completed frame; there is
/// no buffering across calls beyond the in-progress frame. A byte other
/// than the end marker at the terminator position is dropped and the
/// decoder keeps waiting there — the only escape is `reset()`, which
/// callers invoke on every reconnect.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    partial: Option<PartialFrame>,
    buf: Vec<u8>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::WaitStart,
            partial: None,
            buf: Vec::with_capacity(8),
        }
    }

    /// True when no frame is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::WaitStart
    }

    /// Discard any in-progress frame and return to the start state.
    pub fn reset(&mut self) {
        self.state = DecodeState::WaitStart;
        self.partial = None;
        self.buf.clear();
    }

    /// Feed one byte; returns the completed frame when this byte was a
    /// valid terminator.
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecodeState::WaitStart => {
                if byte == FRAME_HEAD {
                    self.partial = Some(PartialFrame {
                        command: 0,
                        declared_len: 0,
                        payload: Vec::new(),
                        trailer: [0; 4],
                    });
                    self.buf.clear();
                    self.state = DecodeState::Header;
                }
                None
            }
            DecodeState::Header => {
                self.buf.push(byte);
                if self.buf.len() == 3 {
                    let len = u16::from(self.buf[1]) | (u16::from(self.buf[2]) << 8);
                    if let Some(partial) = self.partial.as_mut() {
                        partial.command = self.buf[0];
                        partial.declared_len = len;
                        partial.payload = Vec::with_capacity(len as usize);
                    }
                    self.buf.clear();
                    // A zero-length payload has nothing to collect; go
                    // straight to the trailer.
                    self.state = if len == 0 {
                        DecodeState::Trailer
                    } else {
                        DecodeState::Payload
                    };
                }
                None
            }
            DecodeState::Payload => {
                if let Some(partial) = self.partial.as_mut() {
                    partial.payload.push(byte);
                    if partial.payload.len() == partial.declared_len as usize {
                        self.state = DecodeState::Trailer;
                    }
                }
                None
            }
            DecodeState::Trailer => {
                self.buf.push(byte);
                if self.buf.len() == 4 {
                    if let Some(partial) = self.partial.as_mut() {
                        partial.trailer.copy_from_slice(&self.buf);
                    }
                    self.buf.clear();
                    self.state = DecodeState::Terminator;
                }
                None
            }
            DecodeState::Terminator => {
                if byte == FRAME_END {
                    self.state = DecodeState::WaitStart;
                    self.partial.take().map(|p| Frame {
                        command: p.command,
                        declared_len: p.declared_len,
                        payload: p.payload,
                        trailer: p.trailer,
                    })
                } else {
                    // Not the end marker: drop the byte and keep waiting.
                    None
                }
            }
        }
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Classification,
    Detection,
}

/// One (id, confidence) observation extracted from a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub id: SignalId,
    pub confidence: u8,
    pub kind: CandidateKind,
}

/// Extract candidates from a frame, in payload order.
///
/// Stride loops are bounded by `declared_len`, not the payload length, so
/// reads are guarded: a missing id ends the stride, a missing confidence
/// defaults to 0. Unknown commands and keypoint/box messages yield nothing.
pub fn extract(frame: &Frame) -> Vec<Candidate> {
    let mut out = Vec::new();
    let len = frame.declared_len as usize;
    match frame.command() {
        Some(Command::Classification) => {
            // Offset 0 is an unused type byte; pairs of (id, confidence).
            let mut i = 1;
            while i < len {
                let Some(&id) = frame.payload.get(i) else {
                    break;
                };
                let confidence = frame.payload.get(i + 1).copied().unwrap_or(0);
                out.push(Candidate {
                    id,
                    confidence,
                    kind: CandidateKind::Classification,
                });
                i += 2;
            }
        }
        Some(Command::Detection) => {
            // Offset 0 is an unused type byte; 6-byte strides where the
            // middle 4 bytes are a bounding box this pipeline ignores.
            let mut j = 1;
            while j + 5 < len {
                let Some(&id) = frame.payload.get(j) else {
                    break;
                };
                let confidence = frame.payload.get(j + 5).copied().unwrap_or(0);
                out.push(Candidate {
                    id,
                    confidence,
                    kind: CandidateKind::Detection,
                });
                j += 6;
            }
        }
        Some(Command::KeypointBoxDetection) | None => {}
    }
    out
}

/// Encode a classification frame: type byte then (id, confidence) pairs.
/// Used by fixtures and the simulator; the trailer is left zeroed because
/// nothing validates it.
pub fn encode_classification(pairs: &[(SignalId, u8)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + 2 * pairs.len());
    payload.push(0);
    for &(id, confidence) in pairs {
        payload.push(id);
        payload.push(confidence);
    }
    encode_frame(Command::Classification.as_raw(), &payload)
}

/// Encode a detection frame: type byte then 6-byte strides of
/// (id, box x, box y, box w, box h, confidence).
pub fn encode_detection(objects: &[(SignalId, [u8; 4], u8)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + 6 * objects.len());
    payload.push(0);
    for &(id, bbox, confidence) in objects {
        payload.push(id);
        payload.extend_from_slice(&bbox);
        payload.push(confidence);
    }
    encode_frame(Command::Detection.as_raw(), &payload)
}

/// Encode an arbitrary frame around `payload`.
pub fn encode_frame(command: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u16;
    let mut out = Vec::with_capacity(payload.len() + 9);
    out.push(FRAME_HEAD);
    out.push(command);
    out.push((len & 0xFF) as u8);
    out.push((len >> 8) as u8);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.push(FRAME_END);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| decoder.feed(b)).collect()
    }

    #[test]
    fn zero_length_payload_advances_to_trailer() {
        let mut d = FrameDecoder::new();
        let bytes = encode_frame(1, &[]);
        let frames = feed_all(&mut d, &bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].declared_len, 0);
        assert!(frames[0].payload.is_empty());
        assert!(d.is_idle());
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut d = FrameDecoder::new();
        for b in [FRAME_HEAD, 1, 5, 0, 0, 1] {
            assert!(d.feed(b).is_none());
        }
        assert!(!d.is_idle());
        d.reset();
        assert!(d.is_idle());
        // A fresh frame decodes normally afterwards.
        let frames = feed_all(&mut d, &encode_classification(&[(2, 90)]));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn unknown_command_passes_framing_but_yields_no_candidates() {
        let mut d = FrameDecoder::new();
        let frames = feed_all(&mut d, &encode_frame(7, &[0, 1, 2]));
        assert_eq!(frames.len(), 1);
        assert!(frames[0].command().is_none());
        assert!(extract(&frames[0]).is_empty());
    }
}
