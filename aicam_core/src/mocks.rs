//! Test and helper mocks for aicam_core

use std::time::Duration;

/// A byte source that never yields data; useful when driving the sequencer
/// directly via `tick` without a reader thread.
pub struct NoopSource;

impl aicam_traits::ByteSource for NoopSource {
    fn read(
        &mut self,
        _buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        Ok(0)
    }
}

/// A byte source that replays a fixed byte script in configurable chunks,
/// then reports end-of-stream.
pub struct ScriptedSource {
    bytes: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl ScriptedSource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            pos: 0,
            chunk: 64,
        }
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }
}

impl aicam_traits::ByteSource for ScriptedSource {
    fn read(
        &mut self,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        if self.pos >= self.bytes.len() {
            return Err("stream closed".into());
        }
        let n = buf
            .len()
            .min(self.chunk)
            .min(self.bytes.len() - self.pos);
        buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
