#![no_main]
use libfuzzer_sys::fuzz_target;

use aicam_core::protocol::{FrameDecoder, extract};

fuzz_target!(|data: &[u8]| {
    // Arbitrary byte streams must never panic the decoder, and every frame
    // it does emit must honor its declared payload length. Extraction over
    // whatever comes out must stay in bounds too.
    let mut decoder = FrameDecoder::new();
    for (i, &byte) in data.iter().enumerate() {
        if let Some(frame) = decoder.feed(byte) {
            assert_eq!(frame.payload.len(), frame.declared_len as usize);
            let _ = extract(&frame);
        }
        // Interleave resets to exercise recovery from any state.
        if i % 251 == 250 {
            decoder.reset();
            assert!(decoder.is_idle());
        }
    }
});
