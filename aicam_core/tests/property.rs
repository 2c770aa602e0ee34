use aicam_core::protocol::{FRAME_HEAD, FrameDecoder, encode_frame, extract};
use aicam_core::smoothing::resolve_majority;
use proptest::prelude::*;

prop_compose! {
    /// Bytes that can never start a frame.
    fn headless_noise()(bytes in proptest::collection::vec(0u8..=254, 0..64)) -> Vec<u8> {
        bytes.into_iter().map(|b| if b == FRAME_HEAD { 0 } else { b }).collect()
    }
}

proptest! {
    #[test]
    fn decoder_recovers_any_encoded_frame_amid_noise(
        command in 0u8..=255,
        payload in proptest::collection::vec(any::<u8>(), 0..300),
        prefix in headless_noise(),
        suffix in headless_noise(),
    ) {
        let mut stream = prefix;
        stream.extend(encode_frame(command, &payload));
        stream.extend(suffix);

        let mut decoder = FrameDecoder::new();
        let frames: Vec<_> = stream.iter().filter_map(|&b| decoder.feed(b)).collect();

        prop_assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        prop_assert_eq!(frame.command, command);
        prop_assert_eq!(frame.declared_len as usize, payload.len());
        prop_assert_eq!(&frame.payload, &payload);
    }

    #[test]
    fn emitted_frames_always_honor_declared_len(
        stream in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut decoder = FrameDecoder::new();
        for byte in stream {
            if let Some(frame) = decoder.feed(byte) {
                prop_assert_eq!(frame.payload.len(), frame.declared_len as usize);
                // Extraction over arbitrary frames must stay in bounds.
                let _ = extract(&frame);
            }
        }
    }

    #[test]
    fn majority_winner_has_maximal_count_and_latest_tie_index(
        window in proptest::collection::vec(0u8..8, 0..64),
    ) {
        let resolved = resolve_majority(&window);
        match resolved {
            None => prop_assert!(window.is_empty()),
            Some(winner) => {
                let count = |id: u8| window.iter().filter(|&&x| x == id).count();
                let last_index =
                    |id: u8| window.iter().rposition(|&x| x == id);
                let wc = count(winner);
                for id in 0u8..8 {
                    let c = count(id);
                    prop_assert!(c <= wc, "{id} beats winner {winner} on count");
                    if c == wc && c > 0 {
                        prop_assert!(
                            last_index(id) <= last_index(winner),
                            "tie must resolve to the most recent id"
                        );
                    }
                }
            }
        }
    }
}
