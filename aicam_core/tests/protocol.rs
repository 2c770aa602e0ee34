use aicam_core::protocol::{
    Candidate, CandidateKind, Command, Frame, FrameDecoder, FRAME_END, FRAME_HEAD,
    encode_classification, encode_detection, encode_frame, extract,
};

fn feed_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<Frame> {
    bytes.iter().filter_map(|&b| decoder.feed(b)).collect()
}

#[test]
fn stream_without_head_byte_yields_nothing() {
    let mut d = FrameDecoder::new();
    for b in [0x00, 0x12, 0xED, 0x7F, 0xFE, 0xEC] {
        assert!(d.feed(b).is_none());
    }
    assert!(d.is_idle());
}

#[test]
fn well_formed_frame_completes_on_terminator_only() {
    let bytes = encode_classification(&[(2, 90)]);
    let mut d = FrameDecoder::new();
    for &b in &bytes[..bytes.len() - 1] {
        assert!(d.feed(b).is_none(), "frame completed early");
    }
    let frame = d
        .feed(*bytes.last().unwrap())
        .expect("frame on terminator");
    assert_eq!(frame.command(), Some(Command::Classification));
    assert_eq!(frame.declared_len, 3);
    assert_eq!(frame.payload, vec![0, 2, 90]);
    assert!(d.is_idle());
}

#[test]
fn wrong_terminator_wedges_until_reset_or_valid_end() {
    let mut bytes = encode_classification(&[(1, 80)]);
    let end = bytes.pop();
    assert_eq!(end, Some(FRAME_END));

    let mut d = FrameDecoder::new();
    assert!(feed_all(&mut d, &bytes).is_empty());
    // Garbage at the terminator position is dropped; even a new head byte
    // does not restart the decoder.
    assert!(d.feed(0x00).is_none());
    assert!(d.feed(FRAME_HEAD).is_none());
    assert!(!d.is_idle());
    // A valid terminator eventually releases the frame.
    let frame = d.feed(FRAME_END).expect("late terminator");
    assert_eq!(frame.payload, vec![0, 1, 80]);
    assert!(d.is_idle());
}

#[test]
fn wrong_terminator_then_reset_recovers() {
    let mut bytes = encode_classification(&[(1, 80)]);
    bytes.pop();
    let mut d = FrameDecoder::new();
    feed_all(&mut d, &bytes);
    assert!(d.feed(0x42).is_none());
    d.reset();
    assert!(d.is_idle());
    let frames = feed_all(&mut d, &encode_classification(&[(3, 70)]));
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, vec![0, 3, 70]);
}

#[test]
fn classification_extraction_preserves_payload_order() {
    let mut d = FrameDecoder::new();
    let frames = feed_all(&mut d, &encode_classification(&[(4, 10), (7, 20)]));
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.declared_len, 5);
    assert_eq!(
        extract(frame),
        vec![
            Candidate {
                id: 4,
                confidence: 10,
                kind: CandidateKind::Classification
            },
            Candidate {
                id: 7,
                confidence: 20,
                kind: CandidateKind::Classification
            },
        ]
    );
}

#[test]
fn detection_extraction_reads_six_byte_strides() {
    let mut d = FrameDecoder::new();
    let frames = feed_all(
        &mut d,
        &encode_detection(&[(2, [10, 20, 30, 40], 77), (0, [1, 2, 3, 4], 55)]),
    );
    assert_eq!(frames.len(), 1);
    assert_eq!(
        extract(&frames[0]),
        vec![
            Candidate {
                id: 2,
                confidence: 77,
                kind: CandidateKind::Detection
            },
            Candidate {
                id: 0,
                confidence: 55,
                kind: CandidateKind::Detection
            },
        ]
    );
}

#[test]
fn detection_stride_past_declared_len_is_skipped() {
    // Payload declares a type byte plus one and a half strides; the
    // partial stride must be ignored.
    let payload = vec![0, 2, 10, 20, 30, 40, 77, 1, 2, 3];
    let mut d = FrameDecoder::new();
    let frames = feed_all(&mut d, &encode_frame(Command::Detection.as_raw(), &payload));
    let candidates = extract(&frames[0]);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, 2);
}

#[test]
fn extraction_guards_against_length_disagreement() {
    // A frame whose declared length exceeds its actual payload, as could
    // only arise from an upstream framing anomaly: reads must stay in
    // bounds and simply stop at the real payload end.
    let frame = Frame {
        command: Command::Classification.as_raw(),
        declared_len: 9,
        payload: vec![0, 5, 50, 6],
        trailer: [0; 4],
    };
    let candidates = extract(&frame);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0], Candidate {
        id: 5,
        confidence: 50,
        kind: CandidateKind::Classification
    });
    // Missing confidence byte defaults to zero.
    assert_eq!(candidates[1].confidence, 0);
}

#[test]
fn trailer_is_carried_but_never_validated() {
    let mut bytes = encode_classification(&[(2, 90)]);
    let n = bytes.len();
    // Scribble over the trailer; the frame must still decode.
    bytes[n - 5] = 0xAA;
    bytes[n - 4] = 0xBB;
    bytes[n - 3] = 0xCC;
    bytes[n - 2] = 0xDD;
    let mut d = FrameDecoder::new();
    let frames = feed_all(&mut d, &bytes);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].trailer, [0xAA, 0xBB, 0xCC, 0xDD]);
}

#[test]
fn keypoint_frames_yield_no_candidates() {
    let mut d = FrameDecoder::new();
    let frames = feed_all(
        &mut d,
        &encode_frame(Command::KeypointBoxDetection.as_raw(), &[0, 1, 2, 3]),
    );
    assert_eq!(frames.len(), 1);
    assert!(extract(&frames[0]).is_empty());
}

#[test]
fn frames_are_emitted_in_arrival_order() {
    let mut stream = Vec::new();
    stream.extend(encode_classification(&[(0, 1)]));
    stream.extend([0x33, 0x44]); // inter-frame noise
    stream.extend(encode_classification(&[(1, 2)]));
    stream.extend(encode_classification(&[(2, 3)]));
    let mut d = FrameDecoder::new();
    let frames = feed_all(&mut d, &stream);
    let ids: Vec<u8> = frames.iter().map(|f| f.payload[1]).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn sixteen_bit_length_decodes_little_endian() {
    let payload: Vec<u8> = std::iter::once(0)
        .chain((0..300u16).flat_map(|i| [(i % 4) as u8, 60]))
        .collect();
    let bytes = encode_frame(Command::Classification.as_raw(), &payload);
    // LEN_LO then LEN_HI
    assert_eq!(bytes[2], (payload.len() & 0xFF) as u8);
    assert_eq!(bytes[3], (payload.len() >> 8) as u8);
    let mut d = FrameDecoder::new();
    let frames = feed_all(&mut d, &bytes);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].declared_len as usize, payload.len());
    assert_eq!(extract(&frames[0]).len(), 300);
}
