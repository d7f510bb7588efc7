//! 64-byte frame codec.
//!
//! First frame of a message:
//!
//! ```text
//! [0]     '?'
//! [1..3]  "##"
//! [3..5]  kind (u16 BE)
//! [5..9]  payload length (u32 BE)
//! [9]     '\n'
//! [10..]  payload[1..]
//! ```
//!
//! Continuation frames carry `'?'` followed by 63 raw bytes.
//!
//! The host encoder drops the first payload byte and puts the separator in
//! its slot. The firmware reads the declared length starting at byte 9, so
//! the decoder here does the same: device messages decode byte-exact, and a
//! host-encoded payload decodes as `'\n' ++ payload[1..]`. This matches the
//! firmware the driver talks to and must not be changed without confirming
//! the firmware side first.

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use super::constants::{
    FIRST_PAYLOAD_OFFSET, FRAME_BODY_SIZE, FRAME_MARKER, FRAME_SIZE, HEADER_SEPARATOR,
    MAX_PAYLOAD_RESERVE, MESSAGE_HEADER_SIZE, MESSAGE_MAGIC,
};
use super::envelope::Envelope;
use super::kind::MessageKind;
use crate::error::{DeviceError, Result};
use crate::transport::DeviceTransport;

/// One transport frame.
pub type Frame = [u8; FRAME_SIZE];

/// Encode a message into host frames.
pub fn encode(kind: MessageKind, payload: &[u8]) -> Result<Vec<Frame>> {
    let len = declared_len(payload.len())?;

    let mut header = [0u8; MESSAGE_HEADER_SIZE];
    header[0..2].copy_from_slice(&MESSAGE_MAGIC);
    BigEndian::write_u16(&mut header[2..4], kind.to_u16());
    BigEndian::write_u32(&mut header[4..8], len);
    header[8] = HEADER_SEPARATOR;

    let body = payload.get(1..).unwrap_or_default();
    let mut message = Vec::with_capacity(header.len() + body.len());
    message.extend_from_slice(&header);
    message.extend_from_slice(body);

    Ok(chunk(&message))
}

/// Encode an envelope into host frames.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<Frame>> {
    encode(envelope.kind(), envelope.payload())
}

/// Encode a message the way the firmware does: the payload follows the
/// length field directly, nothing is dropped. Used to script device replies.
pub fn encode_device(kind: MessageKind, payload: &[u8]) -> Result<Vec<Frame>> {
    let len = declared_len(payload.len())?;

    let mut message = Vec::with_capacity(MESSAGE_HEADER_SIZE - 1 + payload.len());
    message.extend_from_slice(&MESSAGE_MAGIC);
    message.extend_from_slice(&kind.to_u16().to_be_bytes());
    message.extend_from_slice(&len.to_be_bytes());
    message.extend_from_slice(payload);

    Ok(chunk(&message))
}

/// Length field value for a payload of `len` bytes.
fn declared_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| DeviceError::PayloadTooLarge { len })
}

/// Number of frames `encode` produces for a payload of `len` bytes.
pub fn frame_count(len: usize) -> usize {
    let body = MESSAGE_HEADER_SIZE + len.saturating_sub(1);
    body.div_ceil(FRAME_BODY_SIZE)
}

fn chunk(message: &[u8]) -> Vec<Frame> {
    message
        .chunks(FRAME_BODY_SIZE)
        .map(|part| {
            let mut frame = [0u8; FRAME_SIZE];
            frame[0] = FRAME_MARKER;
            frame[1..1 + part.len()].copy_from_slice(part);
            frame
        })
        .collect()
}

/// Incremental decoder: feed frames, get an envelope once the declared
/// length has been assembled.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    kind: MessageKind,
    expected: usize,
    payload: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes still missing for the message in progress.
    pub fn remaining(&self) -> Option<usize> {
        self.pending
            .as_ref()
            .map(|p| p.expected - p.payload.len())
    }

    /// Payload bytes received so far for the message in progress.
    pub fn received(&self) -> usize {
        self.pending.as_ref().map_or(0, |p| p.payload.len())
    }

    /// Push one frame.
    pub fn push(&mut self, frame: &[u8]) -> Result<Option<Envelope>> {
        if frame.len() != FRAME_SIZE {
            return Err(DeviceError::MalformedFrame(format!(
                "expected {} bytes, got {}",
                FRAME_SIZE,
                frame.len()
            )));
        }
        if frame[0] != FRAME_MARKER {
            return Err(DeviceError::MalformedFrame(format!(
                "bad frame marker 0x{:02X}",
                frame[0]
            )));
        }

        let pending = match self.pending.take() {
            Some(mut pending) => {
                let take = (pending.expected - pending.payload.len()).min(FRAME_BODY_SIZE);
                pending.payload.extend_from_slice(&frame[1..1 + take]);
                pending
            }
            None => Self::start(frame)?,
        };

        if pending.payload.len() == pending.expected {
            trace!(kind = %pending.kind, len = pending.expected, "Message assembled");
            return Ok(Some(Envelope::new(pending.kind, pending.payload)));
        }
        self.pending = Some(pending);
        Ok(None)
    }

    fn start(frame: &[u8]) -> Result<Pending> {
        if frame[1..3] != MESSAGE_MAGIC {
            return Err(DeviceError::MalformedFrame(format!(
                "missing magic, got {:02X} {:02X}",
                frame[1], frame[2]
            )));
        }
        let raw_kind = BigEndian::read_u16(&frame[3..5]);
        let kind = MessageKind::from_u16(raw_kind).ok_or(DeviceError::UnknownMessageKind(raw_kind))?;
        let expected = BigEndian::read_u32(&frame[5..9]) as usize;

        // The length comes off the wire; grow past the cap only as frames arrive.
        let take = expected.min(FRAME_SIZE - FIRST_PAYLOAD_OFFSET);
        let mut payload = Vec::with_capacity(expected.min(MAX_PAYLOAD_RESERVE));
        payload.extend_from_slice(&frame[FIRST_PAYLOAD_OFFSET..FIRST_PAYLOAD_OFFSET + take]);

        Ok(Pending {
            kind,
            expected,
            payload,
        })
    }
}

/// Encode an envelope and write all of its frames.
pub fn write_envelope<T: DeviceTransport + ?Sized>(transport: &T, envelope: &Envelope) -> Result<()> {
    for frame in encode_envelope(envelope)? {
        transport.write(&frame)?;
    }
    Ok(())
}

/// Read frames until one complete envelope is assembled.
pub fn read_envelope<T: DeviceTransport + ?Sized>(transport: &T) -> Result<Envelope> {
    let mut decoder = FrameDecoder::new();
    let mut frame = [0u8; FRAME_SIZE];
    loop {
        let n = read_frame(transport, &mut frame)?;
        if n == 0 {
            return Err(DeviceError::TransportClosed {
                received: decoder.received(),
                expected: decoder.remaining().unwrap_or(0) + decoder.received(),
            });
        }
        if let Some(envelope) = decoder.push(&frame)? {
            return Ok(envelope);
        }
    }
}

/// Fill one frame, tolerating short reads. Returns 0 on end of stream.
fn read_frame<T: DeviceTransport + ?Sized>(transport: &T, frame: &mut Frame) -> Result<usize> {
    let mut filled = 0;
    while filled < FRAME_SIZE {
        let n = transport.read(&mut frame[filled..])?;
        if n == 0 {
            return Ok(0);
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(frames: &[Frame]) -> Result<Option<Envelope>> {
        let mut decoder = FrameDecoder::new();
        let mut out = None;
        for frame in frames {
            out = decoder.push(frame)?;
        }
        Ok(out)
    }

    #[test]
    fn test_empty_payload_single_frame() {
        let frames = encode(MessageKind::ButtonAck, &[]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..10], b"?##\x00\x1b\x00\x00\x00\x00\n");
        assert!(frames[0][10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_first_payload_byte_dropped() {
        let frames = encode(MessageKind::PinMatrixAck, &[0x0a, 0x01, 0x02]).unwrap();
        assert_eq!(frames.len(), 1);
        // Declared length keeps the full payload size.
        assert_eq!(&frames[0][5..9], &[0, 0, 0, 3]);
        assert_eq!(frames[0][9], b'\n');
        assert_eq!(&frames[0][10..12], &[0x01, 0x02]);
        assert_eq!(frames[0][12], 0);
    }

    #[test]
    fn test_frame_count_law() {
        for len in [0usize, 1, 2, 54, 55, 56, 117, 118, 119, 1000, 65535] {
            let payload = vec![0x0a; len];
            let frames = encode(MessageKind::TxAck, &payload).unwrap();
            let expected = if len == 0 {
                1
            } else {
                (9 + len - 1).div_ceil(63)
            };
            assert_eq!(frames.len(), expected, "len {}", len);
            assert_eq!(frame_count(len), expected);
            assert!(frames.iter().all(|f| f[0] == b'?'));
        }
    }

    #[test]
    fn test_roundtrip_with_separator_convention() {
        for len in [0usize, 1, 54, 55, 63, 64, 200, 4096, 65535] {
            let mut payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            if let Some(first) = payload.first_mut() {
                *first = b'\n';
            }
            let frames = encode(MessageKind::FirmwareUpload, &payload).unwrap();
            let env = decode_all(&frames).unwrap().expect("complete message");
            assert_eq!(env.kind(), MessageKind::FirmwareUpload);
            assert_eq!(env.payload(), payload.as_slice());
        }
    }

    #[test]
    fn test_roundtrip_replaces_first_byte() {
        let frames = encode(MessageKind::SkycoinAddress, &[0x08, 0x02, 0x10]).unwrap();
        let env = decode_all(&frames).unwrap().unwrap();
        assert_eq!(env.payload(), &[b'\n', 0x02, 0x10]);
    }

    #[test]
    fn test_device_encoding_decodes_exactly() {
        let payload: Vec<u8> = (0..300u16).map(|i| (i * 7) as u8).collect();
        let frames = encode_device(MessageKind::Features, &payload).unwrap();
        let env = decode_all(&frames).unwrap().unwrap();
        assert_eq!(env.payload(), payload.as_slice());
    }

    #[test]
    fn test_missing_magic_is_malformed() {
        let mut frame = [0u8; FRAME_SIZE];
        frame[0] = b'?';
        frame[1] = b'#';
        frame[2] = b'!';
        let err = FrameDecoder::new().push(&frame).unwrap_err();
        assert!(matches!(err, DeviceError::MalformedFrame(_)));
    }

    #[test]
    fn test_bad_marker_is_malformed() {
        let mut frames = encode(MessageKind::Success, &[]).unwrap();
        frames[0][0] = b'!';
        assert!(matches!(
            decode_all(&frames),
            Err(DeviceError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut frames = encode(MessageKind::Success, &[]).unwrap();
        frames[0][3] = 0x7F;
        frames[0][4] = 0xFF;
        assert!(matches!(
            decode_all(&frames),
            Err(DeviceError::UnknownMessageKind(0x7FFF))
        ));
    }

    #[test]
    fn test_partial_message_waits_for_more() {
        let frames = encode_device(MessageKind::Entropy, &[7u8; 100]).unwrap();
        assert_eq!(frames.len(), 2);
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&frames[0]).unwrap().is_none());
        assert_eq!(decoder.remaining(), Some(100 - 55));
        let env = decoder.push(&frames[1]).unwrap().unwrap();
        assert_eq!(env.payload().len(), 100);
    }

    #[test]
    fn test_huge_declared_length_reserves_bounded_buffer() {
        let mut frame = [0u8; FRAME_SIZE];
        frame[..5].copy_from_slice(b"?##\x00\x02");
        frame[5..9].copy_from_slice(&u32::MAX.to_be_bytes());

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&frame).unwrap().is_none());
        let taken = FRAME_SIZE - FIRST_PAYLOAD_OFFSET;
        assert_eq!(decoder.remaining(), Some(u32::MAX as usize - taken));
        assert_eq!(decoder.received(), taken);

        let pending = decoder.pending.as_ref().unwrap();
        assert!(pending.payload.capacity() <= MAX_PAYLOAD_RESERVE);
    }

    #[test]
    fn test_large_message_grows_past_reserve() {
        let payload: Vec<u8> = (0..MAX_PAYLOAD_RESERVE * 3).map(|i| (i % 253) as u8).collect();
        let frames = encode_device(MessageKind::Entropy, &payload).unwrap();
        let env = decode_all(&frames).unwrap().unwrap();
        assert_eq!(env.payload(), payload.as_slice());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_length_field_overflow_rejected() {
        let len = u32::MAX as usize + 1;
        assert!(matches!(
            declared_len(len),
            Err(DeviceError::PayloadTooLarge { len: l }) if l == len
        ));
        assert_eq!(declared_len(u32::MAX as usize).unwrap(), u32::MAX);
    }
}
