//! SPITFP frame encoding and decoding.
//!
//! Frame format:
//! - LENGTH (1 byte): total frame length, overhead included (3, or 11..=83)
//! - SEQUENCE (1 byte): high nibble is the sender's sequence number, low nibble the last
//!   sequence number the sender accepted from its peer
//! - PAYLOAD (0 or 8..=80 bytes): one TFP message, empty for an ACK-only frame
//! - CHECKSUM (1 byte): Pearson hash of LENGTH, SEQUENCE and PAYLOAD
//!
//! The codec is stateless; the receive path hands it exactly one candidate frame at a time.

use heapless::Vec;

use crate::checksum::frame_checksum;
use crate::consts::{
    SPITFP_ACK_LENGTH, SPITFP_MAX_FRAME_LENGTH, SPITFP_MAX_FRAME_LENGTH_USIZE,
    SPITFP_MIN_MESSAGE_FRAME_LENGTH, SPITFP_PROTOCOL_OVERHEAD, TFP_MESSAGE_MAX_LENGTH,
    TFP_MESSAGE_MAX_LENGTH_USIZE, TFP_MESSAGE_MIN_LENGTH,
};
use crate::error::FrameError;
use crate::sequence::SequenceNumber;

/// `true` if `length` can appear in the length byte of a frame.
pub const fn is_valid_frame_length(length: u8) -> bool {
    length == SPITFP_ACK_LENGTH
        || (length >= SPITFP_MIN_MESSAGE_FRAME_LENGTH && length <= SPITFP_MAX_FRAME_LENGTH)
}

/// `true` if a payload of `length` bytes can be framed.
pub const fn is_valid_payload_length(length: usize) -> bool {
    length == 0
        || (length >= TFP_MESSAGE_MIN_LENGTH as usize && length <= TFP_MESSAGE_MAX_LENGTH as usize)
}

/// Packs sequence and ACK into the sequence byte.
pub const fn sequence_byte(sequence: Option<SequenceNumber>, ack: Option<SequenceNumber>) -> u8 {
    (SequenceNumber::to_nibble(sequence) << 4) | SequenceNumber::to_nibble(ack)
}

/// A decoded or to-be-encoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number of the carried message, `None` for ACK-only frames.
    pub sequence: Option<SequenceNumber>,
    /// Last sequence number the sender accepted from its peer.
    pub ack: Option<SequenceNumber>,
    /// The TFP message, empty for ACK-only frames.
    pub payload: Vec<u8, TFP_MESSAGE_MAX_LENGTH_USIZE>,
}

impl Frame {
    /// Creates a frame carrying `payload`.
    pub fn message(
        sequence: SequenceNumber,
        ack: Option<SequenceNumber>,
        payload: &[u8],
    ) -> Result<Self, FrameError> {
        if payload.is_empty() || !is_valid_payload_length(payload.len()) {
            return Err(FrameError::PayloadLength(payload.len()));
        }
        let payload =
            Vec::from_slice(payload).map_err(|_| FrameError::PayloadLength(payload.len()))?;
        Ok(Self {
            sequence: Some(sequence),
            ack,
            payload,
        })
    }

    /// Creates an ACK-only frame.
    pub fn ack_only(ack: Option<SequenceNumber>) -> Self {
        Self {
            sequence: None,
            ack,
            payload: Vec::new(),
        }
    }

    /// `true` if the frame carries no message.
    pub fn is_ack_only(&self) -> bool {
        self.payload.is_empty()
    }

    /// Number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + SPITFP_PROTOCOL_OVERHEAD as usize
    }

    /// Encodes this frame into `buffer` and returns the number of bytes written.
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        encode_into(&self.payload, self.sequence, self.ack, buffer)
    }

    /// Encodes this frame into a heapless Vec.
    pub fn encode_to_vec(&self) -> Result<Vec<u8, SPITFP_MAX_FRAME_LENGTH_USIZE>, FrameError> {
        let mut buffer = [0u8; SPITFP_MAX_FRAME_LENGTH_USIZE];
        let len = self.encode(&mut buffer)?;
        Vec::from_slice(&buffer[..len]).map_err(|_| FrameError::BufferTooSmall)
    }
}

/// Encodes `payload` with the given sequence and ACK nibbles into `buffer`.
///
/// Returns the number of bytes written.
pub fn encode_into(
    payload: &[u8],
    sequence: Option<SequenceNumber>,
    ack: Option<SequenceNumber>,
    buffer: &mut [u8],
) -> Result<usize, FrameError> {
    if !is_valid_payload_length(payload.len()) || payload.is_empty() != sequence.is_none() {
        return Err(FrameError::PayloadLength(payload.len()));
    }
    let frame_len = payload.len() + SPITFP_PROTOCOL_OVERHEAD as usize;
    if buffer.len() < frame_len {
        return Err(FrameError::BufferTooSmall);
    }

    buffer[0] = frame_len as u8;
    buffer[1] = sequence_byte(sequence, ack);
    buffer[2..2 + payload.len()].copy_from_slice(payload);
    buffer[frame_len - 1] = frame_checksum(&buffer[..frame_len - 1]);

    Ok(frame_len)
}

/// Encodes a message frame, the wire form of `(payload, sequence, ack)`.
pub fn encode(
    payload: &[u8],
    sequence: SequenceNumber,
    ack: Option<SequenceNumber>,
) -> Result<Vec<u8, SPITFP_MAX_FRAME_LENGTH_USIZE>, FrameError> {
    Frame::message(sequence, ack, payload)?.encode_to_vec()
}

/// Decodes exactly one frame from `raw`.
///
/// `raw` must hold the whole frame and nothing else: its length has to agree with the
/// length byte.
pub fn decode(raw: &[u8]) -> Result<Frame, FrameError> {
    let Some(&length) = raw.first() else {
        return Err(FrameError::Length(0));
    };
    if !is_valid_frame_length(length) || raw.len() != length as usize {
        return Err(FrameError::Length(length));
    }

    let (body, checksum) = raw.split_at(raw.len() - 1);
    let calculated = frame_checksum(body);
    if calculated != checksum[0] {
        return Err(FrameError::Checksum {
            calculated,
            received: checksum[0],
        });
    }

    let sequence = SequenceNumber::from_nibble(body[1] >> 4);
    let ack = SequenceNumber::from_nibble(body[1]);
    let payload = &body[2..];

    // A message without sequence number, or an ACK claiming one, is malformed.
    if payload.is_empty() != sequence.is_none() {
        return Err(FrameError::Length(length));
    }

    Ok(Frame {
        sequence,
        ack,
        payload: Vec::from_slice(payload).map_err(|_| FrameError::Length(length))?,
    })
}

/// The maximum payload an encoded frame can carry.
pub const MAX_PAYLOAD_LENGTH: u8 = TFP_MESSAGE_MAX_LENGTH;
