//! Receive resynchroniser.
//!
//! Raw bytes read from the wire are appended to a fixed ring. [`Receiver::poll`] then looks at
//! the byte at the read cursor as the length of a candidate frame:
//!
//! - `0` is idle filler from the peer and only counts towards the zero run,
//! - an impossible length is a frame error, the byte is dropped,
//! - a possible length waits until that many bytes are buffered and is then checked; on a
//!   checksum mismatch exactly one byte is dropped and the scan starts over.
//!
//! Dropping a single byte at a time lets the scan lock back onto frame boundaries after bit
//! slips or lost bytes without any further state.

use crate::consts::{
    SPITFP_ACK_LENGTH, SPITFP_IDLE_ZERO_COUNT, SPITFP_MAX_FRAME_LENGTH_USIZE,
    SPITFP_RECEIVE_BUFFER_LENGTH,
};
use crate::error::FrameError;
use crate::frame::{Frame, decode, is_valid_frame_length};
use crate::ringbuffer::RingBuffer;
use crate::stats::ErrorCounters;

/// Where the scan currently stands.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ScanState {
    /// Looking for a byte that could be the length of a frame.
    #[default]
    SeekingFrameStart,
    /// A plausible length was found; waiting for the rest of the frame.
    Accumulating {
        /// Total length of the candidate frame.
        expected: u8,
    },
    /// The last poll produced a frame.
    FrameComplete,
}

/// Ring-buffered frame scanner for the receive direction.
#[derive(Debug, Clone)]
pub struct Receiver {
    ring: RingBuffer<SPITFP_RECEIVE_BUFFER_LENGTH>,
    scratch: [u8; SPITFP_MAX_FRAME_LENGTH_USIZE],
    state: ScanState,
    zero_count: u32,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    /// Creates a receiver with an empty ring.
    pub fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
            scratch: [0; SPITFP_MAX_FRAME_LENGTH_USIZE],
            state: ScanState::SeekingFrameStart,
            zero_count: 0,
        }
    }

    /// Appends freshly received bytes.
    ///
    /// If the ring runs full the oldest unread bytes are dropped to make room and the overflow
    /// counter is incremented once for this call. Never blocks.
    pub fn feed(&mut self, bytes: &[u8], errors: &mut ErrorCounters) {
        let mut overflowed = false;
        for &byte in bytes {
            if self.ring.is_full() {
                let _ = self.ring.discard(1);
                overflowed = true;
            }
            // Cannot fail, one slot was just made free.
            let _ = self.ring.push(byte);
        }
        if overflowed {
            errors.count_overflow();
            self.state = ScanState::SeekingFrameStart;
            warn!("spitfp: receive buffer overflow");
        }
    }

    /// Scans the buffered bytes and returns the next valid frame, if any.
    ///
    /// Corrupt data in front of the frame is dropped and counted in `errors`.
    pub fn poll(&mut self, errors: &mut ErrorCounters) -> Option<Frame> {
        loop {
            let Some(length) = self.ring.peek(0) else {
                self.state = ScanState::SeekingFrameStart;
                return None;
            };

            if length == 0 {
                self.zero_count = self.zero_count.saturating_add(1);
                let _ = self.ring.discard(1);
                self.state = ScanState::SeekingFrameStart;
                continue;
            }

            if !is_valid_frame_length(length) {
                errors.count_frame();
                let _ = self.ring.discard(1);
                self.state = ScanState::SeekingFrameStart;
                trace!("spitfp: dropped byte {}, not a frame length", length);
                continue;
            }

            let candidate = &mut self.scratch[..length as usize];
            if !self.ring.copy_to(candidate) {
                self.state = ScanState::Accumulating { expected: length };
                return None;
            }

            match decode(candidate) {
                Ok(frame) => {
                    let _ = self.ring.discard(length as usize);
                    self.zero_count = 0;
                    self.state = ScanState::FrameComplete;
                    return Some(frame);
                }
                Err(err) => {
                    match err {
                        FrameError::Checksum { .. } if length == SPITFP_ACK_LENGTH => {
                            errors.count_ack_checksum()
                        }
                        FrameError::Checksum { .. } => errors.count_message_checksum(),
                        _ => errors.count_frame(),
                    }
                    let _ = self.ring.discard(1);
                    self.state = ScanState::SeekingFrameStart;
                    debug!("spitfp: candidate frame of length {} rejected", length);
                }
            }
        }
    }

    /// Current scan state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Number of bytes buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    /// Consecutive zero bytes received since the last valid frame.
    pub fn zero_count(&self) -> u32 {
        self.zero_count
    }

    /// `true` once the peer has sent nothing but zeros for a long time.
    pub fn is_peer_idle(&self) -> bool {
        self.zero_count >= SPITFP_IDLE_ZERO_COUNT
    }

    /// Forgets all buffered bytes.
    pub fn reset(&mut self) {
        self.ring.clear();
        self.state = ScanState::SeekingFrameStart;
        self.zero_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode;
    use crate::sequence::SequenceNumber;

    fn seq(n: u8) -> SequenceNumber {
        SequenceNumber::new(n).unwrap()
    }

    fn message(n: u8) -> Vec<u8> {
        let payload = [n; 8];
        encode(&payload, seq(n), None).unwrap().to_vec()
    }

    #[test]
    fn test_single_frame() {
        let mut rx = Receiver::new();
        let mut errors = ErrorCounters::default();
        rx.feed(&message(1), &mut errors);

        let frame = rx.poll(&mut errors).unwrap();
        assert_eq!(frame.sequence, Some(seq(1)));
        assert_eq!(frame.payload.as_slice(), &[1; 8]);
        assert_eq!(rx.state(), ScanState::FrameComplete);
        assert_eq!(rx.poll(&mut errors), None);
        assert_eq!(errors, ErrorCounters::default());
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut rx = Receiver::new();
        let mut errors = ErrorCounters::default();
        let bytes = message(2);

        rx.feed(&bytes[..5], &mut errors);
        assert_eq!(rx.poll(&mut errors), None);
        assert_eq!(rx.state(), ScanState::Accumulating { expected: 11 });

        rx.feed(&bytes[5..], &mut errors);
        assert!(rx.poll(&mut errors).is_some());
        assert_eq!(errors.total(), 0);
    }

    #[test]
    fn test_garbage_between_frames() {
        let mut rx = Receiver::new();
        let mut errors = ErrorCounters::default();
        let mut bytes = message(1);
        bytes.extend_from_slice(&[0xff, 0xfe, 0xfd]);
        bytes.extend_from_slice(&message(2));
        rx.feed(&bytes, &mut errors);

        assert_eq!(rx.poll(&mut errors).unwrap().sequence, Some(seq(1)));
        assert_eq!(rx.poll(&mut errors).unwrap().sequence, Some(seq(2)));
        assert_eq!(rx.poll(&mut errors), None);
        assert_eq!(errors.frame, 3);
        assert_eq!(errors.message_checksum, 0);
    }

    #[test]
    fn test_plausible_garbage_resyncs() {
        let mut rx = Receiver::new();
        let mut errors = ErrorCounters::default();
        // 0x0b looks like the length of a minimal message frame.
        let mut bytes = vec![0x0b];
        bytes.extend_from_slice(&message(5));
        bytes.extend_from_slice(&[0; 16]);
        rx.feed(&bytes, &mut errors);

        assert_eq!(rx.poll(&mut errors).unwrap().sequence, Some(seq(5)));
        assert_eq!(errors.message_checksum, 1);
    }

    #[test]
    fn test_corrupt_ack_is_counted_separately() {
        let mut rx = Receiver::new();
        let mut errors = ErrorCounters::default();
        let mut ack = Frame::ack_only(Some(seq(5))).encode_to_vec().unwrap();
        ack[2] ^= 0x40;
        rx.feed(&ack, &mut errors);
        rx.feed(&[0; 4], &mut errors);

        assert_eq!(rx.poll(&mut errors), None);
        assert_eq!(errors.ack_checksum, 1);
        assert_eq!(errors.message_checksum, 0);
        assert_eq!(rx.buffered(), 0);
    }

    #[test]
    fn test_zero_run_marks_peer_idle() {
        let mut rx = Receiver::new();
        let mut errors = ErrorCounters::default();
        rx.feed(&[0; 200], &mut errors);
        assert_eq!(rx.poll(&mut errors), None);
        assert_eq!(rx.zero_count(), 200);
        assert!(rx.is_peer_idle());
        assert_eq!(errors.total(), 0);

        rx.feed(&message(1), &mut errors);
        assert!(rx.poll(&mut errors).is_some());
        assert_eq!(rx.zero_count(), 0);
        assert!(!rx.is_peer_idle());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut rx = Receiver::new();
        let mut errors = ErrorCounters::default();
        let garbage = [0xaa; SPITFP_RECEIVE_BUFFER_LENGTH + 1];
        rx.feed(&garbage, &mut errors);

        assert!(errors.overflow >= 1);
        assert_eq!(rx.buffered(), SPITFP_RECEIVE_BUFFER_LENGTH);

        assert_eq!(rx.poll(&mut errors), None);
        assert_eq!(rx.buffered(), 0);
        assert_eq!(errors.frame, SPITFP_RECEIVE_BUFFER_LENGTH as u32);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut rx = Receiver::new();
        let mut errors = ErrorCounters::default();
        rx.feed(&message(1)[..4], &mut errors);
        let _ = rx.poll(&mut errors);
        rx.reset();
        assert_eq!(rx.buffered(), 0);
        assert_eq!(rx.state(), ScanState::SeekingFrameStart);
    }
}
