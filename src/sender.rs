//! Send engine: the single outbound frame and the ACK-only frame.
//!
//! At most one message frame is in flight. It is shifted out over one or more transfers,
//! then waits for the peer's ACK. If no ACK arrives within the timeout it is shifted out
//! again with the same sequence number; there is no retry limit, the caller upstream is
//! blocked on the slot and the link is expected to come back.
//!
//! An ACK-only frame is queued separately and slotted in between message frames, never
//! inside one.

use crate::checksum::frame_checksum;
use crate::consts::{SPITFP_ACK_LENGTH, SPITFP_MAX_FRAME_LENGTH_USIZE};
use crate::error::SendError;
use crate::frame::{Frame, encode_into, sequence_byte};
use crate::sequence::SequenceNumber;

/// State of the message frame in the send engine.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SendState {
    /// Nothing in flight, a new message can be submitted.
    #[default]
    Idle,
    /// The frame is being shifted out.
    Transmitting,
    /// The frame is out, waiting for the peer's ACK.
    AwaitingAck,
}

/// Holds the outbound frame and drives its (re)transmission.
#[derive(Debug, Clone)]
pub struct SendEngine {
    state: SendState,
    buffer: [u8; SPITFP_MAX_FRAME_LENGTH_USIZE],
    length: usize,
    index: usize,
    sequence: Option<SequenceNumber>,
    acknowledged: bool,
    last_send_started: u32,
    timeout_ms: u32,
    retransmissions: u32,
    ack_frame: [u8; SPITFP_ACK_LENGTH as usize],
    ack_length: usize,
    ack_index: usize,
    pending_ack: Option<Option<SequenceNumber>>,
}

impl SendEngine {
    /// Creates an idle engine that retransmits after `timeout_ms`.
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            state: SendState::Idle,
            buffer: [0; SPITFP_MAX_FRAME_LENGTH_USIZE],
            length: 0,
            index: 0,
            sequence: None,
            acknowledged: false,
            last_send_started: 0,
            timeout_ms,
            retransmissions: 0,
            ack_frame: [0; SPITFP_ACK_LENGTH as usize],
            ack_length: 0,
            ack_index: 0,
            pending_ack: None,
        }
    }

    /// Current state of the message frame.
    pub fn state(&self) -> SendState {
        self.state
    }

    /// `true` if a new message can be submitted.
    pub fn is_idle(&self) -> bool {
        self.state == SendState::Idle
    }

    /// Sequence number of the message frame awaiting its ACK.
    pub fn in_flight(&self) -> Option<SequenceNumber> {
        match self.state {
            SendState::Idle => None,
            _ => self.sequence,
        }
    }

    /// Number of timeouts that led to a retransmission.
    pub fn retransmissions(&self) -> u32 {
        self.retransmissions
    }

    /// Retransmission timeout in milliseconds.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Frames `payload` as the next outbound message.
    ///
    /// Fails with [`SendError::Busy`] while the previous message is not acknowledged.
    pub fn submit(
        &mut self,
        payload: &[u8],
        sequence: SequenceNumber,
        ack: Option<SequenceNumber>,
    ) -> Result<(), SendError> {
        if !self.is_idle() {
            return Err(SendError::Busy);
        }
        if payload.is_empty() {
            return Err(SendError::InvalidLength(0));
        }
        self.length = encode_into(payload, Some(sequence), ack, &mut self.buffer)
            .map_err(|_| SendError::InvalidLength(payload.len()))?;
        self.index = 0;
        self.sequence = Some(sequence);
        self.acknowledged = false;
        self.state = SendState::Transmitting;
        Ok(())
    }

    /// Rewrites the ACK nibble of the message frame if it has not started shifting out yet.
    ///
    /// Returns `true` if the ACK now travels with the message.
    pub fn refresh_ack(&mut self, ack: Option<SequenceNumber>) -> bool {
        if self.state != SendState::Transmitting || self.index != 0 {
            return false;
        }
        self.buffer[1] = sequence_byte(self.sequence, ack);
        self.buffer[self.length - 1] = frame_checksum(&self.buffer[..self.length - 1]);
        true
    }

    /// Queues an ACK-only frame. An ACK that has not started shifting out is replaced.
    pub fn queue_ack(&mut self, ack: Option<SequenceNumber>) {
        if self.ack_index != 0 {
            // The partially sent one finishes first.
            self.pending_ack = Some(ack);
            return;
        }
        self.ack_length = Frame::ack_only(ack).encode(&mut self.ack_frame).unwrap_or(0);
    }

    /// `true` while an ACK-only frame waits to be shifted out.
    pub fn ack_queued(&self) -> bool {
        self.ack_length != 0
    }

    /// Handles the ACK nibble of an inbound frame.
    ///
    /// Returns `true` if it released the message in flight.
    pub fn acknowledge(&mut self, ack: Option<SequenceNumber>) -> bool {
        if ack.is_none() || self.acknowledged || ack != self.in_flight() {
            return false;
        }
        match self.state {
            SendState::Transmitting if self.index != 0 => {
                // Finish shifting out what is on the wire, then go idle.
                self.acknowledged = true;
            }
            _ => self.release(),
        }
        true
    }

    /// Re-arms the message frame for retransmission once the timeout expired.
    ///
    /// The ACK nibble is brought up to date with `ack`. Returns `true` on retransmission.
    pub fn poll_timeout(&mut self, now: u32, ack: Option<SequenceNumber>) -> bool {
        if self.state != SendState::AwaitingAck
            || now.wrapping_sub(self.last_send_started) < self.timeout_ms
        {
            return false;
        }
        self.index = 0;
        self.state = SendState::Transmitting;
        self.retransmissions = self.retransmissions.wrapping_add(1);
        let _ = self.refresh_ack(ack);
        true
    }

    /// `true` while a frame is partially shifted out. The line rate must not change then.
    pub fn is_mid_frame(&self) -> bool {
        (self.state == SendState::Transmitting && self.index != 0) || self.ack_index != 0
    }

    /// Fills `out` with the next bytes to clock onto the wire and pads the rest with zeros.
    ///
    /// Returns the number of frame bytes written (the rest is padding).
    pub fn fill(&mut self, now: u32, out: &mut [u8]) -> usize {
        let mut n = 0;

        // A partially sent ACK goes first so that frames never interleave.
        if self.ack_index != 0 {
            n += self.fill_ack(&mut out[n..]);
        }

        if self.state == SendState::Transmitting && self.ack_index == 0 {
            if self.index == 0 {
                self.last_send_started = now;
            }
            let take = (self.length - self.index).min(out.len() - n);
            out[n..n + take].copy_from_slice(&self.buffer[self.index..self.index + take]);
            self.index += take;
            n += take;
            if self.index == self.length {
                if self.acknowledged {
                    self.release();
                } else {
                    self.state = SendState::AwaitingAck;
                }
            }
        }

        if self.state != SendState::Transmitting && self.ack_length != 0 && self.ack_index == 0 {
            n += self.fill_ack(&mut out[n..]);
        }

        out[n..].fill(0);
        n
    }

    fn fill_ack(&mut self, out: &mut [u8]) -> usize {
        let take = (self.ack_length - self.ack_index).min(out.len());
        out[..take].copy_from_slice(&self.ack_frame[self.ack_index..self.ack_index + take]);
        self.ack_index += take;
        if self.ack_index == self.ack_length {
            self.ack_index = 0;
            self.ack_length = 0;
            if let Some(ack) = self.pending_ack.take() {
                self.queue_ack(ack);
            }
        }
        take
    }

    fn release(&mut self) {
        self.state = SendState::Idle;
        self.sequence = None;
        self.acknowledged = false;
        self.index = 0;
        self.length = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::decode;

    fn seq(n: u8) -> SequenceNumber {
        SequenceNumber::new(n).unwrap()
    }

    #[test]
    fn test_second_submit_is_busy_until_acked() {
        let mut tx = SendEngine::new(5);
        tx.submit(&[1; 8], seq(1), None).unwrap();
        assert_eq!(tx.submit(&[2; 8], seq(2), None), Err(SendError::Busy));

        let mut out = [0u8; 32];
        assert_eq!(tx.fill(0, &mut out), 11);
        assert_eq!(tx.state(), SendState::AwaitingAck);
        assert_eq!(tx.in_flight(), Some(seq(1)));

        assert!(!tx.acknowledge(Some(seq(2))));
        assert!(!tx.acknowledge(None));
        assert!(tx.acknowledge(Some(seq(1))));
        assert!(tx.is_idle());
        assert!(tx.submit(&[2; 8], seq(2), None).is_ok());
    }

    #[test]
    fn test_rejects_unframeable_payloads() {
        let mut tx = SendEngine::new(5);
        assert_eq!(tx.submit(&[], seq(1), None), Err(SendError::InvalidLength(0)));
        assert_eq!(
            tx.submit(&[0; 81], seq(1), None),
            Err(SendError::InvalidLength(81))
        );
        assert!(tx.is_idle());
    }

    #[test]
    fn test_retransmits_after_timeout_with_same_sequence() {
        let mut tx = SendEngine::new(5);
        tx.submit(&[7; 8], seq(3), None).unwrap();
        let mut first = [0u8; 32];
        assert_eq!(tx.fill(100, &mut first), 11);

        assert!(!tx.poll_timeout(104, None));
        assert!(tx.poll_timeout(105, Some(seq(9))));
        assert_eq!(tx.retransmissions(), 1);

        let mut second = [0u8; 32];
        assert_eq!(tx.fill(105, &mut second), 11);
        let frame = decode(&second[..11]).unwrap();
        assert_eq!(frame.sequence, Some(seq(3)));
        assert_eq!(frame.ack, Some(seq(9)));
        assert_eq!(frame.payload.as_slice(), &[7; 8]);
    }

    #[test]
    fn test_ack_only_frame_is_padded() {
        let mut tx = SendEngine::new(5);
        tx.queue_ack(Some(seq(4)));
        assert!(tx.ack_queued());

        let mut out = [0xffu8; 32];
        assert_eq!(tx.fill(0, &mut out), 3);
        let frame = decode(&out[..3]).unwrap();
        assert!(frame.is_ack_only());
        assert_eq!(frame.ack, Some(seq(4)));
        assert!(out[3..].iter().all(|&b| b == 0));
        assert!(!tx.ack_queued());
    }

    #[test]
    fn test_long_frame_spans_transfers() {
        let payload = [0x5a; 80];
        let mut tx = SendEngine::new(5);
        tx.submit(&payload, seq(1), None).unwrap();

        let mut wire = Vec::new();
        for round in 0..3 {
            let mut out = [0u8; 32];
            let n = tx.fill(0, &mut out);
            wire.extend_from_slice(&out[..n]);
            assert_eq!(tx.is_mid_frame(), round < 2);
        }

        assert_eq!(wire.len(), 83);
        assert_eq!(tx.state(), SendState::AwaitingAck);
        assert_eq!(decode(&wire).unwrap().payload.as_slice(), &payload);
    }

    #[test]
    fn test_ack_waits_for_message_frame_to_finish() {
        let mut tx = SendEngine::new(5);
        tx.submit(&[0x33; 80], seq(1), None).unwrap();
        let mut out = [0u8; 32];
        assert_eq!(tx.fill(0, &mut out), 32);

        tx.queue_ack(Some(seq(2)));
        assert_eq!(tx.fill(0, &mut out), 32);
        assert!(tx.ack_queued());

        // 19 message bytes, then the ACK.
        assert_eq!(tx.fill(0, &mut out), 22);
        let ack = decode(&out[19..22]).unwrap();
        assert_eq!(ack.ack, Some(seq(2)));
        assert!(!tx.ack_queued());
    }

    #[test]
    fn test_split_ack_finishes_before_replacement() {
        let mut tx = SendEngine::new(5);
        tx.queue_ack(Some(seq(1)));
        let mut short = [0u8; 2];
        assert_eq!(tx.fill(0, &mut short), 2);
        assert!(tx.is_mid_frame());

        tx.queue_ack(Some(seq(2)));
        let mut out = [0u8; 32];
        assert_eq!(tx.fill(0, &mut out), 4);

        let mut first = [0u8; 3];
        first[..2].copy_from_slice(&short);
        first[2] = out[0];
        assert_eq!(decode(&first).unwrap().ack, Some(seq(1)));
        assert_eq!(decode(&out[1..4]).unwrap().ack, Some(seq(2)));
    }

    #[test]
    fn test_ack_during_transmission_releases_after_last_byte() {
        let mut tx = SendEngine::new(5);
        tx.submit(&[0x44; 80], seq(6), None).unwrap();
        let mut out = [0u8; 32];
        let _ = tx.fill(0, &mut out);

        assert!(tx.acknowledge(Some(seq(6))));
        assert_eq!(tx.state(), SendState::Transmitting);
        assert!(!tx.acknowledge(Some(seq(6))));

        let _ = tx.fill(0, &mut out);
        let _ = tx.fill(0, &mut out);
        assert!(tx.is_idle());
        assert!(!tx.poll_timeout(1000, None));
    }
}
