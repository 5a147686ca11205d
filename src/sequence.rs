//! Sequence numbers and ACK bookkeeping.
//!
//! Every data frame carries a 4-bit sequence number in the high nibble of its sequence byte
//! and, in the low nibble, the last sequence number its sender has accepted from the peer.
//! Sequence numbers run 1..=15 and wrap back to 1; 0 means "nothing" (ACK-only frames, or no
//! message seen yet).

/// A non-zero 4-bit SPITFP sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    /// Sequence number used for the first message after start-up.
    pub const FIRST: SequenceNumber = SequenceNumber(1);

    /// Largest sequence number before wrapping.
    pub const LAST: SequenceNumber = SequenceNumber(15);

    /// Creates a sequence number, `None` for 0 or anything wider than a nibble.
    pub const fn new(value: u8) -> Option<Self> {
        if value == 0 || value > Self::LAST.0 {
            None
        } else {
            Some(SequenceNumber(value))
        }
    }

    /// Decodes a nibble where 0 stands for "none".
    pub const fn from_nibble(nibble: u8) -> Option<Self> {
        Self::new(nibble & 0x0f)
    }

    /// Encodes an optional sequence number as a nibble.
    pub const fn to_nibble(value: Option<Self>) -> u8 {
        match value {
            Some(SequenceNumber(v)) => v,
            None => 0,
        }
    }

    /// Raw value, 1..=15.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// The following sequence number, wrapping 15 back to 1.
    pub const fn next(self) -> Self {
        if self.0 >= Self::LAST.0 {
            Self::FIRST
        } else {
            SequenceNumber(self.0 + 1)
        }
    }
}

/// How an inbound frame relates to what has already been accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Inbound {
    /// The frame carries no message.
    AckOnly,
    /// Retransmission of the message accepted last; acknowledge again, do not deliver.
    Duplicate,
    /// A message not seen before.
    New {
        /// Its sequence number.
        sequence: SequenceNumber,
        /// Whether this is the number that follows the last accepted one.
        in_order: bool,
    },
}

/// Outbound and inbound sequence state of one link.
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    current: SequenceNumber,
    last_seen: Option<SequenceNumber>,
    ack_pending: bool,
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceTracker {
    /// Fresh state: next outbound is [`SequenceNumber::FIRST`], nothing seen yet.
    pub const fn new() -> Self {
        Self {
            current: SequenceNumber::FIRST,
            last_seen: None,
            ack_pending: false,
        }
    }

    /// Sequence number the next (or currently in-flight) outbound message uses.
    pub fn current(&self) -> SequenceNumber {
        self.current
    }

    /// Moves on to the next outbound number. Only called once the in-flight message is ACKed.
    pub fn advance(&mut self) {
        self.current = self.current.next();
    }

    /// Last inbound sequence number accepted, i.e. the ACK this side owes or has given.
    pub fn last_seen(&self) -> Option<SequenceNumber> {
        self.last_seen
    }

    /// Classifies the sequence number of an inbound frame.
    pub fn classify(&self, sequence: Option<SequenceNumber>) -> Inbound {
        match sequence {
            None => Inbound::AckOnly,
            Some(seq) if Some(seq) == self.last_seen => Inbound::Duplicate,
            Some(seq) => Inbound::New {
                sequence: seq,
                in_order: match self.last_seen {
                    Some(last) => last.next() == seq,
                    None => true,
                },
            },
        }
    }

    /// Records an accepted message; an ACK for it is now owed.
    pub fn accept(&mut self, sequence: SequenceNumber) {
        self.last_seen = Some(sequence);
        self.ack_pending = true;
    }

    /// Marks that the peer needs to see our ACK again (it retransmitted).
    pub fn request_ack(&mut self) {
        self.ack_pending = true;
    }

    /// `true` if an ACK is owed and has not been put on the wire yet.
    pub fn ack_pending(&self) -> bool {
        self.ack_pending
    }

    /// Hands out the owed ACK, if any. The caller puts it on the wire.
    pub fn take_ack(&mut self) -> Option<Option<SequenceNumber>> {
        if core::mem::take(&mut self.ack_pending) {
            Some(self.last_seen)
        } else {
            None
        }
    }
}
