//! Link statistics and the periodic statistics callback.
//!
//! All counters only ever grow (wrapping at `u32::MAX`) and are reset only by constructing
//! a new link. They are read by the query interface in [`crate::communication`].

use crate::consts::TFP_UID_STR_MAX_LENGTH;

/// The four SPITFP error classes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ErrorCounters {
    /// ACK-only frames with a bad checksum.
    pub ack_checksum: u32,
    /// Bytes that could not start a frame (invalid length).
    pub frame: u32,
    /// Message frames with a bad checksum.
    pub message_checksum: u32,
    /// Transfers that overran the receive ring.
    pub overflow: u32,
}

impl ErrorCounters {
    /// Sum of all error classes, used to detect new errors between two observations.
    pub fn total(&self) -> u32 {
        self.ack_checksum
            .wrapping_add(self.frame)
            .wrapping_add(self.message_checksum)
            .wrapping_add(self.overflow)
    }

    pub(crate) fn count_ack_checksum(&mut self) {
        self.ack_checksum = self.ack_checksum.wrapping_add(1);
    }

    pub(crate) fn count_frame(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    pub(crate) fn count_message_checksum(&mut self) {
        self.message_checksum = self.message_checksum.wrapping_add(1);
    }

    pub(crate) fn count_overflow(&mut self) {
        self.overflow = self.overflow.wrapping_add(1);
    }
}

/// Message counters and the identity of the Bricklet behind the isolator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Statistics {
    /// Messages accepted from the Brick for the Bricklet.
    pub messages_from_brick: u32,
    /// Messages forwarded from the Bricklet to the Brick.
    pub messages_from_bricklet: u32,
    /// Device identifier reported by the connected Bricklet.
    pub connected_bricklet_device_identifier: u16,
    /// Base58 UID of the connected Bricklet, NUL padded.
    pub connected_bricklet_uid: [u8; TFP_UID_STR_MAX_LENGTH],
}

impl Statistics {
    /// `true` if any value the callback reports on differs. The UID is not compared, a
    /// Bricklet is not hot-plugged behind an isolator.
    pub fn differs_from(&self, other: &Statistics) -> bool {
        self.messages_from_brick != other.messages_from_brick
            || self.messages_from_bricklet != other.messages_from_bricklet
            || self.connected_bricklet_device_identifier
                != other.connected_bricklet_device_identifier
    }

    pub(crate) fn count_message_from_brick(&mut self) {
        self.messages_from_brick = self.messages_from_brick.wrapping_add(1);
    }

    pub(crate) fn count_message_from_bricklet(&mut self) {
        self.messages_from_bricklet = self.messages_from_bricklet.wrapping_add(1);
    }
}

/// Configuration of the statistics callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct CallbackConfiguration {
    /// Callback period in milliseconds; 0 turns the callback off.
    pub period: u32,
    /// Stored and reported back as configured. A snapshot is only ever sent after a change.
    pub value_has_to_change: bool,
}

/// Decides when a statistics snapshot is due and keeps it until it could be delivered.
#[derive(Debug, Clone, Default)]
pub struct StatisticsCallback {
    config: CallbackConfiguration,
    last_time: u32,
    last: Statistics,
    buffered: Option<Statistics>,
}

impl StatisticsCallback {
    /// Creates a disabled callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current configuration.
    pub fn config(&self) -> CallbackConfiguration {
        self.config
    }

    /// Replaces the configuration. A snapshot already buffered is still delivered.
    pub fn set_config(&mut self, config: CallbackConfiguration) {
        self.config = config;
    }

    /// `true` while a snapshot waits for the send channel.
    pub fn is_buffered(&self) -> bool {
        self.buffered.is_some()
    }

    /// Runs one callback step at `now` (milliseconds).
    ///
    /// If a period has elapsed and a value changed since the last snapshot, a snapshot of
    /// `stats` is taken. The snapshot is handed to `deliver`, which returns `false` if it could not be
    /// sent; it is then kept and offered again on the next call without re-evaluating the
    /// period or the change condition.
    ///
    /// Returns `true` if a snapshot was delivered.
    pub fn tick<F>(&mut self, now: u32, stats: &Statistics, deliver: F) -> bool
    where
        F: FnOnce(&Statistics) -> bool,
    {
        if self.buffered.is_none() {
            if self.config.period == 0 || now.wrapping_sub(self.last_time) < self.config.period {
                return false;
            }
            if !stats.differs_from(&self.last) {
                return false;
            }

            self.last = *stats;
            self.last_time = now;
            self.buffered = Some(*stats);
        }

        let delivered = match self.buffered {
            Some(ref snapshot) => deliver(snapshot),
            None => false,
        };
        if delivered {
            self.buffered = None;
        }
        delivered
    }
}
