//! Error taxonomy of the SPITFP link.
//!
//! None of these errors is fatal. Framing problems are counted and recovered from by
//! resynchronisation, back-pressure is reported to the caller who retries on a later tick.

use thiserror::Error;

/// Problems found while encoding or decoding a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FrameError {
    /// The length byte is not a valid SPITFP frame length, or does not match the bytes given.
    #[error("invalid frame length {0}")]
    Length(u8),
    /// The trailing checksum does not match the frame contents.
    #[error("checksum mismatch: calculated {calculated:#04x}, received {received:#04x}")]
    Checksum {
        /// Checksum computed over the received bytes.
        calculated: u8,
        /// Checksum byte found on the wire.
        received: u8,
    },
    /// The payload can not be framed (neither empty nor a valid TFP message length).
    #[error("payload of {0} bytes can not be framed")]
    PayloadLength(usize),
    /// The output buffer can not hold the encoded frame.
    #[error("output buffer too small")]
    BufferTooSmall,
}

/// Reasons an outbound message is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SendError {
    /// The previous message has not been drained or acknowledged yet.
    #[error("previous message still in flight")]
    Busy,
    /// The message is not a valid TFP message length.
    #[error("message of {0} bytes can not be sent")]
    InvalidLength(usize),
}

/// Problems with TFP messages handed to the dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TfpError {
    /// The message is shorter than a TFP header or than its own length field.
    #[error("message truncated: {0} bytes")]
    Truncated(usize),
    /// The message is longer than a TFP message can be.
    #[error("message too long: {0} bytes")]
    TooLong(usize),
}
