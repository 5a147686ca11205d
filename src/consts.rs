//! Constants used across the SPITFP implementation.
//!
//! This module defines the protocol-wide constants used for buffer sizing, frame layout,
//! timing and the baudrate limits of the isolated link.
//!
//! ## Key Concepts
//!
//! - **Overhead**: every frame carries a length byte, a sequence byte and a checksum byte.
//! - **Message Limits**: payloads are TFP messages, 8 to 80 bytes long. An empty payload is
//!   an ACK-only frame.
//! - **Buffer Sizing**: the receive ring is a power of two so that cursor arithmetic is a mask.
//! - **Baudrate**: the line rate is always kept between 400 kBaud and 2 MBaud.

/// Length (in bytes) of the framing overhead: length byte, sequence byte and checksum byte.
pub const SPITFP_PROTOCOL_OVERHEAD: u8 = 3;

/// Minimum length of a TFP message (the bare 8-byte header).
pub const TFP_MESSAGE_MIN_LENGTH: u8 = 8;

/// Maximum length of a TFP message, header included.
pub const TFP_MESSAGE_MAX_LENGTH: u8 = 80;

/// See [`TFP_MESSAGE_MAX_LENGTH`](crate::consts::TFP_MESSAGE_MAX_LENGTH)
pub const TFP_MESSAGE_MAX_LENGTH_USIZE: usize = TFP_MESSAGE_MAX_LENGTH as usize;

/// Length of an ACK-only frame.
pub const SPITFP_ACK_LENGTH: u8 = SPITFP_PROTOCOL_OVERHEAD;

/// Shortest frame that carries a message.
pub const SPITFP_MIN_MESSAGE_FRAME_LENGTH: u8 = TFP_MESSAGE_MIN_LENGTH + SPITFP_PROTOCOL_OVERHEAD;

/// Longest frame on the wire.
pub const SPITFP_MAX_FRAME_LENGTH: u8 = TFP_MESSAGE_MAX_LENGTH + SPITFP_PROTOCOL_OVERHEAD;

/// See [`SPITFP_MAX_FRAME_LENGTH`](crate::consts::SPITFP_MAX_FRAME_LENGTH)
pub const SPITFP_MAX_FRAME_LENGTH_USIZE: usize = SPITFP_MAX_FRAME_LENGTH as usize;

/// Capacity of the receive ring. Must be a power of two.
pub const SPITFP_RECEIVE_BUFFER_LENGTH: usize = 1024;

/// Number of bytes clocked over the wire per `tick()`.
pub const SPITFP_TRANSFER_LENGTH: usize = 32;

/// Time after which an unacknowledged frame is sent again.
pub const SPITFP_TIMEOUT_MS: u32 = 5;

/// Consecutive zero bytes after which the peer is considered idle or disconnected.
pub const SPITFP_IDLE_ZERO_COUNT: u32 = 128;

/// Lowest configurable line rate.
pub const SPITFP_BAUDRATE_MIN: u32 = 400_000;

/// Highest configurable line rate.
pub const SPITFP_BAUDRATE_MAX: u32 = 2_000_000;

/// Line rate used after power-up.
pub const SPITFP_BAUDRATE_DEFAULT: u32 = 1_400_000;

/// Length of one dynamic baudrate evaluation window.
pub const SPITFP_DYNAMIC_BAUDRATE_INTERVAL_MS: u32 = 1000;

/// Linear step used when the dynamic baudrate is lowered.
pub const SPITFP_DYNAMIC_BAUDRATE_STEP: u32 = 100_000;

/// Length of the base58 UID strings carried in TFP messages.
pub const TFP_UID_STR_MAX_LENGTH: usize = 8;

/// Position character the isolator reports for the Bricklet behind it.
pub const ISOLATOR_BRICKLET_POSITION: u8 = b'Z';

/// Length of the TFP message header.
pub const TFP_HEADER_LENGTH: usize = 8;

/// TFP function ids answered by the isolator itself.
pub mod fid {
    /// `GetStatistics`
    pub const GET_STATISTICS: u8 = 1;
    /// `SetSPITFPBaudrateConfig`
    pub const SET_SPITFP_BAUDRATE_CONFIG: u8 = 2;
    /// `GetSPITFPBaudrateConfig`
    pub const GET_SPITFP_BAUDRATE_CONFIG: u8 = 3;
    /// `SetSPITFPBaudrate`
    pub const SET_SPITFP_BAUDRATE: u8 = 4;
    /// `GetSPITFPBaudrate`
    pub const GET_SPITFP_BAUDRATE: u8 = 5;
    /// `GetIsolatorSPITFPErrorCount`
    pub const GET_ISOLATOR_SPITFP_ERROR_COUNT: u8 = 6;
    /// `SetStatisticsCallbackConfiguration`
    pub const SET_STATISTICS_CALLBACK_CONFIGURATION: u8 = 7;
    /// `GetStatisticsCallbackConfiguration`
    pub const GET_STATISTICS_CALLBACK_CONFIGURATION: u8 = 8;
    /// `CALLBACK_STATISTICS`
    pub const CALLBACK_STATISTICS: u8 = 9;
    /// Enumerate callback sent by every device.
    pub const ENUMERATE_CALLBACK: u8 = 253;
    /// `GetIdentity`, common to all devices.
    pub const GET_IDENTITY: u8 = 255;
}
