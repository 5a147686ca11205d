//! Just enough of the TFP message layer to route and answer messages.
//!
//! Header layout (8 bytes, little endian):
//! - UID (4 bytes)
//! - LENGTH (1 byte): total message length, header included
//! - FID (1 byte)
//! - SEQUENCE (1 byte): sequence number in the high nibble, response-expected in bit 3
//! - FLAGS (1 byte): error code in bits 6..7

use crate::consts::{TFP_HEADER_LENGTH, TFP_MESSAGE_MAX_LENGTH, TFP_UID_STR_MAX_LENGTH};
use crate::error::TfpError;

const BASE58_ALPHABET: &[u8; 58] = b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

const RESPONSE_EXPECTED: u8 = 1 << 3;

/// Error code carried in a response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCode {
    /// Success.
    Ok = 0,
    /// The request carried a value that can not be used.
    InvalidParameter = 1,
    /// The function id is unknown to the addressed device.
    FunctionNotSupported = 2,
}

/// Parsed TFP message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TfpHeader {
    /// Addressed (request) or sending (response, callback) device.
    pub uid: u32,
    /// Total message length.
    pub length: u8,
    /// Function id.
    pub fid: u8,
    /// Sequence number and option bits.
    pub sequence: u8,
    /// Error code and reserved bits.
    pub flags: u8,
}

impl TfpHeader {
    /// Reads the header of `message` and checks that the message holds `length` bytes.
    pub fn parse(message: &[u8]) -> Result<Self, TfpError> {
        if message.len() < TFP_HEADER_LENGTH {
            return Err(TfpError::Truncated(message.len()));
        }
        let header = Self {
            uid: u32::from_le_bytes([message[0], message[1], message[2], message[3]]),
            length: message[4],
            fid: message[5],
            sequence: message[6],
            flags: message[7],
        };
        if header.length > TFP_MESSAGE_MAX_LENGTH {
            return Err(TfpError::TooLong(header.length as usize));
        }
        if (header.length as usize) < TFP_HEADER_LENGTH || message.len() < header.length as usize {
            return Err(TfpError::Truncated(message.len()));
        }
        Ok(header)
    }

    /// Header of a callback sent by `uid`.
    pub fn callback(uid: u32, length: u8, fid: u8) -> Self {
        Self {
            uid,
            length,
            fid,
            sequence: RESPONSE_EXPECTED,
            flags: 0,
        }
    }

    /// Header of the response to this request, `length` bytes long.
    pub fn response(&self, length: u8, error: ErrorCode) -> Self {
        Self {
            uid: self.uid,
            length,
            fid: self.fid,
            sequence: self.sequence,
            flags: (error as u8) << 6,
        }
    }

    /// `true` if the sender wants an answer even for a setter.
    pub fn response_expected(&self) -> bool {
        self.sequence & RESPONSE_EXPECTED != 0
    }

    /// Error code of a response.
    pub fn error_code(&self) -> u8 {
        self.flags >> 6
    }

    /// Writes the header into the first 8 bytes of `out`.
    pub fn write(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.uid.to_le_bytes());
        out[4] = self.length;
        out[5] = self.fid;
        out[6] = self.sequence;
        out[7] = self.flags;
    }
}

/// Renders `uid` in base58, NUL padded to the fixed UID string size.
pub fn uid_to_base58(mut uid: u32) -> [u8; TFP_UID_STR_MAX_LENGTH] {
    let mut reversed = [0u8; TFP_UID_STR_MAX_LENGTH];
    let mut digits = 0;
    while uid >= 58 {
        reversed[digits] = BASE58_ALPHABET[(uid % 58) as usize];
        uid /= 58;
        digits += 1;
    }
    reversed[digits] = BASE58_ALPHABET[uid as usize];
    digits += 1;

    let mut out = [0u8; TFP_UID_STR_MAX_LENGTH];
    for (dst, src) in out.iter_mut().zip(reversed[..digits].iter().rev()) {
        *dst = *src;
    }
    out
}

/// Byte ranges of the identity reply (`GetIdentity` response and enumerate callback).
mod identity {
    use core::ops::Range;

    pub(super) const UID: Range<usize> = 8..16;
    pub(super) const CONNECTED_UID: Range<usize> = 16..24;
    pub(super) const POSITION: usize = 24;
    pub(super) const DEVICE_IDENTIFIER: Range<usize> = 31..33;
}

/// Identity of a device as reported in an identity reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Identity {
    /// Base58 UID of the device, NUL padded.
    pub uid: [u8; TFP_UID_STR_MAX_LENGTH],
    /// Device identifier.
    pub device_identifier: u16,
}

/// Rewrites an identity reply coming from behind the isolator.
///
/// The position becomes `position` and the connected UID becomes `connected_uid` in base58.
/// Returns the identity the reply reports, or `None` if `message` is too short to be one.
pub fn patch_identity(message: &mut [u8], connected_uid: u32, position: u8) -> Option<Identity> {
    if message.len() < identity::DEVICE_IDENTIFIER.end {
        return None;
    }
    message[identity::POSITION] = position;
    message[identity::CONNECTED_UID].copy_from_slice(&uid_to_base58(connected_uid));

    let mut uid = [0u8; TFP_UID_STR_MAX_LENGTH];
    uid.copy_from_slice(&message[identity::UID]);
    let did = &message[identity::DEVICE_IDENTIFIER];
    Some(Identity {
        uid,
        device_identifier: u16::from_le_bytes([did[0], did[1]]),
    })
}
