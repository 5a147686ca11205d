//! Single-message hand-over buffers.
//!
//! Each direction of the isolator owns exactly one slot. An empty slot means "no message";
//! a full slot pushes back on the producer until the consumer took the message out.

use heapless::Vec;

use crate::consts::TFP_MESSAGE_MAX_LENGTH_USIZE;
use crate::error::SendError;
use crate::frame::is_valid_payload_length;

/// Holds at most one TFP message.
#[derive(Debug, Clone, Default)]
pub struct MessageSlot {
    message: Vec<u8, TFP_MESSAGE_MAX_LENGTH_USIZE>,
}

impl MessageSlot {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            message: Vec::new(),
        }
    }

    /// `true` if no message is waiting.
    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }

    /// Stores `message`. Fails with [`SendError::Busy`] while the previous one is still here.
    pub fn put(&mut self, message: &[u8]) -> Result<(), SendError> {
        if !self.is_empty() {
            return Err(SendError::Busy);
        }
        if message.is_empty() || !is_valid_payload_length(message.len()) {
            return Err(SendError::InvalidLength(message.len()));
        }
        self.message =
            Vec::from_slice(message).map_err(|_| SendError::InvalidLength(message.len()))?;
        Ok(())
    }

    /// The waiting message, if any.
    pub fn peek(&self) -> Option<&[u8]> {
        if self.is_empty() {
            None
        } else {
            Some(self.message.as_slice())
        }
    }

    /// Mutable access to the waiting message, e.g. to patch it before it is forwarded.
    pub fn peek_mut(&mut self) -> Option<&mut [u8]> {
        if self.is_empty() {
            None
        } else {
            Some(self.message.as_mut_slice())
        }
    }

    /// Takes the waiting message out and frees the slot.
    pub fn take(&mut self) -> Option<Vec<u8, TFP_MESSAGE_MAX_LENGTH_USIZE>> {
        if self.is_empty() {
            None
        } else {
            Some(core::mem::take(&mut self.message))
        }
    }

    /// Drops whatever is waiting.
    pub fn clear(&mut self) {
        self.message.clear();
    }
}
