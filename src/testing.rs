//! A scripted SPI peer for driving the master in tests.

use core::convert::Infallible;
use std::collections::VecDeque;

use embedded_hal::spi::{ErrorType, SpiBus};

use crate::frame::{Frame, encode};
use crate::master::SetBaudrate;
use crate::receiver::Receiver;
use crate::sequence::SequenceNumber;
use crate::stats::ErrorCounters;

/// Records everything clocked out and answers with queued bytes, zeros once the queue is dry.
#[derive(Debug, Default)]
pub(crate) struct ScriptedPeer {
    pub(crate) written: Vec<u8>,
    pub(crate) responses: VecDeque<u8>,
    pub(crate) baudrates: Vec<u32>,
}

impl ScriptedPeer {
    pub(crate) fn respond(&mut self, bytes: &[u8]) {
        self.responses.extend(bytes.iter().copied());
    }

    /// Frames found in everything written so far.
    pub(crate) fn written_frames(&self) -> Vec<Frame> {
        let mut receiver = Receiver::new();
        let mut errors = ErrorCounters::default();
        let mut frames = Vec::new();
        for chunk in self.written.chunks(256) {
            receiver.feed(chunk, &mut errors);
            while let Some(frame) = receiver.poll(&mut errors) {
                frames.push(frame);
            }
        }
        assert_eq!(errors, ErrorCounters::default(), "master wrote a corrupt frame");
        frames
    }
}

impl ErrorType for ScriptedPeer {
    type Error = Infallible;
}

impl SpiBus for ScriptedPeer {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
        for word in words {
            *word = self.responses.pop_front().unwrap_or(0);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
        self.written.extend_from_slice(words);
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Infallible> {
        self.write(write)?;
        self.read(read)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
        self.written.extend_from_slice(words);
        self.read(words)
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

impl SetBaudrate for ScriptedPeer {
    fn set_baudrate(&mut self, baudrate: u32) {
        self.baudrates.push(baudrate);
    }
}

pub(crate) fn seq(n: u8) -> SequenceNumber {
    SequenceNumber::new(n).unwrap()
}

/// Wire bytes of a message frame as the Bricklet would send it.
pub(crate) fn bricklet_frame(payload: &[u8], sequence: u8, ack: u8) -> Vec<u8> {
    encode(payload, seq(sequence), SequenceNumber::new(ack))
        .unwrap()
        .to_vec()
}

/// Wire bytes of an ACK-only frame.
pub(crate) fn bricklet_ack(ack: u8) -> Vec<u8> {
    Frame::ack_only(SequenceNumber::new(ack))
        .encode_to_vec()
        .unwrap()
        .to_vec()
}
