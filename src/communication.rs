//! Dispatch boundary between the Brick and the SPITFP link.
//!
//! [`Isolator`] wraps a [`SpitfpMaster`] and sits where the Brick's messages come in:
//!
//! - messages addressed to the isolator's own UID are answered here (statistics, baudrate and
//!   callback configuration),
//! - everything else goes into the "message from Brick" slot of the master,
//! - messages from the Bricklet are handed to the Brick through a [`BrickLink`], identity
//!   replies rewritten so that the Bricklet shows up behind the isolator,
//! - the periodic statistics callback is sent through the same [`BrickLink`].
//!
//! Messages from the Bricklet only ever travel through [`Isolator::tick`]; responses from
//! [`Isolator::handle_message`] carry nothing but the isolator's own answers.

use embedded_hal::spi::SpiBus;
use heapless::Vec;

use crate::consts::{
    ISOLATOR_BRICKLET_POSITION, TFP_HEADER_LENGTH, TFP_MESSAGE_MAX_LENGTH_USIZE, fid,
};
use crate::error::{SendError, TfpError};
use crate::master::{SetBaudrate, SpitfpMaster};
use crate::stats::{CallbackConfiguration, ErrorCounters, Statistics, StatisticsCallback};
use crate::tfp::{ErrorCode, TfpHeader, patch_identity};

const STATISTICS_LENGTH: usize = 26;
const STATISTICS_BODY_LENGTH: usize = STATISTICS_LENGTH - TFP_HEADER_LENGTH;

/// A TFP message buffer for responses.
pub type Response = Vec<u8, TFP_MESSAGE_MAX_LENGTH_USIZE>;

/// The upstream channel towards the Brick.
pub trait BrickLink {
    /// `true` if a message can be sent right now.
    fn is_send_possible(&self) -> bool;

    /// Sends `message` (a complete TFP message) to the Brick.
    fn send_ack_and_message(&mut self, message: &[u8]);
}

/// Outcome of [`Isolator::handle_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum HandleMessageResponse {
    /// The message was forwarded to the Bricklet; there is nothing to answer.
    None,
    /// Handled; the response is the bare header, to be sent if the request expects it.
    Empty,
    /// Handled; the response carries data.
    NewMessage,
    /// Unknown function id; the response header carries the error code.
    NotSupported,
    /// Malformed request; the response header carries the error code.
    InvalidParameter,
}

/// The isolator: local query interface plus message routing around a [`SpitfpMaster`].
#[derive(Debug)]
pub struct Isolator<SPI> {
    master: SpitfpMaster<SPI>,
    uid: u32,
    statistics: Statistics,
    callback: StatisticsCallback,
}

impl<SPI> Isolator<SPI>
where
    SPI: SpiBus<u8> + SetBaudrate,
{
    /// Creates the isolator with its own TFP `uid`.
    pub fn new(master: SpitfpMaster<SPI>, uid: u32) -> Self {
        Self {
            master,
            uid,
            statistics: Statistics::default(),
            callback: StatisticsCallback::new(),
        }
    }

    /// The isolator's own UID.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// The link towards the Bricklet.
    pub fn master(&self) -> &SpitfpMaster<SPI> {
        &self.master
    }

    /// Mutable access to the link towards the Bricklet.
    pub fn master_mut(&mut self) -> &mut SpitfpMaster<SPI> {
        &mut self.master
    }

    /// Message counters and the identity of the connected Bricklet.
    pub fn statistics(&self) -> Statistics {
        self.statistics
    }

    /// The four SPITFP error counters.
    pub fn error_counters(&self) -> ErrorCounters {
        self.master.error_counters()
    }

    /// Configures the periodic statistics callback.
    pub fn set_statistics_callback_configuration(&mut self, config: CallbackConfiguration) {
        self.callback.set_config(config);
    }

    /// Current statistics callback configuration.
    pub fn statistics_callback_configuration(&self) -> CallbackConfiguration {
        self.callback.config()
    }

    /// Handles one message from the Brick.
    ///
    /// Messages for the isolator are answered in `response`. All others are queued for the
    /// Bricklet; while the previous one is still on its way this returns
    /// `nb::Error::WouldBlock` and the caller ticks and tries again:
    ///
    /// ```rust,ignore
    /// let result = nb::block!({
    ///     let result = isolator.handle_message(&message, &mut response);
    ///     if matches!(result, Err(nb::Error::WouldBlock)) {
    ///         isolator.tick(millis(), &mut link)?;
    ///     }
    ///     result
    /// });
    /// ```
    pub fn handle_message(
        &mut self,
        message: &[u8],
        response: &mut Response,
    ) -> nb::Result<HandleMessageResponse, TfpError> {
        let header = TfpHeader::parse(message).map_err(nb::Error::Other)?;
        let message = &message[..header.length as usize];
        response.clear();

        if header.uid == self.uid {
            return Ok(self.handle_local(&header, message, response));
        }

        match self.master.submit_to_bricklet(message) {
            Ok(()) => {
                self.statistics.count_message_from_brick();
                Ok(HandleMessageResponse::None)
            }
            Err(SendError::Busy) => Err(nb::Error::WouldBlock),
            Err(SendError::InvalidLength(length)) => {
                Err(nb::Error::Other(TfpError::Truncated(length)))
            }
        }
    }

    fn handle_local(
        &mut self,
        header: &TfpHeader,
        message: &[u8],
        response: &mut Response,
    ) -> HandleMessageResponse {
        let body = &message[TFP_HEADER_LENGTH..];
        let _ = response.resize(TFP_HEADER_LENGTH, 0);

        let result = match header.fid {
            fid::GET_STATISTICS => {
                push(response, &statistics_body(&self.statistics));
                HandleMessageResponse::NewMessage
            }
            fid::SET_SPITFP_BAUDRATE_CONFIG => match (body.first(), read_u32(body, 1)) {
                (Some(&enable), Some(minimum)) => {
                    self.master.set_baudrate_config(enable != 0, minimum);
                    HandleMessageResponse::Empty
                }
                _ => HandleMessageResponse::InvalidParameter,
            },
            fid::GET_SPITFP_BAUDRATE_CONFIG => {
                let config = self.master.baudrate_config();
                push(response, &[config.enable_dynamic as u8]);
                push(response, &config.minimum_dynamic.to_le_bytes());
                HandleMessageResponse::NewMessage
            }
            fid::SET_SPITFP_BAUDRATE => match read_u32(body, 0) {
                Some(baudrate) => {
                    self.master.set_baudrate(baudrate);
                    HandleMessageResponse::Empty
                }
                None => HandleMessageResponse::InvalidParameter,
            },
            fid::GET_SPITFP_BAUDRATE => {
                push(response, &self.master.baudrate().to_le_bytes());
                HandleMessageResponse::NewMessage
            }
            fid::GET_ISOLATOR_SPITFP_ERROR_COUNT => {
                let errors = self.master.error_counters();
                for count in [
                    errors.ack_checksum,
                    errors.frame,
                    errors.message_checksum,
                    errors.overflow,
                ] {
                    push(response, &count.to_le_bytes());
                }
                HandleMessageResponse::NewMessage
            }
            fid::SET_STATISTICS_CALLBACK_CONFIGURATION => match (read_u32(body, 0), body.get(4)) {
                (Some(period), Some(&value_has_to_change)) => {
                    self.callback.set_config(CallbackConfiguration {
                        period,
                        value_has_to_change: value_has_to_change != 0,
                    });
                    HandleMessageResponse::Empty
                }
                _ => HandleMessageResponse::InvalidParameter,
            },
            fid::GET_STATISTICS_CALLBACK_CONFIGURATION => {
                let config = self.callback.config();
                push(response, &config.period.to_le_bytes());
                push(response, &[config.value_has_to_change as u8]);
                HandleMessageResponse::NewMessage
            }
            other => {
                debug!("isolator: function id {} not supported", other);
                HandleMessageResponse::NotSupported
            }
        };

        let error = match result {
            HandleMessageResponse::NotSupported => ErrorCode::FunctionNotSupported,
            HandleMessageResponse::InvalidParameter => ErrorCode::InvalidParameter,
            _ => ErrorCode::Ok,
        };
        header
            .response(response.len() as u8, error)
            .write(response);
        result
    }

    /// Drives the link and everything that flows towards the Brick.
    ///
    /// Runs one [`SpitfpMaster::tick`], forwards a waiting message from the Bricklet and
    /// sends the statistics callback when it is due, each only if `link` can take it.
    pub fn tick<L: BrickLink>(&mut self, now: u32, link: &mut L) -> Result<(), SPI::Error> {
        self.master.tick(now)?;
        let _ = self.forward_from_bricklet(link);
        let _ = self.statistics_callback_tick(now, link);
        Ok(())
    }

    fn forward_from_bricklet<L: BrickLink>(&mut self, link: &mut L) -> bool {
        if !self.master.message_from_bricklet_available() || !link.is_send_possible() {
            return false;
        }
        let Some(mut message) = self.master.take_message_from_bricklet() else {
            return false;
        };
        self.inspect_message_from_bricklet(&mut message);
        self.statistics.count_message_from_bricklet();
        link.send_ack_and_message(&message);
        true
    }

    fn inspect_message_from_bricklet(&mut self, message: &mut [u8]) {
        let Ok(header) = TfpHeader::parse(message) else {
            return;
        };
        if header.fid != fid::GET_IDENTITY && header.fid != fid::ENUMERATE_CALLBACK {
            return;
        }
        if let Some(identity) = patch_identity(message, self.uid, ISOLATOR_BRICKLET_POSITION) {
            self.statistics.connected_bricklet_uid = identity.uid;
            self.statistics.connected_bricklet_device_identifier = identity.device_identifier;
            debug!(
                "isolator: bricklet with device identifier {} connected",
                identity.device_identifier
            );
        }
    }

    fn statistics_callback_tick<L: BrickLink>(&mut self, now: u32, link: &mut L) -> bool {
        let uid = self.uid;
        self.callback.tick(now, &self.statistics, |snapshot| {
            if !link.is_send_possible() {
                return false;
            }
            let mut message = [0u8; STATISTICS_LENGTH];
            TfpHeader::callback(uid, STATISTICS_LENGTH as u8, fid::CALLBACK_STATISTICS)
                .write(&mut message);
            message[TFP_HEADER_LENGTH..].copy_from_slice(&statistics_body(snapshot));
            link.send_ack_and_message(&message);
            true
        })
    }
}

fn push(response: &mut Response, bytes: &[u8]) {
    // Responses are far below the TFP maximum.
    let _ = response.extend_from_slice(bytes);
}

fn read_u32(body: &[u8], offset: usize) -> Option<u32> {
    let bytes = body.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn statistics_body(stats: &Statistics) -> [u8; STATISTICS_BODY_LENGTH] {
    let mut body = [0u8; STATISTICS_BODY_LENGTH];
    body[0..4].copy_from_slice(&stats.messages_from_brick.to_le_bytes());
    body[4..8].copy_from_slice(&stats.messages_from_bricklet.to_le_bytes());
    body[8..10].copy_from_slice(&stats.connected_bricklet_device_identifier.to_le_bytes());
    body[10..18].copy_from_slice(&stats.connected_bricklet_uid);
    body
}
