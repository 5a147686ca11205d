//! SPITFP master for the isolated Bricklet link.
//!
//! This module provides [`SpitfpMaster`], which owns the SPI bus towards the Bricklet and
//! moves TFP messages across it in SPITFP frames. It ties together:
//!
//! - the [`Receiver`], which resynchronises on the raw byte stream,
//! - the [`SequenceTracker`], which sorts inbound frames into new, duplicate and ACK-only,
//! - the [`SendEngine`], which holds the single outbound frame until it is acknowledged,
//! - the [`BaudrateNegotiator`], whose pending rate is applied between frames.
//!
//! Each call to [`tick()`](SpitfpMaster::tick) performs exactly one full-duplex transfer of
//! [`SPITFP_TRANSFER_LENGTH`] bytes. Nothing blocks: a message that can not be accepted yet is
//! refused with [`SendError::Busy`] and the caller tries again after a later tick.
//!
//! ## Message slots
//!
//! Each direction holds at most one message. The "from Brick" slot is filled by
//! [`submit_to_bricklet()`](SpitfpMaster::submit_to_bricklet) and stays occupied until the
//! Bricklet acknowledged the frame. The "from Bricklet" slot is filled by the receive path and
//! emptied by [`take_message_from_bricklet()`](SpitfpMaster::take_message_from_bricklet). While
//! it is full, new inbound messages are dropped without ACK so that the Bricklet sends them
//! again later.

use embedded_hal::spi::SpiBus;
use heapless::Vec;

use crate::baudrate::{BaudrateConfig, BaudrateNegotiator};
use crate::consts::{
    SPITFP_BAUDRATE_DEFAULT, SPITFP_BAUDRATE_MIN, SPITFP_TIMEOUT_MS, SPITFP_TRANSFER_LENGTH,
    TFP_MESSAGE_MAX_LENGTH_USIZE,
};
use crate::error::SendError;
use crate::frame::Frame;
use crate::receiver::Receiver;
use crate::sender::{SendEngine, SendState};
use crate::sequence::{Inbound, SequenceTracker};
use crate::slot::MessageSlot;
use crate::stats::ErrorCounters;

/// Changes the clock rate of the SPI bus.
///
/// `embedded-hal` has no notion of reconfiguring a bus at runtime, so the HAL wrapper around
/// the SPI peripheral implements this. The master only calls it between frames.
pub trait SetBaudrate {
    /// Switches the bus to `baudrate` (bits per second).
    fn set_baudrate(&mut self, baudrate: u32);
}

/// Start-up settings of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SpitfpConfig {
    /// Fixed rate, and the ceiling in dynamic mode. Clamped to 400 kBaud..=2 MBaud.
    pub baudrate: u32,
    /// Start in dynamic baudrate mode.
    pub enable_dynamic_baudrate: bool,
    /// Floor of the dynamic mode. Clamped like `baudrate`.
    pub minimum_dynamic_baudrate: u32,
    /// Retransmission timeout in milliseconds.
    pub timeout_ms: u32,
}

impl Default for SpitfpConfig {
    fn default() -> Self {
        Self {
            baudrate: SPITFP_BAUDRATE_DEFAULT,
            enable_dynamic_baudrate: true,
            minimum_dynamic_baudrate: SPITFP_BAUDRATE_MIN,
            timeout_ms: SPITFP_TIMEOUT_MS,
        }
    }
}

/// The SPITFP master state of one isolated link.
///
/// ## Type Parameters
///
/// - `SPI`: the bus towards the Bricklet, an [`embedded_hal::spi::SpiBus`] that can also
///   change its clock rate through [`SetBaudrate`]
///
/// ## Example
///
/// ```rust
/// # use embedded_hal::spi::{ErrorKind, ErrorType, SpiBus};
/// # use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};
/// # struct Bus(SpiMock<u8>);
/// # impl ErrorType for Bus { type Error = ErrorKind; }
/// # impl SpiBus for Bus {
/// #     fn read(&mut self, w: &mut [u8]) -> Result<(), Self::Error> { self.0.read(w) }
/// #     fn write(&mut self, w: &[u8]) -> Result<(), Self::Error> { self.0.write(w) }
/// #     fn transfer(&mut self, r: &mut [u8], w: &[u8]) -> Result<(), Self::Error> { self.0.transfer(r, w) }
/// #     fn transfer_in_place(&mut self, w: &mut [u8]) -> Result<(), Self::Error> { self.0.transfer_in_place(w) }
/// #     fn flush(&mut self) -> Result<(), Self::Error> { self.0.flush() }
/// # }
/// # impl spitfp_isolator::master::SetBaudrate for Bus { fn set_baudrate(&mut self, _: u32) {} }
/// use spitfp_isolator::master::{SpitfpConfig, SpitfpMaster};
///
/// # let spi = SpiMock::new(&[SpiTransaction::transfer(vec![0; 32], vec![0; 32])]);
/// let mut master = SpitfpMaster::new(Bus(spi), SpitfpConfig::default());
/// master.tick(0).unwrap();
/// assert!(!master.message_from_bricklet_available());
/// # master.release().0.done();
/// ```
#[derive(Debug)]
pub struct SpitfpMaster<SPI> {
    spi: SPI,
    receiver: Receiver,
    sender: SendEngine,
    sequence: SequenceTracker,
    from_brick: MessageSlot,
    from_bricklet: MessageSlot,
    baudrate: BaudrateNegotiator,
    errors: ErrorCounters,
}

impl<SPI> SpitfpMaster<SPI>
where
    SPI: SpiBus<u8> + SetBaudrate,
{
    /// Creates the master on top of `spi`.
    ///
    /// The bus is switched to the configured rate on the first [`tick()`](Self::tick).
    pub fn new(spi: SPI, config: SpitfpConfig) -> Self {
        Self {
            spi,
            receiver: Receiver::new(),
            sender: SendEngine::new(config.timeout_ms),
            sequence: SequenceTracker::new(),
            from_brick: MessageSlot::new(),
            from_bricklet: MessageSlot::new(),
            baudrate: BaudrateNegotiator::new(
                config.baudrate,
                BaudrateConfig {
                    enable_dynamic: config.enable_dynamic_baudrate,
                    minimum_dynamic: config.minimum_dynamic_baudrate,
                },
            ),
            errors: ErrorCounters::default(),
        }
    }

    /// Runs one step of the link at time `now` (milliseconds, may wrap).
    ///
    /// # Behavior
    /// - applies a pending baudrate if no frame is partially shifted out
    /// - re-arms the outbound frame if its ACK timed out
    /// - moves a waiting message from the Brick into the send engine
    /// - piggy-backs an owed ACK on the outbound frame, or queues an ACK-only frame
    /// - performs one full-duplex transfer
    /// - feeds the received bytes to the resynchroniser and handles every complete frame
    /// - lets the dynamic baudrate logic observe the traffic and error counters
    ///
    /// # Errors
    /// Bus errors are returned unchanged. The link state stays consistent: bytes lost on
    /// the wire are recovered by resynchronisation and retransmission.
    pub fn tick(&mut self, now: u32) -> Result<(), SPI::Error> {
        if !self.sender.is_mid_frame() {
            if let Some(rate) = self.baudrate.take_pending() {
                self.spi.set_baudrate(rate);
                debug!("spitfp: baudrate set to {}", rate);
            }
        }

        if self.sender.poll_timeout(now, self.sequence.last_seen()) {
            trace!("spitfp: ACK timeout, retransmitting");
        }

        if self.sender.is_idle() {
            if let Some(message) = self.from_brick.peek() {
                let (current, ack) = (self.sequence.current(), self.sequence.last_seen());
                if let Err(err) = self.sender.submit(message, current, ack) {
                    warn!("spitfp: could not frame message: {}", err);
                }
                self.from_brick.clear();
            }
        }

        if let Some(ack) = self.sequence.take_ack() {
            if !self.sender.refresh_ack(ack) {
                self.sender.queue_ack(ack);
            }
        }

        let mut write = [0u8; SPITFP_TRANSFER_LENGTH];
        let mut read = [0u8; SPITFP_TRANSFER_LENGTH];
        let sent = self.sender.fill(now, &mut write);
        self.spi.transfer(&mut read, &write)?;

        self.receiver.feed(&read, &mut self.errors);
        let mut received = 0;
        while let Some(frame) = self.receiver.poll(&mut self.errors) {
            received += frame.encoded_len();
            self.handle_frame(frame);
        }

        self.baudrate.record_traffic(sent + received);
        let _ = self.baudrate.evaluate(now, self.errors.total());
        Ok(())
    }

    fn handle_frame(&mut self, frame: Frame) {
        if self.sender.acknowledge(frame.ack) {
            self.sequence.advance();
        }

        match self.sequence.classify(frame.sequence) {
            Inbound::AckOnly => {}
            Inbound::Duplicate => {
                debug!("spitfp: duplicate frame, acknowledging again");
                self.sequence.request_ack();
            }
            Inbound::New { sequence, in_order } => {
                if !in_order {
                    warn!("spitfp: unexpected sequence number {}", sequence.get());
                }
                match self.from_bricklet.put(&frame.payload) {
                    Ok(()) => self.sequence.accept(sequence),
                    Err(_) => trace!("spitfp: bricklet slot full, frame dropped"),
                }
            }
        }
    }

    /// Hands a message from the Brick to the link.
    ///
    /// Fails with [`SendError::Busy`] while the previous message has not been acknowledged by
    /// the Bricklet, and with [`SendError::InvalidLength`] for anything that is not a TFP
    /// message length.
    pub fn submit_to_bricklet(&mut self, message: &[u8]) -> Result<(), SendError> {
        if !self.sender.is_idle() {
            return Err(SendError::Busy);
        }
        self.from_brick.put(message)
    }

    /// `true` if a message from the Brick is still waiting or unacknowledged.
    pub fn message_from_brick_pending(&self) -> bool {
        !self.from_brick.is_empty() || !self.sender.is_idle()
    }

    /// `true` if a message from the Bricklet waits to be taken.
    pub fn message_from_bricklet_available(&self) -> bool {
        !self.from_bricklet.is_empty()
    }

    /// Takes the waiting message from the Bricklet, freeing the slot for the next one.
    pub fn take_message_from_bricklet(&mut self) -> Option<Vec<u8, TFP_MESSAGE_MAX_LENGTH_USIZE>> {
        self.from_bricklet.take()
    }

    /// Snapshot of the four error counters.
    pub fn error_counters(&self) -> ErrorCounters {
        self.errors
    }

    /// Sets the fixed rate (and the dynamic ceiling), clamped.
    pub fn set_baudrate(&mut self, baudrate: u32) {
        self.baudrate.set_baudrate(baudrate);
    }

    /// The configured (clamped) rate.
    pub fn baudrate(&self) -> u32 {
        self.baudrate.baudrate()
    }

    /// The rate the bus currently runs at.
    pub fn current_baudrate(&self) -> u32 {
        self.baudrate.current()
    }

    /// Sets the dynamic baudrate mode and its floor (clamped).
    pub fn set_baudrate_config(&mut self, enable_dynamic: bool, minimum_dynamic: u32) {
        self.baudrate.set_config(enable_dynamic, minimum_dynamic);
    }

    /// Current dynamic baudrate settings.
    pub fn baudrate_config(&self) -> BaudrateConfig {
        self.baudrate.config()
    }

    /// State of the outbound frame.
    pub fn send_state(&self) -> SendState {
        self.sender.state()
    }

    /// `true` once the Bricklet has sent nothing but zeros for a while.
    pub fn is_bricklet_idle(&self) -> bool {
        self.receiver.is_peer_idle()
    }

    /// Abandons everything in flight and starts the link over.
    ///
    /// Error counters and baudrate settings are kept.
    pub fn reset(&mut self) {
        self.receiver.reset();
        self.sender = SendEngine::new(self.sender.timeout_ms());
        self.sequence = SequenceTracker::new();
        self.from_brick.clear();
        self.from_bricklet.clear();
        debug!("spitfp: link reset");
    }

    /// Borrows the bus.
    pub fn bus(&self) -> &SPI {
        &self.spi
    }

    /// Mutably borrows the bus.
    pub fn bus_mut(&mut self) -> &mut SPI {
        &mut self.spi
    }

    /// Gives the bus back.
    pub fn release(self) -> SPI {
        self.spi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedPeer, bricklet_ack, bricklet_frame, seq};
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    impl SetBaudrate for SpiMock<u8> {
        fn set_baudrate(&mut self, _baudrate: u32) {}
    }

    fn master() -> SpitfpMaster<ScriptedPeer> {
        SpitfpMaster::new(ScriptedPeer::default(), SpitfpConfig::default())
    }

    fn message(fill: u8) -> [u8; 8] {
        [fill; 8]
    }

    #[test]
    fn test_exchange_with_mock_bus() {
        let payload = message(0x42);
        let outbound = crate::frame::encode(&payload, seq(1), None).unwrap();
        let mut first_write = outbound.to_vec();
        first_write.resize(SPITFP_TRANSFER_LENGTH, 0);
        let mut first_read = bricklet_ack(1);
        first_read.resize(SPITFP_TRANSFER_LENGTH, 0);

        let expectations = [
            SpiTransaction::transfer(first_write, first_read),
            SpiTransaction::transfer(vec![0; 32], vec![0; 32]),
        ];
        let mut master = SpitfpMaster::new(SpiMock::new(&expectations), SpitfpConfig::default());

        master.submit_to_bricklet(&payload).unwrap();
        master.tick(0).unwrap();
        assert_eq!(master.send_state(), SendState::Idle);
        master.tick(1).unwrap();

        master.release().done();
    }

    #[test]
    fn test_second_message_busy_until_acked() {
        let mut master = master();
        master.submit_to_bricklet(&message(1)).unwrap();
        assert_eq!(master.submit_to_bricklet(&message(2)), Err(SendError::Busy));

        master.tick(0).unwrap();
        assert_eq!(master.send_state(), SendState::AwaitingAck);
        assert_eq!(master.submit_to_bricklet(&message(2)), Err(SendError::Busy));

        master.spi.respond(&bricklet_ack(1));
        master.tick(1).unwrap();
        assert!(!master.message_from_brick_pending());
        master.submit_to_bricklet(&message(2)).unwrap();
        master.tick(2).unwrap();

        let frames = master.bus().written_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].sequence, Some(seq(1)));
        assert_eq!(frames[1].sequence, Some(seq(2)));
        assert_eq!(frames[1].payload.as_slice(), &message(2));
    }

    #[test]
    fn test_retransmits_with_same_sequence() {
        let mut master = master();
        master.submit_to_bricklet(&message(7)).unwrap();
        for now in 0..5 {
            master.tick(now).unwrap();
        }
        assert_eq!(master.bus().written_frames().len(), 1);

        master.tick(5).unwrap();
        let frames = master.bus().written_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], frames[1]);
        assert_eq!(frames[1].sequence, Some(seq(1)));
    }

    #[test]
    fn test_duplicate_is_acked_not_delivered() {
        let mut master = master();
        let frame = bricklet_frame(&message(0x10), 1, 0);

        master.spi.respond(&frame);
        master.tick(0).unwrap();
        assert_eq!(
            master.take_message_from_bricklet().unwrap().as_slice(),
            &message(0x10)
        );
        master.tick(1).unwrap();

        // The ACK got lost, the Bricklet sends the same frame again.
        master.spi.respond(&frame);
        master.tick(2).unwrap();
        assert!(!master.message_from_bricklet_available());
        master.tick(3).unwrap();

        let frames = master.bus().written_frames();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.is_ack_only() && f.ack == Some(seq(1))));
    }

    #[test]
    fn test_garbage_between_frames() {
        let mut master = master();
        let mut bytes = bricklet_frame(&message(1), 1, 0);
        bytes.extend_from_slice(&[0xff, 0xfe, 0xfd]);
        bytes.extend_from_slice(&bricklet_frame(&message(2), 2, 0));

        master.spi.respond(&bytes);
        master.tick(0).unwrap();
        assert_eq!(master.error_counters().frame, 3);
        assert_eq!(
            master.take_message_from_bricklet().unwrap().as_slice(),
            &message(1)
        );

        // The second frame met a full slot and was not acknowledged; it comes again.
        master.spi.respond(&bricklet_frame(&message(2), 2, 0));
        master.tick(1).unwrap();
        assert_eq!(
            master.take_message_from_bricklet().unwrap().as_slice(),
            &message(2)
        );
        assert_eq!(master.error_counters().total(), 3);
    }

    #[test]
    fn test_frame_spanning_transfers_is_delivered_once() {
        let mut master = master();
        master.spi.respond(&bricklet_frame(&[0x33; 80], 1, 0));

        master.tick(0).unwrap();
        master.tick(1).unwrap();
        assert!(!master.message_from_bricklet_available());
        master.tick(2).unwrap();
        assert_eq!(
            master.take_message_from_bricklet().unwrap().as_slice(),
            &[0x33; 80]
        );

        for now in 3..10 {
            master.tick(now).unwrap();
        }
        assert!(!master.message_from_bricklet_available());
        let frames = master.bus().written_frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_ack_only());
        assert_eq!(frames[0].ack, Some(seq(1)));
        assert_eq!(master.error_counters(), ErrorCounters::default());
    }

    #[test]
    fn test_late_clock_keeps_start_rate() {
        let mut master = master();
        master.submit_to_bricklet(&[0x5a; 80]).unwrap();
        for now in 50_000..50_006 {
            master.tick(now).unwrap();
        }
        assert_eq!(master.bus().baudrates, [1_400_000]);
    }

    #[test]
    fn test_ack_rides_along_with_message() {
        let mut master = master();
        master.spi.respond(&bricklet_frame(&message(3), 1, 0));
        master.tick(0).unwrap();
        assert!(master.message_from_bricklet_available());

        master.submit_to_bricklet(&message(4)).unwrap();
        master.tick(1).unwrap();

        let frames = master.bus().written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence, Some(seq(1)));
        assert_eq!(frames[0].ack, Some(seq(1)));
    }

    #[test]
    fn test_baudrate_changes_between_frames() {
        let mut master = SpitfpMaster::new(
            ScriptedPeer::default(),
            SpitfpConfig {
                enable_dynamic_baudrate: false,
                ..Default::default()
            },
        );
        master.submit_to_bricklet(&[0x5a; 80]).unwrap();
        master.tick(0).unwrap();
        assert_eq!(master.bus().baudrates, [1_400_000]);

        master.set_baudrate(800_000);
        master.tick(1).unwrap();
        master.tick(2).unwrap();
        assert_eq!(master.bus().baudrates, [1_400_000]);
        assert_eq!(master.current_baudrate(), 1_400_000);

        master.tick(3).unwrap();
        assert_eq!(master.bus().baudrates, [1_400_000, 800_000]);
        assert_eq!(master.baudrate(), 800_000);
    }

    #[test]
    fn test_baudrate_setters_clamp() {
        let mut master = master();
        master.set_baudrate(3_000_000);
        assert_eq!(master.baudrate(), 2_000_000);
        master.set_baudrate(100_000);
        assert_eq!(master.baudrate(), 400_000);
        master.set_baudrate_config(true, 10);
        assert_eq!(master.baudrate_config().minimum_dynamic, 400_000);
    }

    #[test]
    fn test_reset_abandons_pending_send() {
        let mut master = master();
        master.submit_to_bricklet(&message(9)).unwrap();
        master.tick(0).unwrap();
        assert!(master.message_from_brick_pending());

        master.reset();
        assert!(!master.message_from_brick_pending());
        assert!(master.submit_to_bricklet(&message(9)).is_ok());
    }

    #[test]
    fn test_silent_bricklet_is_idle() {
        let mut master = master();
        for now in 0..4 {
            master.tick(now).unwrap();
        }
        assert!(master.is_bricklet_idle());
        assert_eq!(master.error_counters(), ErrorCounters::default());
    }
}
