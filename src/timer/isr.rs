use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::spi::SpiBus;

use crate::master::{SetBaudrate, SpitfpConfig, SpitfpMaster};

/// A master shared between the main loop and an interrupt handler.
pub type GlobalMaster<SPI> = Mutex<RefCell<Option<SpitfpMaster<SPI>>>>;

/// Used to initialize the global static `SpitfpMaster` for use with `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```rust,ignore
/// use spitfp_isolator::timer::{GlobalMaster, global_master_init};
///
/// static MASTER: GlobalMaster<MySpi> = global_master_init();
/// ```
pub const fn global_master_init<SPI>() -> GlobalMaster<SPI> {
    Mutex::new(RefCell::new(None))
}

/// Creates the master inside the global.
///
/// # Arguments
/// * The global static `SpitfpMaster`
/// * The bus towards the Bricklet
/// * The link settings
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     global_master_setup(&MASTER, spi, SpitfpConfig::default());
/// }
/// ```
pub fn global_master_setup<SPI>(global: &'static GlobalMaster<SPI>, spi: SPI, config: SpitfpConfig)
where
    SPI: SpiBus<u8> + SetBaudrate,
{
    critical_section::with(|cs| {
        let _ = global.borrow(cs).replace(Some(SpitfpMaster::new(spi, config)));
    });
}

/// Runs one tick at each interrupt.
///
/// Returns `None` while the master has not been set up.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     let _ = global_master_tick(&MASTER, millis());
/// }
/// ```
pub fn global_master_tick<SPI>(
    global: &'static GlobalMaster<SPI>,
    now: u32,
) -> Option<Result<(), SPI::Error>>
where
    SPI: SpiBus<u8> + SetBaudrate,
{
    global_master_with(global, |master| master.tick(now))
}

/// Runs `f` on the master inside a critical section, e.g. to hand over or pick up messages
/// from the main loop.
///
/// Returns `None` while the master has not been set up.
pub fn global_master_with<SPI, R, F>(global: &'static GlobalMaster<SPI>, f: F) -> Option<R>
where
    F: FnOnce(&mut SpitfpMaster<SPI>) -> R,
{
    critical_section::with(|cs| global.borrow(cs).borrow_mut().as_mut().map(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedPeer, bricklet_frame};

    static MASTER: GlobalMaster<ScriptedPeer> = global_master_init();

    #[test]
    fn test_global_master_lifecycle() {
        assert!(global_master_tick(&MASTER, 0).is_none());

        global_master_setup(&MASTER, ScriptedPeer::default(), SpitfpConfig::default());
        let frame = bricklet_frame(&[0x21; 8], 1, 0);
        global_master_with(&MASTER, |master| master.bus_mut().respond(&frame)).unwrap();

        assert_eq!(global_master_tick(&MASTER, 0), Some(Ok(())));
        let message = global_master_with(&MASTER, |master| master.take_message_from_bricklet());
        assert_eq!(message.flatten().unwrap().as_slice(), &[0x21; 8]);

        global_master_with(&MASTER, |master| master.submit_to_bricklet(&[0x12; 8]))
            .unwrap()
            .unwrap();
        assert_eq!(global_master_tick(&MASTER, 1), Some(Ok(())));
        let written = global_master_with(&MASTER, |master| master.bus().written_frames()).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].ack, written[0].sequence);
    }
}
