use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiBus;

use crate::communication::{BrickLink, Isolator};
use crate::master::{SetBaudrate, SpitfpMaster};

/// Runs a blocking loop that repeatedly calls `tick()` on the provided master.
///
/// The loop keeps its own millisecond clock, advanced by `tick_ms` after every delay. It is
/// meant for single-purpose firmware without a spare timer interrupt.
///
/// # Arguments
/// - `master`: the link to drive
/// - `delay`: a delay provider implementing `DelayNs`, typically from the HAL
/// - `tick_ms`: delay between two ticks in milliseconds
///
/// # Errors
/// Only returns when the bus reports an error.
///
/// # Example
/// ```rust,ignore
/// use spitfp_isolator::timer::run_tick_loop;
/// let mut master = SpitfpMaster::new(spi, SpitfpConfig::default());
/// run_tick_loop(&mut master, &mut delay, 1)?;
/// ```
pub fn run_tick_loop<SPI, D>(
    master: &mut SpitfpMaster<SPI>,
    delay: &mut D,
    tick_ms: u32,
) -> Result<Infallible, SPI::Error>
where
    SPI: SpiBus<u8> + SetBaudrate,
    D: DelayNs,
{
    let mut now: u32 = 0;
    loop {
        master.tick(now)?;
        delay.delay_ms(tick_ms);
        now = now.wrapping_add(tick_ms);
    }
}

/// Like [`run_tick_loop`], but drives a whole [`Isolator`] including forwarding to `link`.
pub fn run_isolator_loop<SPI, L, D>(
    isolator: &mut Isolator<SPI>,
    link: &mut L,
    delay: &mut D,
    tick_ms: u32,
) -> Result<Infallible, SPI::Error>
where
    SPI: SpiBus<u8> + SetBaudrate,
    L: BrickLink,
    D: DelayNs,
{
    let mut now: u32 = 0;
    loop {
        isolator.tick(now, link)?;
        delay.delay_ms(tick_ms);
        now = now.wrapping_add(tick_ms);
    }
}
