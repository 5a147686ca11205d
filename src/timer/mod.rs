//! Tick scheduling for the SPITFP master.
//!
//! [`SpitfpMaster::tick`](crate::master::SpitfpMaster::tick) has to be called regularly, and
//! each call takes the current time in milliseconds. Two approaches are provided: an interrupt
//! service routine using `critical_section::with` (`timer-isr` feature), or a blocking loop
//! paced by `embedded_hal::delay::DelayNs` (`delay-loop` feature).
//!
//! Contains helpers for both, including:
//! - `transfer_duration_us`: time one tick keeps the bus busy at a given rate
//! - `compute_compare_value`: compare value for a periodic hardware timer
//! - `run_tick_loop` / `run_isolator_loop`: blocking driver loops (feature `delay-loop`)
//! - `global_master_tick` and `tick_spitfp_master!()`: interrupt-based tick wrapper
//!   (feature `timer-isr`)
//!
//! Common prescalers for a 16 MHz timer clock (for use with `compute_compare_value`):
//!
//! | PRESCALER | COMPARE VALUE | Interval |
//! |-----------|---------------|----------|
//! |        64 |           250 |     1 ms |
//! |       256 |           125 |     2 ms |
//! |      1024 |            78 |     5 ms |

use crate::consts::SPITFP_TRANSFER_LENGTH;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;

/// Microseconds one tick keeps the bus busy at `baudrate`, rounded up.
///
/// A tick interval shorter than this only queues transfers back to back.
pub const fn transfer_duration_us(baudrate: u32) -> u32 {
    let bits = SPITFP_TRANSFER_LENGTH as u64 * 8;
    let baudrate = if baudrate == 0 { 1 } else { baudrate as u64 };
    (bits * 1_000_000).div_ceil(baudrate) as u32
}

/// Compare value for a timer in CTC mode that fires every `tick_us` microseconds.
///
/// # Arguments
/// - `f_cpu`: timer input clock in Hz
/// - `prescaler`: timer prescaler (e.g., 64, 256, 1024)
/// - `tick_us`: desired tick interval in microseconds
pub const fn compute_compare_value(f_cpu: u32, prescaler: u32, tick_us: u32) -> u32 {
    (f_cpu as u64 / prescaler as u64 * tick_us as u64 / 1_000_000) as u32
}
