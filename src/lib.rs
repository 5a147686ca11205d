//! # spitfp-isolator
//!
//! A portable, no_std Rust implementation of the SPITFP master that sits between a Brick and
//! a Bricklet on an isolated link. Two independent message streams (Brick to Bricklet and
//! Bricklet to Brick) share one full-duplex SPI wire.
//!
//! This crate implements:
//! - the SPITFP frame codec (length, sequence byte, payload, Pearson checksum)
//! - a fixed-size receive ring with byte-wise resynchronisation
//! - one in-flight frame per direction with ACK piggy-backing and retransmission
//! - fixed or dynamic baudrate selection, applied only between frames
//! - error and message statistics, with a periodic statistics callback
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support |
//! | `delay-loop`          | Uses `embedded_hal::delay::DelayNs` to pace `tick()` |
//! | `timer-isr` (default) | Uses `critical_section::with` to tick from an interrupt |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use core::convert::Infallible;
//! # use embedded_hal::spi::{ErrorType, SpiBus};
//! # struct Bus;
//! # impl ErrorType for Bus { type Error = Infallible; }
//! # impl SpiBus for Bus {
//! #     fn read(&mut self, _: &mut [u8]) -> Result<(), Infallible> { Ok(()) }
//! #     fn write(&mut self, _: &[u8]) -> Result<(), Infallible> { Ok(()) }
//! #     fn transfer(&mut self, _: &mut [u8], _: &[u8]) -> Result<(), Infallible> { Ok(()) }
//! #     fn transfer_in_place(&mut self, _: &mut [u8]) -> Result<(), Infallible> { Ok(()) }
//! #     fn flush(&mut self) -> Result<(), Infallible> { Ok(()) }
//! # }
//! # impl spitfp_isolator::master::SetBaudrate for Bus { fn set_baudrate(&mut self, _: u32) {} }
//! # fn millis() -> u32 { 0 }
//! use spitfp_isolator::master::{SpitfpConfig, SpitfpMaster};
//!
//! let mut master = SpitfpMaster::new(Bus, SpitfpConfig::default());
//! loop {
//!     master.tick(millis()).unwrap();
//!     if let Some(message) = master.take_message_from_bricklet() {
//!         // hand `message` to the Brick side
//! #       let _ = message;
//!     }
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - Everything is fixed-size; there is no allocation.
//! - `tick()` never blocks. Back-pressure is reported as [`error::SendError::Busy`] (or
//!   `nb::Error::WouldBlock` at the dispatch boundary) and the caller retries on a later tick.
//! - The millisecond clock is supplied by the caller and may wrap.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

#[cfg(feature = "timer-isr")]
pub use critical_section;

pub use heapless;

pub mod baudrate;
pub(crate) mod checksum;
pub mod communication;
pub mod consts;
pub mod error;
pub mod frame;
pub mod master;
pub mod receiver;
pub mod ringbuffer;
pub mod sender;
pub mod sequence;
pub mod slot;
pub mod stats;
pub mod tfp;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;
