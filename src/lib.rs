//! Serial protocol of the RSL10 BLE sensor PMOD and the gateway pipeline built on it.
//!
//! Bytes read from the UART go through [`framer`] (newline framing), [`sensor`] (message
//! decoding), [`registry`] (per device state) and finally [`telemetry`], which turns fresh
//! readings into JSON documents on a timer. [`gateway::Gateway`] wires these together.

#![cfg_attr(any(not(feature = "std"), not(test)), no_std)]

pub mod framer;
pub mod gateway;
pub mod registry;
pub mod sensor;
pub mod telemetry;

// include defmt::Format implementations
// we don't want them derive()d in the modules unless defmt-impl feature is set
#[cfg(feature = "defmt-impl")]
pub mod defmt;

// reexport heapless
pub use heapless;

pub use gateway::{DefaultGateway, Gateway};

/// Largest chunk the application reads from the UART at once
pub const PLATFORM_READ_SIZE: usize = 512;
