//! This crate provides a transport-independent PMBus engine for reading telemetry from, and
//! controlling, dual-rail voltage regulators.
//!
//! It takes care of:
//! * Resolving symbolic command names (and their aliases) to register addresses.
//! * Converting between raw register values and engineering units: Linear11, Linear16 with the
//!   exponent from `VOUT_MODE`, the die temperature sensor, and current limits scaled by the
//!   code in `MFR_VR_CONFIG`.
//! * Decoding status registers into named fault, warning and live flags.
//! * Selecting the right page before every page-scoped access, and only when it changes.
//!
//! Moving bytes on the bus is left to an implementation of [`transport::Transport`]. The engine
//! never retries and never caches register values.
//!
//! Register layout notes for the supported controller family:
//! * Rail 0 and rail 1 share one bus address and are selected with `PAGE` (0x00).
//! * Manufacturer sub-registers (e.g. the 16 phase current registers at 0x0C00) are reached
//!   through `MFR_REG_ACCESS` (0xD8) and are shared by both rails.
//! * `IOUT_OC_WARN_LIMIT` and `IOUT_OC_FAULT_LIMIT` may acknowledge a write and keep their old
//!   value; use [`engine::PmbusEngine::write_verified`] when that matters.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod page;
pub mod register;
pub mod scaling;
pub mod shared;
pub mod status;
pub mod transport;

#[cfg(test)]
mod mock_transport;

pub use engine::{Direction, Outcome, PmbusEngine};
pub use page::Page;
pub use shared::SharedEngine;
pub use transport::Transport;
