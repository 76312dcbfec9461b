//! Reservation trust and sanctions engine.
//!
//! Tracks consumer reliability, arbitrates no-show disputes between consumers and
//! establishments, and enforces establishment sanctions that result from those
//! disputes or from staff action.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod trust;
