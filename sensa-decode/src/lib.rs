//! Vendor payload decoders and LoRa network server event parsers.
//!
//! Everything here is pure: bytes in, points out. No I/O and no state.

pub mod chirpstack;
mod error;
mod globalsat;
mod radiobridge;
mod registry;
mod tektelic;
pub mod units;

pub use error::DecodeError;
pub use registry::{Decoded, decode};
