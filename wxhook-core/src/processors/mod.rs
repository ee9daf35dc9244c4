//! Background processors.
//!
//! - `PairingEngine`: receives `Message`s, emits `MessagePair`s

pub mod pairing;

pub use pairing::{PairingEngine, PairingError, PairingState};
