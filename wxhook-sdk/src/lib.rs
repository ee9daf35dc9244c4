//! Shared wire objects and, behind the `client` feature, the typed HTTP
//! client for the automation host.

pub mod objects;

#[cfg(feature = "client")]
pub mod client;
