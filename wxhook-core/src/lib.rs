#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod events;
pub mod listener;
pub mod processors;

pub use cache::{CacheError, DiskFileCache, FileCache, cache_attachment};
pub use cancel::{CancelReason, CancellationToken};
pub use client::{AutomationHost, ClientError, PairClient};
pub use events::{Message, MessagePair, PairError};
pub use listener::{ListenerError, MessageHandler, MessageListener, listen_and_serve};
pub use processors::{PairingEngine, PairingError};
