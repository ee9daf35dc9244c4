//! Runtime configuration types.
//!
//! These are the validated values the core components are built from.
//! Loading them from files, flags and environment variables is handled by
//! the server crate.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default port the automation host pushes messages to.
pub const DEFAULT_LISTEN_PORT: u16 = 19099;

/// Connection listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Address to bind.
    pub listen: SocketAddr,
    /// Ceiling on concurrently handled connections.
    pub max_connections: usize,
    /// How long a connection may take to deliver its message.
    pub read_timeout: Duration,
    /// Largest accepted payload. Image messages embed base64 data, so this
    /// is generous.
    pub max_payload_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_LISTEN_PORT)),
            max_connections: 256,
            read_timeout: Duration::from_secs(10),
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Pairing engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfig {
    /// Input queue capacity. The output queue holds half as many pairs
    /// (at least one).
    pub capacity: usize,
    /// How long an unmatched message waits for a partner before it is
    /// discarded.
    pub pair_timeout: Duration,
    /// Delays between attempts when the input queue is full.
    ///
    /// These are waits, not attempts: `put` tries once more than there are
    /// delays, so the default of three 100ms delays means 4 attempts. See
    /// [`put_attempts`](Self::put_attempts).
    pub put_retry_delays: Vec<Duration>,
}

impl PairingConfig {
    /// Total enqueue attempts made by `put` before it reports a full buffer.
    pub fn put_attempts(&self) -> usize {
        self.put_retry_delays.len() + 1
    }

    pub fn output_capacity(&self) -> usize {
        (self.capacity / 2).max(1)
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            pair_timeout: Duration::from_secs(1),
            put_retry_delays: vec![Duration::from_millis(100); 3],
        }
    }
}

/// Everything the client facade needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub listener: ListenerConfig,
    pub pairing: PairingConfig,
}
