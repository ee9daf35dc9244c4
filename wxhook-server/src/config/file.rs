//! TOML file configuration structures.
//!
//! These structs directly map to the `wxhook.toml` file format. Every
//! section and field is optional; durations are in milliseconds.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;
use wxhook_core::config::{DEFAULT_LISTEN_PORT, ListenerConfig, PairingConfig};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub listener: ListenerSection,
    pub pairing: PairingSection,
    pub host: HostSection,
    pub cache: CacheSection,
}

/// `[listener]`: where the automation host pushes messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerSection {
    /// `host:port`, or a bare port bound on all interfaces.
    pub listen: String,
    pub max_connections: usize,
    pub read_timeout_ms: u64,
    pub max_payload_bytes: usize,
}

impl Default for ListenerSection {
    fn default() -> Self {
        let defaults = ListenerConfig::default();
        Self {
            listen: defaults.listen.to_string(),
            max_connections: defaults.max_connections,
            read_timeout_ms: defaults.read_timeout.as_millis() as u64,
            max_payload_bytes: defaults.max_payload_bytes,
        }
    }
}

/// `[pairing]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingSection {
    pub capacity: usize,
    pub pair_timeout_ms: u64,
    /// Waits between enqueue attempts; one more attempt than entries is made.
    pub put_retry_delays_ms: Vec<u64>,
}

impl Default for PairingSection {
    fn default() -> Self {
        let defaults = PairingConfig::default();
        Self {
            capacity: defaults.capacity,
            pair_timeout_ms: defaults.pair_timeout.as_millis() as u64,
            put_retry_delays_ms: defaults
                .put_retry_delays
                .iter()
                .map(|d| d.as_millis() as u64)
                .collect(),
        }
    }
}

/// `[host]`: the automation host HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSection {
    /// When false, the client neither hooks nor checks login and serves
    /// pairs as soon as it is bound.
    pub enabled: bool,
    pub base_url: Url,
    /// Address the host should push messages to, as `host:port`.
    pub hook_addr: String,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            hook_addr: format!("127.0.0.1:{}", DEFAULT_HOOK_PORT),
        }
    }
}

/// `[cache]`: where image attachments are stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Attachments are not cached when unset.
    pub dir: Option<PathBuf>,
}

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:19088";
const DEFAULT_HOOK_PORT: u16 = 19089;

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("valid default base url")
}
