//! Runtime configuration produced by the loader.

use std::path::PathBuf;
use url::Url;
use wxhook_core::config::ClientConfig;
use wxhook_sdk::client::{HookAddr, HostClient};

/// Validated configuration for one server run.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub client: ClientConfig,
    /// `None` when the host integration is disabled.
    pub host: Option<HostSettings>,
    /// Attachment cache root, if caching is enabled.
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    pub base_url: Url,
    pub hook_addr: HookAddr,
}

impl HostSettings {
    pub fn build_client(&self) -> HostClient {
        HostClient::new(self.base_url.clone(), self.hook_addr.clone())
    }
}
