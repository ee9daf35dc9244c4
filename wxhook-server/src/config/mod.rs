//! Configuration module for wxhook-server.
//!
//! Handles loading configuration from an optional TOML file and applying
//! CLI/environment overrides on top of it.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{HostSettings, LoadedConfig};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;
use wxhook_core::config::{ClientConfig, ListenerConfig, PairingConfig};
use wxhook_sdk::client::HookAddr;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid listen address {0:?}, expected host:port or a port")]
    InvalidListen(String),

    #[error("invalid hook address {0:?}, expected host:port")]
    InvalidHookAddr(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Values taken from CLI flags or their environment fallbacks.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub api_base_url: Option<Url>,
    pub hook_addr: Option<String>,
    pub disable_host: bool,
    pub cache_dir: Option<PathBuf>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    overrides: Overrides,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, overrides: Overrides) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, if it exists
    /// 2. Apply CLI/env overrides
    /// 3. Validate the configuration
    /// 4. Build the runtime configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config = self.read_file()?;
        self.apply_overrides(&mut file_config);
        validate(&file_config)?;
        build_loaded_config(file_config)
    }

    fn read_file(&self) -> Result<FileConfig, ConfigError> {
        match std::fs::read_to_string(&self.config_path) {
            Ok(content) => {
                tracing::info!(path = %self.config_path.display(), "Configuration file loaded");
                Ok(toml::from_str(&content)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.config_path.display(),
                    "No configuration file, using defaults"
                );
                Ok(FileConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply_overrides(&self, config: &mut FileConfig) {
        if let Some(listen) = &self.overrides.listen {
            config.listener.listen = listen.clone();
        }
        if let Some(base_url) = &self.overrides.api_base_url {
            config.host.base_url = base_url.clone();
        }
        if let Some(hook_addr) = &self.overrides.hook_addr {
            config.host.hook_addr = hook_addr.clone();
        }
        if self.overrides.disable_host {
            config.host.enabled = false;
        }
        if let Some(dir) = &self.overrides.cache_dir {
            config.cache.dir = Some(dir.clone());
        }
    }
}

/// Parse `host:port`, `:port` or a bare port (bound on all interfaces).
pub fn parse_listen_addr(s: &str) -> Result<SocketAddr, ConfigError> {
    let s = s.trim();
    let port = s.strip_prefix(':').unwrap_or(s);
    if let Ok(port) = port.parse::<u16>() {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }
    s.parse()
        .map_err(|_| ConfigError::InvalidListen(s.to_string()))
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.pairing.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "pairing.capacity must be greater than 0".to_string(),
        ));
    }
    if config.pairing.pair_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "pairing.pair_timeout_ms must be greater than 0".to_string(),
        ));
    }
    if config.listener.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "listener.max_connections must be greater than 0".to_string(),
        ));
    }
    if config.listener.read_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "listener.read_timeout_ms must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn build_loaded_config(config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let listener = ListenerConfig {
        listen: parse_listen_addr(&config.listener.listen)?,
        max_connections: config.listener.max_connections,
        read_timeout: Duration::from_millis(config.listener.read_timeout_ms),
        max_payload_bytes: config.listener.max_payload_bytes,
    };
    let pairing = PairingConfig {
        capacity: config.pairing.capacity,
        pair_timeout: Duration::from_millis(config.pairing.pair_timeout_ms),
        put_retry_delays: config
            .pairing
            .put_retry_delays_ms
            .into_iter()
            .map(Duration::from_millis)
            .collect(),
    };

    let host = if config.host.enabled {
        let hook_addr: HookAddr = config
            .host
            .hook_addr
            .parse()
            .map_err(|_| ConfigError::InvalidHookAddr(config.host.hook_addr.clone()))?;
        Some(HostSettings {
            base_url: config.host.base_url,
            hook_addr,
        })
    } else {
        None
    };

    Ok(LoadedConfig {
        client: ClientConfig { listener, pairing },
        host,
        cache_dir: config.cache.dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_listen_addr() {
        assert_eq!(
            parse_listen_addr("19099").unwrap(),
            "0.0.0.0:19099".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_addr(":8080").unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:3000").unwrap(),
            "127.0.0.1:3000".parse::<SocketAddr>().unwrap()
        );
        assert!(matches!(
            parse_listen_addr("localhost"),
            Err(ConfigError::InvalidListen(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("absent.toml"), Overrides::default());

        let loaded = loader.load().unwrap();
        assert_eq!(loaded.client, ClientConfig::default());
        let host = loaded.host.unwrap();
        assert_eq!(host.hook_addr.to_string(), "127.0.0.1:19089");
    }

    #[test]
    fn test_file_values_and_overrides() {
        let file = write_config(
            r#"
[listener]
listen = "127.0.0.1:20000"

[pairing]
capacity = 10
pair_timeout_ms = 500
put_retry_delays_ms = [25]

[host]
hook_addr = "10.0.0.3:20000"
"#,
        );
        let overrides = Overrides {
            listen: Some("21000".to_string()),
            api_base_url: Some("http://10.0.0.2:19088".parse().unwrap()),
            ..Default::default()
        };

        let loaded = ConfigLoader::new(file.path(), overrides).load().unwrap();
        assert_eq!(loaded.client.listener.listen.port(), 21000);
        assert!(loaded.client.listener.listen.ip().is_unspecified());
        assert_eq!(loaded.client.pairing.capacity, 10);
        assert_eq!(loaded.client.pairing.pair_timeout, Duration::from_millis(500));
        assert_eq!(
            loaded.client.pairing.put_retry_delays,
            vec![Duration::from_millis(25)]
        );

        let host = loaded.host.unwrap();
        assert_eq!(host.base_url.as_str(), "http://10.0.0.2:19088/");
        assert_eq!(host.hook_addr.port, 20000);
        assert!(loaded.cache_dir.is_none());
    }

    #[test]
    fn test_cache_dir_override() {
        let file = write_config("[cache]\ndir = \"/srv/from-file\"\n");
        let loaded = ConfigLoader::new(file.path(), Overrides::default()).load().unwrap();
        assert_eq!(loaded.cache_dir, Some(PathBuf::from("/srv/from-file")));

        let overrides = Overrides {
            cache_dir: Some(PathBuf::from("/srv/from-cli")),
            ..Default::default()
        };
        let loaded = ConfigLoader::new(file.path(), overrides).load().unwrap();
        assert_eq!(loaded.cache_dir, Some(PathBuf::from("/srv/from-cli")));
    }

    #[test]
    fn test_disable_host() {
        let file = write_config("[host]\nhook_addr = \"not an address\"\n");
        let overrides = Overrides {
            disable_host: true,
            ..Default::default()
        };
        let loaded = ConfigLoader::new(file.path(), overrides).load().unwrap();
        assert!(loaded.host.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let file = write_config("[pairing]\ncapacity = 0\n");
        assert!(matches!(
            ConfigLoader::new(file.path(), Overrides::default()).load(),
            Err(ConfigError::ValidationError(_))
        ));

        let file = write_config("[listener]\nmax_connections = 0\n");
        assert!(matches!(
            ConfigLoader::new(file.path(), Overrides::default()).load(),
            Err(ConfigError::ValidationError(_))
        ));

        let file = write_config("[host]\nhook_addr = \"no-port\"\n");
        assert!(matches!(
            ConfigLoader::new(file.path(), Overrides::default()).load(),
            Err(ConfigError::InvalidHookAddr(_))
        ));

        let file = write_config("[pairing\n");
        assert!(matches!(
            ConfigLoader::new(file.path(), Overrides::default()).load(),
            Err(ConfigError::ParseError(_))
        ));
    }
}
