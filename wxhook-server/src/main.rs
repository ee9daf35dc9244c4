//! wxhook server
//!
//! Receives messages pushed by the automation host, pairs them, and writes
//! each pair to stdout as one JSON line.

mod config;
mod shutdown;

use clap::Parser;
use config::{ConfigLoader, Overrides};
use shutdown::shutdown_signal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;
use wxhook_core::{CancellationToken, ClientError, DiskFileCache, PairClient};

/// wxhook - pairs messages pushed by a chat automation host
#[derive(Parser, Debug)]
#[command(name = "wxhook-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (optional)
    #[arg(short, long, default_value = "./wxhook.toml")]
    config: PathBuf,

    /// Override the listen address (host:port or a bare port)
    #[arg(short, long, env = "TCP_ADDR")]
    listen: Option<String>,

    /// Override the automation host API base URL
    #[arg(long, env = "WX_API_BASE_URL")]
    api_base_url: Option<Url>,

    /// Override the address the host pushes messages to (host:port)
    #[arg(long, env = "WX_HOOK_URL")]
    hook_addr: Option<String>,

    /// Do not hook or check login; serve pairs as soon as bound
    #[arg(long, default_value = "false")]
    no_host: bool,

    /// Store image attachments under this directory
    #[arg(long, env = "WX_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen: self.listen.clone(),
            api_base_url: self.api_base_url.clone(),
            hook_addr: self.hook_addr.clone(),
            disable_host: self.no_host,
            cache_dir: self.cache_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting wxhook-server v{}", env!("CARGO_PKG_VERSION"));

    let loaded = ConfigLoader::new(&args.config, args.overrides())
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;

    let shutdown = CancellationToken::new();
    let mut client = PairClient::new(loaded.client, shutdown.clone());
    if let Some(host) = &loaded.host {
        tracing::info!(base_url = %host.base_url, hook_addr = %host.hook_addr, "Automation host configured");
        client = client.with_host(Arc::new(host.build_client()));
    }
    if let Some(dir) = &loaded.cache_dir {
        tracing::info!(dir = %dir.display(), "Caching image attachments");
        client = client.with_file_cache(Arc::new(DiskFileCache::new(dir)));
    }
    let client = Arc::new(client);

    client.run().await.map_err(|e| {
        tracing::error!("Failed to start client: {}", e);
        e
    })?;

    {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            if let Err(e) = shutdown_signal().await {
                tracing::error!("Failed to install signal handlers: {}", e);
            }
            client.stop();
        });
    }

    let result = write_pairs(&client, &shutdown).await;
    client.stop();
    tracing::info!("Server shutdown complete");
    result
}

/// Write pairs to stdout until the client stops.
async fn write_pairs(client: &PairClient, token: &CancellationToken) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    loop {
        match client.next_pair(token).await {
            Ok(pair) => {
                let mut line = serde_json::to_vec(&pair)?;
                line.push(b'\n');
                stdout.write_all(&line).await?;
                stdout.flush().await?;
            }
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(ClientError::NotLoggedIn) => {
                anyhow::bail!("automation host is not logged in");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Logs go to stderr so stdout carries only pairs.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
