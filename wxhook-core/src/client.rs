//! Client facade.
//!
//! [`PairClient`] wires the TCP listener to the pairing engine behind one
//! shared cancellation token and, when an automation host is configured,
//! hooks the host's message stream and gates pair retrieval on its login
//! state. An optional [`FileCache`] stores image payloads before the
//! messages are paired.

use crate::cache::{FileCache, cache_attachment};
use crate::cancel::CancellationToken;
use crate::config::{ClientConfig, ListenerConfig};
use crate::events::{Message, MessagePair};
use crate::listener::{ListenerError, MessageHandler, MessageListener};
use crate::processors::{PairingEngine, PairingError};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{error, info, warn};
use wxhook_sdk::client::HostClient;

pub use wxhook_sdk::client::ClientError as HostError;

/// The parts of the automation host API the facade depends on.
#[async_trait]
pub trait AutomationHost: Send + Sync {
    /// Register this client as the receiver of the host's message stream.
    async fn hook(&self) -> Result<(), HostError>;

    async fn check_login(&self) -> Result<bool, HostError>;
}

#[async_trait]
impl AutomationHost for HostClient {
    async fn hook(&self) -> Result<(), HostError> {
        self.hook_sync_msg().await
    }

    async fn check_login(&self) -> Result<bool, HostError> {
        HostClient::check_login(self).await
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Bind(ListenerError),

    #[error("the automation host is not logged in")]
    NotLoggedIn,

    #[error("automation host error: {0}")]
    Host(#[from] HostError),

    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error("the client is already running")]
    AlreadyRunning,
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Pairing(e) if e.is_cancelled())
    }
}

/// Forwards every decoded message into the engine under the shared token.
struct EngineSink {
    engine: PairingEngine,
    token: CancellationToken,
    files: Option<Arc<dyn FileCache>>,
}

#[async_trait]
impl MessageHandler for EngineSink {
    type Error = PairingError;

    async fn handle_message(&self, mut message: Message) -> Result<(), PairingError> {
        if let Some(files) = &self.files {
            cache_attachment(files.as_ref(), &mut message).await;
        }
        self.engine.put(&self.token, message).await
    }
}

pub struct PairClient {
    listener: ListenerConfig,
    engine: PairingEngine,
    host: Option<Arc<dyn AutomationHost>>,
    files: Option<Arc<dyn FileCache>>,
    shutdown: CancellationToken,
    ready: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
}

impl PairClient {
    /// Create the client and start its pairing engine.
    ///
    /// `shutdown` becomes the shared token: [`stop`](Self::stop) fires it,
    /// and firing it from outside stops the client as well. Must be called
    /// from within a Tokio runtime.
    pub fn new(config: ClientConfig, shutdown: CancellationToken) -> Self {
        let engine = PairingEngine::spawn(&config.pairing, shutdown.clone());
        Self {
            listener: config.listener,
            engine,
            host: None,
            files: None,
            shutdown,
            ready: AtomicBool::new(false),
            local_addr: OnceLock::new(),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn AutomationHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Store the embedded image of each image message in `files` and
    /// attach the result before the message is paired.
    pub fn with_file_cache(mut self, files: Arc<dyn FileCache>) -> Self {
        self.files = Some(files);
        self
    }

    /// Bind the listener, start accepting, and bring the client to ready.
    ///
    /// With a host configured, the message stream is hooked (a failure is
    /// only logged) and the login state decides readiness. A failed login
    /// check stops the client.
    pub async fn run(&self) -> Result<(), ClientError> {
        if self.local_addr.get().is_some() {
            return Err(ClientError::AlreadyRunning);
        }

        let listener = MessageListener::bind(self.listener.clone())
            .await
            .map_err(ClientError::Bind)?;
        let addr = listener.local_addr().unwrap_or(self.listener.listen);
        if self.local_addr.set(addr).is_err() {
            return Err(ClientError::AlreadyRunning);
        }

        let sink = Arc::new(EngineSink {
            engine: self.engine.clone(),
            token: self.shutdown.clone(),
            files: self.files.clone(),
        });
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            let err = listener.serve(token, sink).await;
            info!(error = %err, "Accept loop exited");
        });

        let Some(host) = &self.host else {
            self.ready.store(true, Ordering::Release);
            info!(%addr, "Pair client ready");
            return Ok(());
        };

        if let Err(e) = host.hook().await {
            warn!(error = %e, "Failed to hook the host message stream");
        }

        match host.check_login().await {
            Ok(true) => {
                self.ready.store(true, Ordering::Release);
                info!(%addr, "Pair client ready");
                Ok(())
            }
            Ok(false) => {
                warn!(%addr, "Automation host is not logged in, pairs will not be served");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login check failed, stopping client");
                self.stop();
                Err(ClientError::Host(e))
            }
        }
    }

    /// Wait for the next pair.
    ///
    /// Unwinds with a cancellation error when either `token` or the shared
    /// token fires.
    pub async fn next_pair(&self, token: &CancellationToken) -> Result<MessagePair, ClientError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(ClientError::NotLoggedIn);
        }

        tokio::select! {
            biased;
            reason = self.shutdown.cancelled() => Err(PairingError::Cancelled(reason).into()),
            pair = self.engine.get(token) => pair.map_err(ClientError::from),
        }
    }

    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stopping pair client");
        }
        self.shutdown.cancel();
    }

    /// The bound address, once [`run`](Self::run) has bound it.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DiskFileCache;
    use crate::cancel::CancelReason;
    use crate::listener::ACK;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    struct FakeHost {
        login: Option<bool>,
        hook_fails: bool,
        hooks: AtomicUsize,
    }

    impl FakeHost {
        fn new(login: Option<bool>, hook_fails: bool) -> Arc<Self> {
            Arc::new(Self {
                login,
                hook_fails,
                hooks: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AutomationHost for FakeHost {
        async fn hook(&self) -> Result<(), HostError> {
            self.hooks.fetch_add(1, Ordering::SeqCst);
            if self.hook_fails {
                return Err(HostError::Api {
                    endpoint: "/api/hookSyncMsg",
                    code: 2,
                    msg: "already hooked".to_string(),
                });
            }
            Ok(())
        }

        async fn check_login(&self) -> Result<bool, HostError> {
            self.login.ok_or_else(|| HostError::MissingData("/api/checkLogin"))
        }
    }

    fn test_config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.listener.listen = "127.0.0.1:0".parse().unwrap();
        config.pairing.pair_timeout = Duration::from_secs(5);
        config
    }

    async fn push(addr: SocketAddr, msg_id: i64) {
        let payload = format!(
            r#"{{"content":"m{msg_id}","createTime":1736240000,"fromUser":"wxid_a","toUser":"wxid_b","msgId":{msg_id},"type":1}}"#
        );
        push_raw(addr, &payload).await;
    }

    async fn push_raw(addr: SocketAddr, payload: &str) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(payload.as_bytes()).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, ACK);
    }

    #[tokio::test]
    async fn test_pairs_messages_end_to_end() {
        let client = PairClient::new(test_config(), CancellationToken::new());
        client.run().await.unwrap();
        let addr = client.local_addr().unwrap();

        push(addr, 1).await;
        push(addr, 2).await;

        let token = CancellationToken::new();
        let pair = client.next_pair(&token).await.unwrap();
        assert_eq!(pair.ids(), (1, 2));
        assert_eq!(pair.second().content, "m2");

        client.stop();
    }

    #[tokio::test]
    async fn test_file_cache_attaches_images() {
        let dir = tempfile::tempdir().unwrap();
        let files = Arc::new(DiskFileCache::new(dir.path()));
        let client = PairClient::new(test_config(), CancellationToken::new())
            .with_file_cache(files.clone());
        client.run().await.unwrap();
        let addr = client.local_addr().unwrap();

        push(addr, 1).await;
        push_raw(
            addr,
            r#"{"content":"","createTime":1736240001,"fromUser":"wxid_a","toUser":"wxid_b","msgId":2,"type":3,"base64Img":"aGVsbG8="}"#,
        )
        .await;

        let pair = client.next_pair(&CancellationToken::new()).await.unwrap();
        assert!(pair.first().file_info.is_none());
        let info = pair.second().file_info.as_ref().unwrap();
        assert_eq!(info.path, dir.path().join("img").join("wxid_a_2.png"));
        assert_eq!(files.read("wxid_a_2.png").await.unwrap(), b"hello");

        client.stop();
    }

    #[tokio::test]
    async fn test_next_pair_before_run_is_not_logged_in() {
        let client = PairClient::new(test_config(), CancellationToken::new());
        let err = client.next_pair(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_logged_out_host_gates_pairs() {
        let host = FakeHost::new(Some(false), false);
        let client = PairClient::new(test_config(), CancellationToken::new()).with_host(host.clone());

        client.run().await.unwrap();
        assert_eq!(host.hooks.load(Ordering::SeqCst), 1);
        assert!(!client.is_ready());

        let err = client.next_pair(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotLoggedIn));
        client.stop();
    }

    #[tokio::test]
    async fn test_hook_failure_is_not_fatal() {
        let host = FakeHost::new(Some(true), true);
        let client = PairClient::new(test_config(), CancellationToken::new()).with_host(host);

        client.run().await.unwrap();
        assert!(client.is_ready());
        client.stop();
    }

    #[tokio::test]
    async fn test_login_check_error_stops_client() {
        let shutdown = CancellationToken::new();
        let host = FakeHost::new(None, false);
        let client = PairClient::new(test_config(), shutdown.clone()).with_host(host);

        let err = client.run().await.unwrap_err();
        assert!(matches!(err, ClientError::Host(HostError::MissingData(_))));
        assert_eq!(shutdown.reason(), Some(CancelReason::Cancelled));
    }

    #[tokio::test]
    async fn test_stop_unblocks_next_pair() {
        let client = Arc::new(PairClient::new(test_config(), CancellationToken::new()));
        client.run().await.unwrap();

        let waiter = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.next_pair(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.stop();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_twice() {
        let client = PairClient::new(test_config(), CancellationToken::new());
        client.run().await.unwrap();
        assert!(matches!(
            client.run().await,
            Err(ClientError::AlreadyRunning)
        ));
        client.stop();
    }

    #[tokio::test]
    async fn test_bind_failure_is_returned() {
        let first = PairClient::new(test_config(), CancellationToken::new());
        first.run().await.unwrap();

        let mut config = test_config();
        config.listener.listen = first.local_addr().unwrap();
        let second = PairClient::new(config, CancellationToken::new());
        assert!(matches!(second.run().await, Err(ClientError::Bind(_))));
        first.stop();
    }
}
