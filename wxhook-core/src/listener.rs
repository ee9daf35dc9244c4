//! TCP listener for messages pushed by the automation host.
//!
//! The host opens one connection per message, writes a single JSON object
//! and waits for the literal bytes `200 OK` before closing. Every
//! connection is acknowledged, including ones whose payload could not be
//! decoded or whose message the handler rejected; those messages are
//! dropped with a warning.
//!
//! Connections are handled concurrently, at most
//! [`ListenerConfig::max_connections`] at a time. The accept loop waits for
//! a free slot before accepting, so excess connections queue in the
//! kernel backlog rather than spawning more tasks.

use crate::cancel::{CancelReason, CancellationToken};
use crate::config::ListenerConfig;
use crate::events::{DecodeError, Message, read_message};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Written back on every connection before it is closed.
pub const ACK: &[u8] = b"200 OK";

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Receives every successfully decoded message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Error: std::fmt::Display + Send;

    async fn handle_message(&self, message: Message) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("listener stopped: {0}")]
    Cancelled(#[from] CancelReason),
}

#[derive(Debug, Error)]
enum ConnectionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no complete message within {0:?}")]
    ReadTimeout(Duration),
}

/// A bound listener, ready to [`serve`](MessageListener::serve).
#[derive(Debug)]
pub struct MessageListener {
    listener: TcpListener,
    limiter: Arc<Semaphore>,
    config: ListenerConfig,
}

impl MessageListener {
    /// Bind the configured address.
    pub async fn bind(config: ListenerConfig) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: config.listen,
                source,
            })?;
        let limiter = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Ok(Self {
            listener,
            limiter,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `token` fires.
    ///
    /// Always ends with [`ListenerError::Cancelled`]; per-connection
    /// failures are logged and never stop the loop.
    pub async fn serve<H: MessageHandler>(
        self,
        token: CancellationToken,
        handler: Arc<H>,
    ) -> ListenerError {
        let addr = self.local_addr().unwrap_or(self.config.listen);
        info!(%addr, max_connections = self.config.max_connections, "Message listener started");

        loop {
            if self.limiter.available_permits() == 0 {
                debug!("Connection limit reached, waiting for a free slot");
            }
            let permit = tokio::select! {
                biased;
                reason = token.cancelled() => return stopped(reason),
                permit = self.limiter.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // The semaphore is never closed while `self` is alive.
                    Err(_) => return stopped(CancelReason::Cancelled),
                },
            };

            let (stream, peer) = tokio::select! {
                biased;
                reason = token.cancelled() => return stopped(reason),
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        drop(permit);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            debug!(%peer, "Accepted connection");
            let handler = Arc::clone(&handler);
            let read_timeout = self.config.read_timeout;
            let max_payload = self.config.max_payload_bytes;
            tokio::spawn(async move {
                let _permit = permit;
                handle_connection(stream, peer, handler.as_ref(), read_timeout, max_payload).await;
            });
        }
    }
}

/// Bind `config.listen` and serve until `token` fires.
///
/// Returns the bind error, or the token's reason once it fires.
pub async fn listen_and_serve<H: MessageHandler>(
    config: ListenerConfig,
    token: CancellationToken,
    handler: Arc<H>,
) -> ListenerError {
    match MessageListener::bind(config).await {
        Ok(listener) => listener.serve(token, handler).await,
        Err(e) => e,
    }
}

fn stopped(reason: CancelReason) -> ListenerError {
    info!(%reason, "Message listener shutting down");
    ListenerError::Cancelled(reason)
}

async fn handle_connection<H: MessageHandler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: &H,
    read_timeout: Duration,
    max_payload: usize,
) {
    match read_with_timeout(&mut stream, read_timeout, max_payload).await {
        Ok(message) => {
            let msg_id = message.msg_id;
            debug!(%peer, msg_id, msg_type = ?message.msg_type, "Parsed message successfully");
            if let Err(e) = handler.handle_message(message).await {
                warn!(%peer, msg_id, error = %e, "Message handler failed, message dropped");
            }
        }
        Err(e) => {
            warn!(%peer, error = %e, "Failed to read message, dropping connection");
        }
    }

    if let Err(e) = acknowledge(&mut stream).await {
        debug!(%peer, error = %e, "Failed to write acknowledgment");
    }
}

async fn read_with_timeout(
    stream: &mut TcpStream,
    read_timeout: Duration,
    max_payload: usize,
) -> Result<Message, ConnectionError> {
    tokio::time::timeout(read_timeout, read_message(stream, max_payload))
        .await
        .map_err(|_| ConnectionError::ReadTimeout(read_timeout))?
        .map_err(ConnectionError::from)
}

async fn acknowledge(stream: &mut TcpStream) -> io::Result<()> {
    stream.write_all(ACK).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tokio::io::AsyncReadExt;
    use tokio::sync::mpsc;

    const MESSAGE: &str = r#"{"content":"hi","createTime":1736240000,"fromUser":"wxid_a","toUser":"wxid_b","msgId":7,"type":1}"#;

    struct Collect(mpsc::UnboundedSender<Message>);

    #[async_trait]
    impl MessageHandler for Collect {
        type Error = Infallible;

        async fn handle_message(&self, message: Message) -> Result<(), Infallible> {
            let _ = self.0.send(message);
            Ok(())
        }
    }

    struct Reject;

    #[async_trait]
    impl MessageHandler for Reject {
        type Error = String;

        async fn handle_message(&self, _message: Message) -> Result<(), String> {
            Err("buffer full".to_string())
        }
    }

    fn test_config() -> ListenerConfig {
        ListenerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            read_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    async fn start<H: MessageHandler>(
        config: ListenerConfig,
        handler: H,
    ) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<ListenerError>) {
        let listener = MessageListener::bind(config).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(listener.serve(token.clone(), Arc::new(handler)));
        (addr, token, handle)
    }

    /// Send `payload` without closing the write half and return the reply.
    async fn send(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(payload).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_message_is_handled_and_acknowledged() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (addr, _token, _handle) = start(test_config(), Collect(tx)).await;

        assert_eq!(send(addr, MESSAGE.as_bytes()).await, ACK);
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.msg_id, 7);
        assert_eq!(msg.to_user, "wxid_b");
    }

    #[tokio::test]
    async fn test_malformed_input_keeps_listener_alive() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (addr, _token, _handle) = start(test_config(), Collect(tx)).await;

        assert_eq!(send(addr, b"not json at all").await, ACK);
        assert_eq!(
            send(addr, br#"{"content":"x","createTime":0,"toUser":"b","msgId":1,"type":1}"#).await,
            ACK
        );
        assert_eq!(send(addr, MESSAGE.as_bytes()).await, ACK);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.msg_id, 7);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handler_failure_is_still_acknowledged() {
        let (addr, _token, _handle) = start(test_config(), Reject).await;
        assert_eq!(send(addr, MESSAGE.as_bytes()).await, ACK);
        assert_eq!(send(addr, MESSAGE.as_bytes()).await, ACK);
    }

    #[tokio::test]
    async fn test_cancel_stops_accept_loop() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_addr, token, handle) = start(test_config(), Collect(tx)).await;

        token.cancel();
        let err = handle.await.unwrap();
        assert!(matches!(err, ListenerError::Cancelled(CancelReason::Cancelled)));
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (addr, _token, _handle) = start(test_config(), Collect(tx)).await;

        let config = ListenerConfig {
            listen: addr,
            ..Default::default()
        };
        let err = listen_and_serve(config, CancellationToken::new(), Arc::new(Reject)).await;
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_connection_limit_queues_connections() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = ListenerConfig {
            max_connections: 1,
            read_timeout: Duration::from_millis(300),
            ..test_config()
        };
        let (addr, _token, _handle) = start(config, Collect(tx)).await;

        // Holds the only slot until its read times out.
        let mut idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let queued = tokio::spawn(send(addr, MESSAGE.as_bytes()));
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );

        let mut reply = Vec::new();
        idle.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, ACK);

        assert_eq!(queued.await.unwrap(), ACK);
        assert_eq!(rx.recv().await.unwrap().msg_id, 7);
    }
}
