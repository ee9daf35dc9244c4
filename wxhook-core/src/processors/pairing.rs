//! Pairing engine.
//!
//! The engine is responsible for:
//! - Accepting messages into a bounded input queue, retrying briefly when
//!   it is full
//! - Running a single consumer task that owns the pending slot and its
//!   deadline
//! - Combining each pending message with the next one into a
//!   [`MessagePair`] on a bounded output queue
//! - Discarding a pending message whose deadline elapses
//!
//! The deadline is not an independent timer. It is one more input of the
//! consumer's serial loop, next to incoming messages, so the pending slot
//! is never touched concurrently. When a message is dequeued, an already
//! elapsed deadline is applied first: the stale message is discarded and
//! the new one starts a fresh pending slot.

use crate::cancel::{CancelReason, CancellationToken};
use crate::config::PairingConfig;
use crate::events::{
    Message, MessagePair, MessageReceiver, MessageSender, PairReceiver, PairSender,
    message_channel, pair_channel,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors returned by [`PairingEngine::put`] and [`PairingEngine::get`].
#[derive(Debug, Error)]
pub enum PairingError {
    /// The input queue stayed full through every retry.
    #[error("the message buffer is full after {attempts} attempts")]
    BufferFull { attempts: usize },

    /// The caller's token fired while waiting.
    #[error("pairing engine call cancelled: {0}")]
    Cancelled(#[from] CancelReason),

    /// The consumer task has stopped.
    #[error("pairing engine has shut down")]
    Closed,
}

impl PairingError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PairingError::Cancelled(_))
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Pending {
    message: Message,
    deadline: Instant,
}

/// The pending slot and its transitions.
///
/// `Empty + message -> Pending`, `Pending + message -> Empty` (pair),
/// `Pending + deadline -> Empty` (discard).
#[derive(Debug)]
pub struct PairingState {
    timeout: Duration,
    pending: Option<Pending>,
}

impl PairingState {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending message expires, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Feed a message dequeued at `now`.
    pub fn on_message(&mut self, message: Message, now: Instant) -> Option<MessagePair> {
        self.expire(now);
        match self.pending.take() {
            Some(pending) => Some(MessagePair::new(pending.message, message)),
            None => {
                self.pending = Some(Pending {
                    message,
                    deadline: now + self.timeout,
                });
                None
            }
        }
    }

    /// Apply the deadline at `now`. Returns the discarded message, if any.
    pub fn on_deadline(&mut self, now: Instant) -> Option<Message> {
        self.expire(now)
    }

    /// Empty the slot without treating it as a timeout.
    pub fn take_pending(&mut self) -> Option<Message> {
        self.pending.take().map(|p| p.message)
    }

    fn expire(&mut self, now: Instant) -> Option<Message> {
        if !self.pending.as_ref().is_some_and(|p| p.deadline <= now) {
            return None;
        }
        let pending = self.pending.take()?;
        warn!(
            msg_id = pending.message.msg_id,
            from_user = %pending.message.from_user,
            timeout_ms = self.timeout.as_millis() as u64,
            "Unpaired message timed out, discarding"
        );
        Some(pending.message)
    }
}

// ---------------------------------------------------------------------------
// PairingEngine
// ---------------------------------------------------------------------------

/// Handle to a running pairing engine. Cheap to clone.
///
/// The consumer task stops when `shutdown` fires or when every handle has
/// been dropped.
#[derive(Clone)]
pub struct PairingEngine {
    input_tx: MessageSender,
    output_rx: Arc<Mutex<PairReceiver>>,
    retry_delays: Arc<[Duration]>,
}

impl PairingEngine {
    /// Create the queues and spawn the consumer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: &PairingConfig, shutdown: CancellationToken) -> Self {
        let (input_tx, input_rx) = message_channel(config.capacity);
        let (output_tx, output_rx) = pair_channel(config.output_capacity());

        let consumer = PairingConsumer {
            input_rx,
            output_tx,
            state: PairingState::new(config.pair_timeout),
            shutdown,
        };
        tokio::spawn(consumer.run());

        Self {
            input_tx,
            output_rx: Arc::new(Mutex::new(output_rx)),
            retry_delays: config.put_retry_delays.clone().into(),
        }
    }

    /// Enqueue a message.
    ///
    /// When the input queue is full, waits out each configured retry delay
    /// and tries again. `token` is honoured before every attempt and
    /// during every wait.
    pub async fn put(&self, token: &CancellationToken, message: Message) -> Result<(), PairingError> {
        let msg_id = message.msg_id;
        let attempts = self.retry_delays.len() + 1;
        let mut message = message;

        for attempt in 1..=attempts {
            if let Some(reason) = token.reason() {
                return Err(PairingError::Cancelled(reason));
            }

            match self.input_tx.try_send(message) {
                Ok(()) => {
                    debug!(msg_id, attempt, "Put message to buffer");
                    return Ok(());
                }
                Err(TrySendError::Closed(_)) => return Err(PairingError::Closed),
                Err(TrySendError::Full(returned)) => {
                    message = returned;
                    let Some(delay) = self.retry_delays.get(attempt - 1).copied() else {
                        break;
                    };
                    warn!(msg_id, attempt, attempts, "Message buffer is full, retrying");
                    tokio::select! {
                        biased;
                        reason = token.cancelled() => return Err(PairingError::Cancelled(reason)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        warn!(msg_id, attempts, "Message buffer is full, giving up");
        Err(PairingError::BufferFull { attempts })
    }

    /// Wait for the next completed pair.
    ///
    /// Returns immediately if `token` has already fired.
    pub async fn get(&self, token: &CancellationToken) -> Result<MessagePair, PairingError> {
        if let Some(reason) = token.reason() {
            return Err(PairingError::Cancelled(reason));
        }

        tokio::select! {
            biased;
            reason = token.cancelled() => Err(PairingError::Cancelled(reason)),
            pair = async { self.output_rx.lock().await.recv().await } => {
                let pair = pair.ok_or(PairingError::Closed)?;
                debug!(
                    first = pair.first().msg_id,
                    second = pair.second().msg_id,
                    "Retrieved message pair from buffer"
                );
                Ok(pair)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer task
// ---------------------------------------------------------------------------

enum Input {
    Message(Message),
    Expired,
}

struct PairingConsumer {
    input_rx: MessageReceiver,
    output_tx: PairSender,
    state: PairingState,
    shutdown: CancellationToken,
}

impl PairingConsumer {
    async fn run(mut self) {
        info!("Pairing engine started");

        loop {
            let deadline = self.state.deadline();
            let input = tokio::select! {
                biased;

                // Shutdown has highest priority.
                reason = self.shutdown.cancelled() => {
                    info!(%reason, "Pairing engine received shutdown signal");
                    break;
                }

                received = self.input_rx.recv() => match received {
                    Some(message) => Input::Message(message),
                    None => {
                        info!("Message channel closed");
                        break;
                    }
                },

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Input::Expired
                }
            };

            let now = Instant::now();
            let pair = match input {
                Input::Message(message) => {
                    debug!(msg_id = message.msg_id, "Consumed message");
                    self.state.on_message(message, now)
                }
                Input::Expired => {
                    self.state.on_deadline(now);
                    None
                }
            };

            if let Some(pair) = pair {
                if !self.emit(pair).await {
                    break;
                }
            }
        }

        if let Some(message) = self.state.take_pending() {
            warn!(msg_id = message.msg_id, "Discarding pending message on shutdown");
        }
        info!("Pairing engine shutdown complete");
    }

    /// Push a pair to the output queue. Returns `false` if the engine
    /// should stop.
    async fn emit(&self, pair: MessagePair) -> bool {
        let (first, second) = pair.ids();
        tokio::select! {
            biased;
            reason = self.shutdown.cancelled() => {
                warn!(first, second, %reason, "Dropping completed pair on shutdown");
                false
            }
            sent = self.output_tx.send(pair) => match sent {
                Ok(()) => {
                    debug!(first, second, "Emitted message pair");
                    true
                }
                Err(_) => {
                    info!("Pair channel closed");
                    false
                }
            }
        }
    }
}
