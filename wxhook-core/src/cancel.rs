//! Fire-once cancellation signal shared by the listener, the pairing
//! engine and their callers.
//!
//! Built on a `watch` channel holding `Option<CancelReason>`: `None` while
//! live, `Some(reason)` once fired. The first reason wins.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Why a token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelReason {
    /// [`CancellationToken::cancel`] was called on the token or a parent.
    #[error("operation cancelled")]
    Cancelled,
    /// The timeout of a [`CancellationToken::with_timeout`] child elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// A cloneable cancellation signal. Clones share the same state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<Option<CancelReason>>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the token. Has no effect if it already fired.
    pub fn cancel(&self) {
        fire(&self.tx, CancelReason::Cancelled);
    }

    /// The reason this token fired, or `None` if it is still live.
    pub fn reason(&self) -> Option<CancelReason> {
        *self.tx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait until the token fires. Resolves immediately if it already has.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => {
                let reason = *reason;
                reason.unwrap_or(CancelReason::Cancelled)
            }
            // `self` keeps the sender alive, so the channel cannot close.
            Err(_) => CancelReason::Cancelled,
        }
    }

    /// Create a child token that fires with
    /// [`CancelReason::DeadlineExceeded`] after `timeout`, or with the
    /// parent's reason if the parent fires first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> CancellationToken {
        let child = CancellationToken::new();
        if let Some(reason) = self.reason() {
            fire(&child.tx, reason);
            return child;
        }

        let parent = self.clone();
        let weak = Arc::downgrade(&child.tx);
        // Resolves once the child fires on its own or every clone is dropped.
        let mut child_rx = child.tx.subscribe();
        tokio::spawn(async move {
            let reason = tokio::select! {
                reason = parent.cancelled() => reason,
                _ = tokio::time::sleep(timeout) => CancelReason::DeadlineExceeded,
                _ = child_rx.changed() => return,
            };
            if let Some(tx) = weak.upgrade() {
                fire(&tx, reason);
            }
        });
        child
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

fn fire(tx: &watch::Sender<Option<CancelReason>>, reason: CancelReason) -> bool {
    tx.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(reason);
        true
    })
}
