//! Queue factories and handles for the pairing engine.

use super::pair::MessagePair;
use tokio::sync::mpsc;
use wxhook_sdk::objects::Message;

/// Sender handle for raw messages.
pub type MessageSender = mpsc::Sender<Message>;
/// Receiver handle for raw messages.
pub type MessageReceiver = mpsc::Receiver<Message>;

/// Sender handle for completed pairs.
pub type PairSender = mpsc::Sender<MessagePair>;
/// Receiver handle for completed pairs.
pub type PairReceiver = mpsc::Receiver<MessagePair>;

/// Create the bounded input queue.
///
/// `capacity` is clamped to at least 1.
pub fn message_channel(capacity: usize) -> (MessageSender, MessageReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Create the bounded output queue.
///
/// `capacity` is clamped to at least 1.
pub fn pair_channel(capacity: usize) -> (PairSender, PairReceiver) {
    mpsc::channel(capacity.max(1))
}
