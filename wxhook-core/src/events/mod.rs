//! Messages, pairs, and the queues between them.
//!
//! # Flow
//!
//! 1. The listener decodes a [`Message`] from each connection.
//! 2. The message is pushed onto the pairing engine's input queue.
//! 3. The consumer task combines consecutive messages into a
//!    [`MessagePair`] and pushes it onto the output queue.
//! 4. Callers pull pairs from the output queue.

pub mod channels;
pub mod decoder;
pub mod pair;

pub use channels::{
    MessageReceiver, MessageSender, PairReceiver, PairSender, message_channel, pair_channel,
};
pub use decoder::{DecodeError, decode_message, read_message};
pub use pair::{MessagePair, PairError};

pub use wxhook_sdk::objects::{FileInfo, Message, MsgType};
