use serde::Serialize;
use thiserror::Error;
use wxhook_sdk::objects::Message;

/// Why a sequence of messages is not a valid pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PairError {
    #[error("no messages to pair")]
    Empty,
    #[error("a pair needs exactly 2 messages, got {len}")]
    Malformed { len: usize },
}

/// Two messages in the order the pairing engine accepted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePair {
    first: Message,
    second: Message,
}

impl MessagePair {
    pub fn new(first: Message, second: Message) -> Self {
        Self { first, second }
    }

    pub fn first(&self) -> &Message {
        &self.first
    }

    pub fn second(&self) -> &Message {
        &self.second
    }

    pub fn messages(&self) -> [&Message; 2] {
        [&self.first, &self.second]
    }

    pub fn into_messages(self) -> [Message; 2] {
        [self.first, self.second]
    }

    /// `msg_id`s of both messages, in order.
    pub fn ids(&self) -> (i64, i64) {
        (self.first.msg_id, self.second.msg_id)
    }
}

impl TryFrom<Vec<Message>> for MessagePair {
    type Error = PairError;

    fn try_from(messages: Vec<Message>) -> Result<Self, Self::Error> {
        let len = messages.len();
        let mut iter = messages.into_iter();
        match (iter.next(), iter.next(), iter.next()) {
            (None, _, _) => Err(PairError::Empty),
            (Some(first), Some(second), None) => Ok(Self::new(first, second)),
            _ => Err(PairError::Malformed { len }),
        }
    }
}
