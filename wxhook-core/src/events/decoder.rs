//! Decoding of the one-JSON-object-per-connection wire format.
//!
//! The host keeps its side of the connection open until it has read the
//! acknowledgment, so [`read_message`] stops as soon as one complete JSON
//! value has arrived instead of waiting for EOF.

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use wxhook_sdk::objects::Message;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not JSON, or JSON that is not a valid message.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("stream ended before a complete message arrived ({received} bytes read)")]
    Incomplete { received: usize },

    #[error("message exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode one message from a complete buffer.
pub fn decode_message(bytes: &[u8]) -> Result<Message, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| {
        if e.is_eof() {
            DecodeError::Incomplete {
                received: bytes.len(),
            }
        } else {
            DecodeError::Malformed(e)
        }
    })
}

/// Read from `reader` until one complete message has arrived.
///
/// Bytes after the first JSON value are ignored and do not count towards
/// `max_len`.
pub async fn read_message<R>(reader: &mut R, max_len: usize) -> Result<Message, DecodeError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        let start = buf.len();
        if reader.read_buf(&mut buf).await? == 0 {
            return match first_value(&buf, max_len) {
                Some(result) => result,
                None => Err(DecodeError::Incomplete {
                    received: buf.len(),
                }),
            };
        }

        // An object can only be complete once a closing brace has arrived.
        let looks_like_object = buf.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{');
        if !looks_like_object || buf[start..].contains(&b'}') {
            if let Some(result) = first_value(&buf, max_len) {
                return result;
            }
        }

        if buf.len() > max_len {
            return Err(DecodeError::TooLarge { limit: max_len });
        }
    }
}

/// Parse the first JSON value in `buf`, or `None` if it is still incomplete.
fn first_value(buf: &[u8], max_len: usize) -> Option<Result<Message, DecodeError>> {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Message>();
    match stream.next()? {
        Ok(_) if stream.byte_offset() > max_len => {
            Some(Err(DecodeError::TooLarge { limit: max_len }))
        }
        Ok(message) => Some(Ok(message)),
        Err(e) if e.is_eof() => None,
        Err(e) => Some(Err(DecodeError::Malformed(e))),
    }
}
