//! HTTP client for the automation host API.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the wire objects do not pull in `reqwest`.

mod host;

pub use host::{HookAddr, HostClient};

use reqwest::StatusCode;

/// Errors produced by the host HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, connection refused, reset, ...).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The host returned a non-2xx status code.
    #[error("unexpected status {status}, body: {body}")]
    Status { status: StatusCode, body: String },

    /// The host answered, but with a failure code in the envelope.
    #[error("{endpoint} failed: code {code}, msg: {msg}")]
    Api {
        endpoint: &'static str,
        code: i64,
        msg: String,
    },

    /// A successful envelope carried no `data`.
    #[error("{0} returned no data")]
    MissingData(&'static str),

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The hook address is not `host:port`.
    #[error("invalid hook address: {0}")]
    InvalidHookAddr(String),
}
