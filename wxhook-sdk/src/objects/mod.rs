pub mod account;
pub mod contact;
pub mod message;

pub use account::Account;
pub use contact::{ChatRoomInfo, ChatRoomMembers, Contact, Profile};
pub use message::{FileInfo, Message, MsgType};

use serde::{Deserialize, Serialize};

/// Response envelope returned by every automation host endpoint.
///
/// The meaning of `code` differs per endpoint; callers compare it against
/// the value that endpoint uses for success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResult<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_without_data() {
        let r: ApiResult<Account> = serde_json::from_str(r#"{"code":1,"msg":"success"}"#).unwrap();
        assert_eq!(r.code, 1);
        assert!(r.data.is_none());
    }

    #[test]
    fn test_envelope_with_null_data() {
        let r: ApiResult<Account> =
            serde_json::from_str(r#"{"code":0,"msg":"","data":null}"#).unwrap();
        assert_eq!(r.code, 0);
        assert!(r.data.is_none());
    }
}
