//! Message objects pushed by the automation host.
//!
//! The host opens one TCP connection per message and writes a single JSON
//! object:
//!
//! ```json
//! {"content":"hi","createTime":1736240000,"displayFullContent":"",
//!  "fromUser":"wxid_a","msgId":8012345678901234567,"msgSequence":7,
//!  "pid":4242,"signature":"","toUser":"wxid_b","type":1}
//! ```
//!
//! `base64Img` is only present for binary message types.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Integer type tag of a message.
///
/// Unknown tags are preserved in [`MsgType::Other`] so that a new host
/// version never makes a message undecodable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MsgType {
    #[default]
    Text,
    Image,
    Voice,
    ContactCard,
    Video,
    Emoticon,
    Location,
    App,
    System,
    Recalled,
    Other(i64),
}

impl MsgType {
    /// Whether messages of this type carry an embedded binary payload.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            MsgType::Image | MsgType::Voice | MsgType::Video | MsgType::Emoticon
        )
    }
}

impl From<i64> for MsgType {
    fn from(value: i64) -> Self {
        match value {
            1 => MsgType::Text,
            3 => MsgType::Image,
            34 => MsgType::Voice,
            42 => MsgType::ContactCard,
            43 => MsgType::Video,
            47 => MsgType::Emoticon,
            48 => MsgType::Location,
            49 => MsgType::App,
            10000 => MsgType::System,
            10002 => MsgType::Recalled,
            other => MsgType::Other(other),
        }
    }
}

impl From<MsgType> for i64 {
    fn from(value: MsgType) -> Self {
        match value {
            MsgType::Text => 1,
            MsgType::Image => 3,
            MsgType::Voice => 34,
            MsgType::ContactCard => 42,
            MsgType::Video => 43,
            MsgType::Emoticon => 47,
            MsgType::Location => 48,
            MsgType::App => 49,
            MsgType::System => 10000,
            MsgType::Recalled => 10002,
            MsgType::Other(other) => other,
        }
    }
}

/// A file that was written to the local cache on behalf of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Full path on disk.
    pub path: PathBuf,
    /// File name including extension.
    pub name: String,
    /// Extension without the leading dot, empty if none.
    pub ext: String,
    pub is_image: bool,
}

/// One inbound message.
///
/// Immutable once decoded, except for [`Message::attach_file`] which the
/// file cache collaborator may call once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub content: String,
    /// Unix seconds.
    pub create_time: i64,
    #[serde(default)]
    pub display_full_content: String,
    pub from_user: CompactString,
    /// Unique per source, not globally ordered.
    pub msg_id: i64,
    #[serde(default)]
    pub msg_sequence: i64,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub signature: String,
    pub to_user: CompactString,
    #[serde(rename = "type")]
    pub msg_type: MsgType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_img: Option<String>,
    #[serde(skip)]
    pub file_info: Option<FileInfo>,
}

impl Message {
    /// Creation time as reported by the host, if it is a valid timestamp.
    pub fn created_at(&self) -> Option<time::OffsetDateTime> {
        time::OffsetDateTime::from_unix_timestamp(self.create_time).ok()
    }

    /// Attach the cached file for this message. Only the first call wins.
    pub fn attach_file(&mut self, info: FileInfo) -> bool {
        if self.file_info.is_some() {
            return false;
        }
        self.file_info = Some(info);
        true
    }

    /// Cache file name used for this message's attachment.
    pub fn attachment_name(&self) -> String {
        format!("{}_{}", self.from_user, self.msg_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_MESSAGE: &str = r#"{
        "content": "hello",
        "createTime": 1736240000,
        "displayFullContent": "Alice : hello",
        "fromUser": "wxid_alice",
        "msgId": 8012345678901234567,
        "msgSequence": 812345,
        "pid": 4242,
        "signature": "<msgsource/>",
        "toUser": "wxid_bob",
        "type": 1
    }"#;

    #[test]
    fn test_text_message_parsing() {
        let msg: Message = serde_json::from_str(TEXT_MESSAGE).unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.from_user, "wxid_alice");
        assert_eq!(msg.to_user, "wxid_bob");
        assert_eq!(msg.msg_id, 8012345678901234567);
        assert_eq!(msg.msg_type, MsgType::Text);
        assert!(msg.base64_img.is_none());
        assert!(msg.file_info.is_none());
        assert_eq!(msg.created_at().unwrap().year(), 2025);
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let json = TEXT_MESSAGE.replace(r#""type": 1"#, r#""type": 9999"#);
        let msg: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg.msg_type, MsgType::Other(9999));

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["type"], 9999);
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{"content":"x","createTime":0,"fromUser":"a","toUser":"b","msgId":1,"type":3,"base64Img":"aGk="}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.msg_sequence, 0);
        assert_eq!(msg.signature, "");
        assert!(msg.msg_type.is_binary());
        assert_eq!(msg.base64_img.as_deref(), Some("aGk="));
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let json = r#"{"content":"x","createTime":0,"toUser":"b","msgId":1,"type":1}"#;
        assert!(serde_json::from_str::<Message>(json).is_err());
    }

    #[test]
    fn test_attach_file_only_once() {
        let mut msg = Message {
            from_user: "wxid_alice".into(),
            msg_id: 7,
            ..Default::default()
        };
        let info = FileInfo {
            path: PathBuf::from("/tmp/img/wxid_alice_7.png"),
            name: "wxid_alice_7.png".to_string(),
            ext: "png".to_string(),
            is_image: true,
        };
        assert_eq!(msg.attachment_name(), "wxid_alice_7");
        assert!(msg.attach_file(info.clone()));
        assert!(!msg.attach_file(info));
    }
}
