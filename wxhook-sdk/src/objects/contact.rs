use serde::{Deserialize, Serialize};

/// One entry of `/api/getContactList`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    pub custom_account: String,
    pub encrypt_name: String,
    pub nickname: String,
    pub pinyin: String,
    pub pinyin_all: String,
    pub reserved1: i64,
    pub reserved2: i64,
    #[serde(rename = "type")]
    pub contact_type: i64,
    pub verify_flag: i64,
    pub wxid: String,
}

impl Contact {
    /// Chat room ids end with `@chatroom`.
    pub fn is_chat_room(&self) -> bool {
        self.wxid.ends_with("@chatroom")
    }
}

/// `/api/getChatRoomDetailInfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRoomInfo {
    pub admin: String,
    pub chat_room_id: String,
    pub notice: String,
    pub xml: String,
}

/// `/api/getMemberFromChatRoom`
///
/// Member ids and nicknames come back as single delimited strings, kept
/// as the host sends them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRoomMembers {
    pub admin: String,
    pub admin_nickname: String,
    pub chat_room_id: String,
    pub member_nickname: String,
    pub members: String,
}

/// `/api/getContactProfile`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub account: String,
    pub head_image: String,
    pub nickname: String,
    pub v3: String,
    pub wxid: String,
}
