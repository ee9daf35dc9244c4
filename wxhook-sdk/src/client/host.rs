//! Automation host client (this process → host HTTP API).
//!
//! Every endpoint is a `POST` with a JSON body and answers with an
//! [`ApiResult`] envelope. Which `code` means success differs per endpoint.

use std::fmt;
use std::str::FromStr;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::ClientError;
use crate::objects::{Account, ApiResult, ChatRoomInfo, ChatRoomMembers, Contact, Profile};

const CHECK_LOGIN: &str = "/api/checkLogin";
const USER_INFO: &str = "/api/userInfo";
const SEND_TEXT: &str = "/api/sendTextMsg";
const SEND_IMAGE: &str = "/api/sendImagesMsg";
const SEND_FILE: &str = "/api/sendFileMsg";
const HOOK_SYNC_MSG: &str = "/api/hookSyncMsg";
const UNHOOK_SYNC_MSG: &str = "/api/unhookSyncMsg";
const CONTACT_LIST: &str = "/api/getContactList";
const CHAT_ROOM_DETAIL: &str = "/api/getChatRoomDetailInfo";
const CHAT_ROOM_MEMBERS: &str = "/api/getMemberFromChatRoom";
const CONTACT_PROFILE: &str = "/api/getContactProfile";
const SEND_AT_TEXT: &str = "/api/sendAtText";
const ADD_CHAT_ROOM_MEMBER: &str = "/api/addMemberToChatRoom";
const INVITE_CHAT_ROOM_MEMBER: &str = "/api/InviteMemberToChatRoom";
const FORWARD_MSG: &str = "/api/forwardMsg";
const QUIT_CHAT_ROOM: &str = "/api/quitChatRoom";

/// Address the host pushes messages to once hooked, as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookAddr {
    pub ip: String,
    pub port: u16,
}

impl FromStr for HookAddr {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ClientError::InvalidHookAddr(s.to_string()))?;
        if ip.is_empty() {
            return Err(ClientError::InvalidHookAddr(s.to_string()));
        }
        let port = port
            .parse()
            .map_err(|_| ClientError::InvalidHookAddr(s.to_string()))?;
        Ok(Self {
            ip: ip.to_string(),
            port,
        })
    }
}

impl fmt::Display for HookAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
struct SendText<'a> {
    wxid: &'a str,
    msg: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendImage<'a> {
    wxid: &'a str,
    image_path: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendFile<'a> {
    wxid: &'a str,
    file_path: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRoomId<'a> {
    chat_room_id: &'a str,
}

#[derive(Serialize)]
struct Wxid<'a> {
    wxid: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendAtText<'a> {
    /// Comma separated.
    wxids: String,
    chat_room_id: &'a str,
    msg: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRoomMemberIds<'a> {
    chat_room_id: &'a str,
    /// Comma separated.
    member_ids: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ForwardMsg<'a> {
    wxid: &'a str,
    msg_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HookSyncMsg<'a> {
    ip: &'a str,
    port: String,
    enable_http: bool,
}

/// Typed HTTP client for the automation host.
#[derive(Debug, Clone)]
pub struct HostClient {
    http: Client,
    base_url: Url,
    hook_addr: HookAddr,
}

impl HostClient {
    /// Create a new `HostClient`.
    ///
    /// * `base_url` – root URL of the host API (e.g. `http://127.0.0.1:19088`).
    /// * `hook_addr` – where the host should push messages once hooked.
    pub fn new(base_url: Url, hook_addr: HookAddr) -> Self {
        Self {
            http: Client::new(),
            base_url,
            hook_addr,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn hook_addr(&self) -> &HookAddr {
        &self.hook_addr
    }

    /// `POST /api/checkLogin` – whether the host has a logged-in account.
    pub async fn check_login(&self) -> Result<bool, ClientError> {
        let r: ApiResult<serde_json::Value> = self.call(CHECK_LOGIN, &Empty {}).await?;
        Ok(r.code == 1)
    }

    /// `POST /api/userInfo` – the logged-in account.
    pub async fn user_info(&self) -> Result<Account, ClientError> {
        let r: ApiResult<Account> = self.call(USER_INFO, &Empty {}).await?;
        expect_data(USER_INFO, r, |code| code == 1)
    }

    /// `POST /api/sendTextMsg`
    pub async fn send_text(&self, to: &str, content: &str) -> Result<(), ClientError> {
        let r: ApiResult<serde_json::Value> = self
            .call(SEND_TEXT, &SendText { wxid: to, msg: content })
            .await?;
        expect_code(SEND_TEXT, r, |code| code == 0)
    }

    /// `POST /api/sendImagesMsg` – `image_path` is a path on the host machine.
    pub async fn send_image(&self, to: &str, image_path: &str) -> Result<(), ClientError> {
        let r: ApiResult<serde_json::Value> = self
            .call(
                SEND_IMAGE,
                &SendImage {
                    wxid: to,
                    image_path,
                },
            )
            .await?;
        expect_code(SEND_IMAGE, r, |code| code == 1)
    }

    /// `POST /api/sendFileMsg` – `file_path` is a path on the host machine.
    pub async fn send_file(&self, to: &str, file_path: &str) -> Result<(), ClientError> {
        let r: ApiResult<serde_json::Value> = self
            .call(SEND_FILE, &SendFile { wxid: to, file_path })
            .await?;
        expect_code(SEND_FILE, r, |code| code != 0)
    }

    /// `POST /api/unhookSyncMsg`
    pub async fn unhook_sync_msg(&self) -> Result<(), ClientError> {
        let r: ApiResult<serde_json::Value> = self.call(UNHOOK_SYNC_MSG, &Empty {}).await?;
        expect_code(UNHOOK_SYNC_MSG, r, |code| code == 0)
    }

    /// Register [`hook_addr`](Self::hook_addr) as the TCP push target.
    ///
    /// The host keeps at most one hook, so any previous one is removed
    /// first. The unhook answer is not checked: a host with nothing hooked
    /// reports a failure code there.
    pub async fn hook_sync_msg(&self) -> Result<(), ClientError> {
        let unhook: ApiResult<serde_json::Value> = self.call(UNHOOK_SYNC_MSG, &Empty {}).await?;
        if unhook.code != 0 {
            debug!(code = unhook.code, msg = %unhook.msg, "Unhook before hook was refused, continuing");
        }

        let body = HookSyncMsg {
            ip: &self.hook_addr.ip,
            port: self.hook_addr.port.to_string(),
            enable_http: false,
        };
        let r: ApiResult<serde_json::Value> = self.call(HOOK_SYNC_MSG, &body).await?;
        expect_code(HOOK_SYNC_MSG, r, |code| code == 0)?;
        debug!(hook_addr = %self.hook_addr, "Message stream hooked");
        Ok(())
    }

    /// `POST /api/getContactList`
    ///
    /// The host sends no meaningful code here; a missing list is empty.
    pub async fn contact_list(&self) -> Result<Vec<Contact>, ClientError> {
        let r: ApiResult<Vec<Contact>> = self.call(CONTACT_LIST, &Empty {}).await?;
        Ok(r.data.unwrap_or_default())
    }

    /// `POST /api/getChatRoomDetailInfo`
    pub async fn chat_room_detail(&self, chat_room_id: &str) -> Result<ChatRoomInfo, ClientError> {
        let r = self
            .call(CHAT_ROOM_DETAIL, &ChatRoomId { chat_room_id })
            .await?;
        expect_data(CHAT_ROOM_DETAIL, r, |code| code == 1)
    }

    /// `POST /api/getMemberFromChatRoom`
    pub async fn chat_room_members(
        &self,
        chat_room_id: &str,
    ) -> Result<ChatRoomMembers, ClientError> {
        let r = self
            .call(CHAT_ROOM_MEMBERS, &ChatRoomId { chat_room_id })
            .await?;
        expect_data(CHAT_ROOM_MEMBERS, r, |code| code == 1)
    }

    /// `POST /api/getContactProfile`
    pub async fn contact_profile(&self, wxid: &str) -> Result<Profile, ClientError> {
        let r = self.call(CONTACT_PROFILE, &Wxid { wxid }).await?;
        expect_data(CONTACT_PROFILE, r, |code| code >= 0)
    }

    /// `POST /api/sendAtText` – mention `wxids` in a chat room message.
    pub async fn send_at_text(
        &self,
        chat_room_id: &str,
        wxids: &[&str],
        content: &str,
    ) -> Result<(), ClientError> {
        let body = SendAtText {
            wxids: wxids.join(","),
            chat_room_id,
            msg: content,
        };
        let r: ApiResult<serde_json::Value> = self.call(SEND_AT_TEXT, &body).await?;
        expect_code(SEND_AT_TEXT, r, |code| code >= 0)
    }

    /// `POST /api/addMemberToChatRoom`
    pub async fn add_chat_room_members(
        &self,
        chat_room_id: &str,
        member_ids: &[&str],
    ) -> Result<(), ClientError> {
        let body = ChatRoomMemberIds {
            chat_room_id,
            member_ids: member_ids.join(","),
        };
        let r: ApiResult<serde_json::Value> = self.call(ADD_CHAT_ROOM_MEMBER, &body).await?;
        expect_code(ADD_CHAT_ROOM_MEMBER, r, |code| code == 1)
    }

    /// `POST /api/InviteMemberToChatRoom`
    pub async fn invite_chat_room_members(
        &self,
        chat_room_id: &str,
        member_ids: &[&str],
    ) -> Result<(), ClientError> {
        let body = ChatRoomMemberIds {
            chat_room_id,
            member_ids: member_ids.join(","),
        };
        let r: ApiResult<serde_json::Value> = self.call(INVITE_CHAT_ROOM_MEMBER, &body).await?;
        expect_code(INVITE_CHAT_ROOM_MEMBER, r, |code| code == 1)
    }

    /// `POST /api/forwardMsg`
    pub async fn forward_msg(&self, msg_id: i64, to: &str) -> Result<(), ClientError> {
        let body = ForwardMsg {
            wxid: to,
            msg_id: msg_id.to_string(),
        };
        let r: ApiResult<serde_json::Value> = self.call(FORWARD_MSG, &body).await?;
        expect_code(FORWARD_MSG, r, |code| code == 1)
    }

    /// `POST /api/quitChatRoom`
    pub async fn quit_chat_room(&self, chat_room_id: &str) -> Result<(), ClientError> {
        let r: ApiResult<serde_json::Value> = self
            .call(QUIT_CHAT_ROOM, &ChatRoomId { chat_room_id })
            .await?;
        expect_code(QUIT_CHAT_ROOM, r, |code| code > 0)
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        body: &B,
    ) -> Result<ApiResult<T>, ClientError> {
        let url = self.base_url.join(endpoint)?;
        let resp = self.http.post(url).json(body).send().await?;
        parse_response(resp).await
    }
}

fn expect_code(
    endpoint: &'static str,
    r: ApiResult<serde_json::Value>,
    ok: impl Fn(i64) -> bool,
) -> Result<(), ClientError> {
    if ok(r.code) {
        Ok(())
    } else {
        Err(api_error(endpoint, r))
    }
}

fn expect_data<T>(
    endpoint: &'static str,
    r: ApiResult<T>,
    ok: impl Fn(i64) -> bool,
) -> Result<T, ClientError> {
    if !ok(r.code) {
        return Err(api_error(endpoint, r));
    }
    r.data.ok_or(ClientError::MissingData(endpoint))
}

fn api_error<T>(endpoint: &'static str, r: ApiResult<T>) -> ClientError {
    ClientError::Api {
        endpoint,
        code: r.code,
        msg: r.msg,
    }
}

async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Status { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
