use serde::{Deserialize, Serialize};

/// The logged-in account as reported by `/api/userInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Account {
    pub account: String,
    pub city: String,
    pub country: String,
    pub current_data_path: String,
    pub data_save_path: String,
    pub db_key: String,
    pub head_image: String,
    pub mobile: String,
    pub name: String,
    pub province: String,
    pub signature: String,
    pub wxid: String,
    pub private_key: String,
    pub public_key: String,
}
