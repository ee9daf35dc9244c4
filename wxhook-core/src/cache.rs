//! On-disk cache for message attachments.
//!
//! A [`FileCache`] is constructed once and handed to whoever needs it,
//! e.g. [`PairClient::with_file_cache`](crate::PairClient::with_file_cache).
//! [`DiskFileCache`] keeps an in-memory index from file name to
//! [`FileInfo`]; names are unique for the lifetime of the cache.

use crate::events::{FileInfo, Message, MsgType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const IMAGE_DIR: &str = "img";
const FILE_DIR: &str = "file";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("file already exists: {0}")]
    FileExists(String),

    #[error("file not found: {0}")]
    NotFound(String),

    /// Empty, or not a plain file name.
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait FileCache: Send + Sync {
    /// Write `data` under `name` and record it.
    async fn save(&self, name: &str, is_image: bool, data: &[u8]) -> Result<FileInfo, CacheError>;

    async fn path_of(&self, name: &str) -> Result<PathBuf, CacheError>;

    async fn read(&self, name: &str) -> Result<Vec<u8>, CacheError>;
}

/// Stores images under `<root>/img` and everything else under
/// `<root>/file`.
#[derive(Debug)]
pub struct DiskFileCache {
    root: PathBuf,
    index: RwLock<HashMap<String, FileInfo>>,
}

impl DiskFileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn lookup(&self, name: &str) -> Result<FileInfo, CacheError> {
        self.index
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(name.to_string()))
    }
}

fn validate_name(name: &str) -> Result<(), CacheError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(CacheError::InvalidName(name.to_string())),
    }
}

#[async_trait]
impl FileCache for DiskFileCache {
    async fn save(&self, name: &str, is_image: bool, data: &[u8]) -> Result<FileInfo, CacheError> {
        validate_name(name)?;

        // Held across the write so two saves of one name cannot both succeed.
        let mut index = self.index.write().await;
        if index.contains_key(name) {
            return Err(CacheError::FileExists(name.to_string()));
        }

        let dir = self.root.join(if is_image { IMAGE_DIR } else { FILE_DIR });
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        tokio::fs::write(&path, data).await?;

        let info = FileInfo {
            ext: Path::new(name)
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default(),
            name: name.to_string(),
            path,
            is_image,
        };
        debug!(name, path = %info.path.display(), bytes = data.len(), "Cached file");
        index.insert(name.to_string(), info.clone());
        Ok(info)
    }

    async fn path_of(&self, name: &str) -> Result<PathBuf, CacheError> {
        Ok(self.lookup(name).await?.path)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, CacheError> {
        let info = self.lookup(name).await?;
        Ok(tokio::fs::read(&info.path).await?)
    }
}

/// Write the embedded image of `message` to `cache` and attach the
/// resulting [`FileInfo`].
///
/// Only image messages carrying `base64Img` are stored, as
/// `<fromUser>_<msgId>.png`. Failures are logged and leave the message
/// without an attachment.
pub async fn cache_attachment(cache: &dyn FileCache, message: &mut Message) -> Option<FileInfo> {
    if message.msg_type != MsgType::Image {
        return None;
    }
    let encoded = message.base64_img.as_deref()?;

    let data = match fast32::base64::RFC4648_NOPAD.decode_str(encoded.trim().trim_end_matches('=')) {
        Ok(data) => data,
        Err(e) => {
            warn!(msg_id = message.msg_id, error = ?e, "Invalid base64 image payload");
            return None;
        }
    };

    let name = format!("{}.png", message.attachment_name());
    match cache.save(&name, true, &data).await {
        Ok(info) => {
            message.attach_file(info.clone());
            Some(info)
        }
        Err(e) => {
            warn!(msg_id = message.msg_id, error = %e, "Failed to cache image");
            None
        }
    }
}
