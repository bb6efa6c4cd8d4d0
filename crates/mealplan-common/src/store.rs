/// Key/value stores that back the recipe cache.
///
/// `MemoryStore` lives for the process, `FileStore` persists a single JSON object on disk
/// (the equivalent of browser local storage), `RedisStore` shares entries across
/// processes. None of them expire or evict.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::CommonError;
use crate::redis::RedisClient;

pub const REDIS_KEY_PREFIX: &str = "mealplan:v1:recipe:";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CommonError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), CommonError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CommonError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CommonError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// All entries in one JSON object file. Every put rewrites the file through a
/// sibling temp file and a rename, so a crash never leaves a half-written cache.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing entries. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CommonError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), entries = entries.len(), "file store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> Result<(), CommonError> {
        let json = serde_json::to_vec_pretty(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CommonError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CommonError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries).await {
            // Keep memory and disk in agreement when the write fails.
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        debug!(key, path = %self.path.display(), "file store entry written");
        Ok(())
    }
}

/// Redis-backed store. Keys are namespaced under `mealplan:v1:recipe:`.
pub struct RedisStore {
    redis: RedisClient,
}

impl RedisStore {
    pub fn new(url: Option<&str>) -> Self {
        Self {
            redis: RedisClient::new(url, REDIS_KEY_PREFIX),
        }
    }

    /// Check the server answers; the store works without this, failing per call.
    pub async fn ping(&self) -> Result<(), CommonError> {
        self.redis.ping().await
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CommonError> {
        self.redis.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CommonError> {
        self.redis.set(key, value).await
    }
}
