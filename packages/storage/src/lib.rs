//! Output store for generated images and the settings that produced them.
//!
//! Backends:
//! - On-disk storage under an output directory (the default)
//! - In-memory storage for tests
//!
//! A thin layer over `object_store`; keys are flat file names such as
//! `42_1001.png`, optionally nested under a prefix.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Default output directory for the filesystem backend.
pub const DEFAULT_OUTPUT_DIR: &str = "./outputs";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(object_store::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<object_store::Error> for StorageError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::ObjectStore(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendConfig {
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all object keys.
    pub prefix: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::filesystem(DEFAULT_OUTPUT_DIR)
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_empty(prefix.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `STORAGE_BACKEND`: `filesystem` (default) or `memory`
    /// - `STORAGE_FS_ROOT`: output directory (default: `./outputs`)
    /// - `STORAGE_PREFIX`: optional key prefix
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StorageConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StorageError> {
        let prefix = lookup("STORAGE_PREFIX").and_then(non_empty);
        let backend = lookup("STORAGE_BACKEND").and_then(non_empty);

        let cfg = match backend.as_deref() {
            None | Some("filesystem") | Some("fs") => {
                let root = lookup("STORAGE_FS_ROOT")
                    .and_then(non_empty)
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());
                Self::filesystem(root)
            }
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported STORAGE_BACKEND={other} (expected filesystem|memory)"
                )));
            }
        };

        Ok(Self { prefix, ..cfg })
    }
}

/// Keys written for one generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGeneration {
    pub image_key: String,
    pub settings_key: String,
}

#[derive(Clone)]
pub struct Storage {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl Storage {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store): (StorageKind, Arc<dyn ObjectStore>) = match cfg.backend {
            StorageBackendConfig::Filesystem { root } => {
                std::fs::create_dir_all(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                tracing::info!("Storing outputs under {}", root.display());
                (StorageKind::Filesystem, Arc::new(fs))
            }
            StorageBackendConfig::Memory => (
                StorageKind::Memory,
                Arc::new(object_store::memory::InMemory::new()),
            ),
        };

        Ok(Self {
            kind,
            store,
            prefix: cfg.prefix.and_then(non_empty),
        })
    }

    pub fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?)
    }

    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|part| part == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let joined = match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{key}"),
            _ => key.to_string(),
        };

        Ok(Path::from(joined))
    }

    fn strip_prefix<'a>(&self, location: &'a str) -> &'a str {
        match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => location
                .strip_prefix(prefix)
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(location),
            _ => location,
        }
    }

    pub async fn put_bytes(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store
            .put(&path, object_store::PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.to_path(key)?;
        let res = self.store.get(&path).await?;
        Ok(res.bytes().await?)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.get_bytes(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store.delete(&path).await?;
        Ok(())
    }

    /// Keys under the configured prefix, sorted.
    pub async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let prefix = self
            .prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(Path::from);

        let metas: Vec<_> = self.store.list(prefix.as_ref()).try_collect().await?;
        let mut keys: Vec<String> = metas
            .iter()
            .map(|meta| self.strip_prefix(meta.location.as_ref()).to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    pub async fn put_json_value(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.put_bytes(key, Bytes::from(bytes)).await
    }

    pub async fn get_json_value(&self, key: &str) -> Result<serde_json::Value, StorageError> {
        self.get_json(key).await
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.put_json_value(key, &serde_json::to_value(value)?).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, StorageError> {
        let bytes = self.get_bytes(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Store a generated PNG as `<stem>.png` next to its settings as
    /// `<stem>.json`.
    pub async fn store_generation<T: Serialize>(
        &self,
        stem: &str,
        png: Bytes,
        settings: &T,
    ) -> Result<StoredGeneration, StorageError> {
        let stored = StoredGeneration {
            image_key: format!("{stem}.png"),
            settings_key: format!("{stem}.json"),
        };
        self.put_bytes(&stored.image_key, png).await?;
        self.put_json(&stored.settings_key, settings).await?;
        tracing::debug!("Stored {} and {}", stored.image_key, stored.settings_key);
        Ok(stored)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("kind", &self.kind.as_str())
            .field("prefix", &self.prefix)
            .finish()
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
