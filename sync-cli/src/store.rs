//! File-backed room store.
//!
//! Persists the whole key-value image as one JSON document: hex keys, base64
//! values. Right-sized for CLI amounts of data; the image is loaded once at
//! open and rewritten on every commit, through a temp file and rename so a
//! crash mid-write never leaves a torn store behind.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sync_client::{StoreBackend, StoreError, StoreTxn};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Records = BTreeMap<Vec<u8>, Vec<u8>>;

/// Path of the room store inside a data directory.
pub fn store_path(data_dir: &Path) -> PathBuf {
    data_dir.join("rooms.json")
}

/// Durable [`StoreBackend`] over a single JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: Arc<PathBuf>,
    data: Arc<Mutex<Records>>,
}

impl FileStore {
    /// Open a store at `path`, loading the existing image if present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => decode_image(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(Self {
            path: Arc::new(path),
            data: Arc::new(Mutex::new(data)),
        })
    }
}

#[async_trait]
impl StoreBackend for FileStore {
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError> {
        let data = Arc::clone(&self.data).lock_owned().await;
        Ok(Box::new(FileTxn {
            path: Arc::clone(&self.path),
            data,
            staged: BTreeMap::new(),
        }))
    }
}

/// Staged writes on top of the locked image. `None` marks a delete.
struct FileTxn {
    path: Arc<PathBuf>,
    data: OwnedMutexGuard<Records>,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

#[async_trait]
impl StoreTxn for FileTxn {
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.staged.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.staged.insert(key, None);
    }

    async fn scan(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut merged: Records = self
            .data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let staged = self
            .staged
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix));
        for (key, value) in staged {
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }

        Ok(merged.into_iter().collect())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        for (key, value) in std::mem::take(&mut self.staged) {
            match value {
                Some(value) => self.data.insert(key, value),
                None => self.data.remove(&key),
            };
        }

        let image = encode_image(&self.data)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, image).await?;
        tokio::fs::rename(&tmp, self.path.as_ref()).await?;
        Ok(())
    }
}

fn encode_image(records: &Records) -> Result<Vec<u8>, StoreError> {
    let image: BTreeMap<String, String> = records
        .iter()
        .map(|(key, value)| (hex::encode(key), BASE64.encode(value)))
        .collect();
    serde_json::to_vec_pretty(&image)
        .map_err(|e| StoreError::Corrupt(format!("store image encoding failed: {e}")))
}

fn decode_image(bytes: &[u8]) -> Result<Records, StoreError> {
    let image: BTreeMap<String, String> = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Corrupt(format!("store image is not valid JSON: {e}")))?;

    let mut records = Records::new();
    for (key, value) in image {
        let key = hex::decode(&key)
            .map_err(|e| StoreError::Corrupt(format!("bad store key {key:?}: {e}")))?;
        let value = BASE64
            .decode(&value)
            .map_err(|e| StoreError::Corrupt(format!("bad store value: {e}")))?;
        records.insert(key, value);
    }
    Ok(records)
}
