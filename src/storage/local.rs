//! Local filesystem storage backend.
//!
//! Objects are stored as flat files under a configurable root
//! directory; the storage key is used directly as a relative path.
//! A JSON sidecar under `.meta/` records the content type and etag so
//! reads never have to re-hash the object.
//!
//! All writes follow crash-only design: write to temp file, fsync,
//! rename.

use bytes::Bytes;
use futures::StreamExt;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::pin::Pin;
use tokio_util::io::ReaderStream;

use super::backend::{ObjectStream, StorageBackend};

/// Sidecar metadata written next to every object on `put`.
#[derive(Debug, Serialize, Deserialize)]
struct SidecarMeta {
    content_type: String,
    etag: String,
    size: u64,
}

/// Stores objects on the local filesystem.
pub struct LocalBackend {
    /// Root directory for all stored objects.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        // Also create the .tmp directory for atomic writes.
        std::fs::create_dir_all(root.join(".tmp"))?;
        Ok(Self { root })
    }

    /// Resolve a storage key to an absolute file path.
    ///
    /// Rejects keys containing parent-directory components so a token
    /// key can never escape the root.
    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        for component in std::path::Path::new(key).components() {
            if let std::path::Component::ParentDir = component {
                anyhow::bail!("Path traversal detected in storage key: {}", key);
            }
        }
        Ok(self.root.join(key))
    }

    /// Sidecar path for a storage key: `{root}/.meta/{key}.json`.
    fn meta_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        self.resolve(key)
            .map(|_| self.root.join(".meta").join(format!("{key}.json")))
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(".tmp").join(format!("tmp-{}", id))
    }

    /// Crash-only write: temp file, fsync, rename into place.
    fn write_atomic(&self, final_path: &PathBuf, data: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.temp_path();
        if let Some(parent) = tmp_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?; // fsync
        std::fs::rename(&tmp_path, final_path)?;
        Ok(())
    }
}

impl StorageBackend for LocalBackend {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ObjectStream>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;

            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let metadata = file.metadata().await?;
            if !metadata.is_file() {
                return Ok(None);
            }
            let size = metadata.len();

            // Sidecar is authoritative when present.  Files dropped in
            // from outside `put` fall back to an octet-stream type and
            // an mtime-length etag (the nginx convention).
            let meta_path = self.meta_path(&key)?;
            let (content_type, etag) = match tokio::fs::read(&meta_path).await {
                Ok(raw) => match serde_json::from_slice::<SidecarMeta>(&raw) {
                    Ok(meta) => (meta.content_type, meta.etag),
                    Err(_) => fallback_meta(&metadata, size),
                },
                Err(_) => fallback_meta(&metadata, size),
            };

            Ok(Some(ObjectStream {
                content_type,
                etag,
                size: Some(size),
                body: ReaderStream::new(file).boxed(),
            }))
        })
    }

    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let final_path = self.resolve(&key)?;

            // Compute MD5 hash for the ETag.
            let mut hasher = Md5::new();
            hasher.update(&data);
            let etag = hex::encode(hasher.finalize());

            self.write_atomic(&final_path, &data)?;

            // Sidecar second: a crash between the two renames leaves an
            // object readable via the fallback path, never a dangling
            // sidecar.
            let meta = SidecarMeta {
                content_type,
                etag: etag.clone(),
                size: data.len() as u64,
            };
            let meta_path = self.meta_path(&key)?;
            self.write_atomic(&meta_path, &serde_json::to_vec(&meta)?)?;

            Ok(etag)
        })
    }
}

/// Metadata for files that have no sidecar.
fn fallback_meta(metadata: &std::fs::Metadata, size: u64) -> (String, String) {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    (
        "application/octet-stream".to_string(),
        format!("{mtime:x}-{size:x}"),
    )
}
