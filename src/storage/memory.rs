//! In-memory storage backend.
//!
//! Objects are held in a `tokio::sync::RwLock<HashMap<...>>`.  Used by
//! the test suite and for local demos; nothing survives a restart.

use bytes::Bytes;
use futures::StreamExt;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::backend::{ObjectStream, StorageBackend};

/// One stored object.
#[derive(Debug, Clone)]
struct StoredEntry {
    data: Bytes,
    content_type: String,
    etag: String,
}

/// In-memory storage backend.
#[derive(Default)]
pub struct MemoryBackend {
    /// Object store: key -> entry.
    objects: tokio::sync::RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryBackend {
    /// Create an empty `MemoryBackend`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ObjectStream>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let objects = self.objects.read().await;
            let Some(entry) = objects.get(&key) else {
                return Ok(None);
            };

            // Bytes clones are reference-counted; the stream below does
            // not copy the payload.
            let data = entry.data.clone();
            let size = data.len() as u64;
            Ok(Some(ObjectStream {
                content_type: entry.content_type.clone(),
                etag: entry.etag.clone(),
                size: Some(size),
                body: futures::stream::iter([Ok::<_, std::io::Error>(data)]).boxed(),
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
            let mut hasher = Md5::new();
            hasher.update(&data);
            let etag = hex::encode(hasher.finalize());

            let mut objects = self.objects.write().await;
            objects.insert(
                key,
                StoredEntry {
                    data,
                    content_type,
                    etag: etag.clone(),
                },
            );
            Ok(etag)
        })
    }
}
