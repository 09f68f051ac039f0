//! Logical bucket resolution.
//!
//! Tokens carry a logical bucket name ("datasets", "images"); this
//! module maps it to the storage binding configured for that name.
//! The set of bindings is closed at startup -- a token naming anything
//! else is an operator configuration problem, reported as such and
//! never conflated with a missing object.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{BucketConfig, Config};
use crate::storage::aws::AwsGatewayBackend;
use crate::storage::backend::StorageBackend;
use crate::storage::local::LocalBackend;
use crate::storage::memory::MemoryBackend;

/// A resolved bucket binding: the storage handle plus per-bucket
/// delivery settings.
#[derive(Clone)]
pub struct BucketBinding {
    /// Canonical (uppercase) logical name.
    pub name: String,
    /// Storage handle for `get` operations.
    pub storage: Arc<dyn StorageBackend>,
    /// `Cache-Control` value sent with successful deliveries.
    pub cache_control: String,
}

/// Immutable dispatch table from logical bucket name to binding.
///
/// Lookup is case-insensitive via uppercase normalization, matching
/// how deployment bindings are conventionally named.
#[derive(Clone, Default)]
pub struct BucketMap {
    bindings: HashMap<String, BucketBinding>,
}

impl BucketMap {
    /// Build the dispatch table from configuration, constructing one
    /// storage backend per configured bucket.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut map = Self::default();
        for (name, bucket_config) in &config.buckets {
            let storage = build_backend(name, bucket_config).await?;
            map.insert(name, &bucket_config.cache_control, storage);
        }
        Ok(map)
    }

    /// Register a binding under `name`.
    pub fn insert(&mut self, name: &str, cache_control: &str, storage: Arc<dyn StorageBackend>) {
        let canonical = name.to_uppercase();
        self.bindings.insert(
            canonical.clone(),
            BucketBinding {
                name: canonical,
                storage,
                cache_control: cache_control.to_string(),
            },
        );
    }

    /// Resolve a logical bucket name from a token.
    ///
    /// Returns `None` for unknown names; the caller turns that into a
    /// configuration-error response, not a 404.
    pub fn resolve(&self, name: &str) -> Option<&BucketBinding> {
        self.bindings.get(&name.to_uppercase())
    }

    /// Number of configured bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True if no buckets are configured.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Construct the storage backend for one bucket binding.
async fn build_backend(
    name: &str,
    config: &BucketConfig,
) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.backend.as_str() {
        "aws" => {
            let aws_config = config.aws.as_ref().ok_or_else(|| {
                anyhow::anyhow!(
                    "bucket '{name}' backend is 'aws' but the aws config section is missing"
                )
            })?;
            let backend = AwsGatewayBackend::new(aws_config).await?;
            info!(
                "bucket '{}' bound to S3 gateway: bucket={} prefix='{}'",
                name, aws_config.bucket, aws_config.prefix
            );
            Arc::new(backend)
        }
        "memory" => {
            info!("bucket '{}' bound to in-memory storage", name);
            Arc::new(MemoryBackend::new())
        }
        "local" => {
            let backend = LocalBackend::new(&config.local.root_dir)?;
            info!(
                "bucket '{}' bound to local storage at {}",
                name, config.local.root_dir
            );
            Arc::new(backend)
        }
        other => anyhow::bail!("bucket '{name}' has unknown backend type '{other}'"),
    };
    Ok(backend)
}
