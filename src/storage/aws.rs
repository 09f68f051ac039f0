//! S3-compatible gateway storage backend.
//!
//! Proxies reads to any S3-compatible provider (AWS S3, Cloudflare R2,
//! MinIO, LocalStack) via the AWS SDK.  This is the production binding:
//! the delivery worker streams straight from the provider without
//! buffering.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless explicit
//! static credentials are configured.

use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::StreamExt;
use md5::{Digest, Md5};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::backend::{ObjectStream, StorageBackend};
use crate::config::AwsStorageConfig;

/// Gateway backend that forwards reads to an S3-compatible bucket.
pub struct AwsGatewayBackend {
    /// S3 SDK client.
    client: Client,
    /// The remote bucket name.
    bucket: String,
    /// Key prefix for all objects in the remote bucket.
    prefix: String,
}

impl AwsGatewayBackend {
    /// Create a new gateway backend from a bucket binding config.
    pub async fn new(config: &AwsStorageConfig) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        // If explicit credentials are provided, inject them as static credentials.
        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "tollgate-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "S3 gateway backend initialized: bucket={} prefix='{}'",
            config.bucket, config.prefix
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        })
    }

    /// Map a storage key to a remote S3 key.
    fn s3_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("S3 {context}: {err}")
    }
}

impl StorageBackend for AwsGatewayBackend {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ObjectStream>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let s3_key = self.s3_key(&key);

            debug!("S3 get_object: bucket={} key={}", self.bucket, s3_key);

            let resp = match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        return Ok(None);
                    }
                    return Err(Self::map_sdk_error("get_object", service_err));
                }
            };

            let content_type = resp
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            // Providers return the ETag quoted; the handler re-quotes.
            let etag = resp
                .e_tag()
                .map(|t| t.trim_matches('"').to_string())
                .unwrap_or_default();
            let size = resp.content_length().and_then(|l| u64::try_from(l).ok());

            // Adapt the SDK's ByteStream into the trait's stream without
            // collecting: each chunk is pulled on demand, so client
            // back-pressure reaches the provider connection.
            let body = futures::stream::try_unfold(resp.body, |mut stream| async move {
                match stream.try_next().await {
                    Ok(Some(chunk)) => Ok(Some((chunk, stream))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(std::io::Error::other(e)),
                }
            })
            .boxed();

            Ok(Some(ObjectStream {
                content_type,
                etag,
                size,
                body,
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
            let s3_key = self.s3_key(&key);

            // Compute MD5 locally for a consistent ETag (providers may
            // return a different ETag with server-side encryption).
            let mut hasher = Md5::new();
            hasher.update(&data);
            let etag = hex::encode(hasher.finalize());

            debug!("S3 put_object: bucket={} key={}", self.bucket, s3_key);

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .content_type(&content_type)
                .body(aws_sdk_s3::primitives::ByteStream::from(data))
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("put_object", e))?;

            Ok(etag)
        })
    }
}
