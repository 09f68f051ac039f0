//! Configuration loading and types for Tollgate.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, token signing, bucket bindings, logging, and
//! observability.
//!
//! The signing secret can be (and in production should be) supplied via
//! the `JWT_SECRET` environment variable, which overrides the value in
//! the file.  The same config file is shared by the delivery worker and
//! the grant service so both ends of the protocol stay in lockstep.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token signing / verification settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logical bucket bindings, keyed by bucket name.
    #[serde(default)]
    pub buckets: BTreeMap<String, BucketConfig>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probes).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port for the public delivery worker.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind port for the internal grant service.
    #[serde(default = "default_grant_port")]
    pub grant_port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            grant_port: default_grant_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Token signing and verification settings.
///
/// `jwt_secret` is a hex-encoded string; it is decoded to raw bytes
/// before any signing or verification.  Issuer and verifier must share
/// the same secret, issuer string, and audience string -- rotating the
/// secret requires redeploying both sides together, otherwise every
/// delivery fails with 403 until they agree again.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Hex-encoded shared signing secret.  Overridden by `JWT_SECRET`.
    #[serde(default)]
    pub jwt_secret: String,

    /// Fixed `iss` claim value.
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Fixed `aud` claim value.
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Allowed clock skew in seconds when validating `iat`/`exp`.
    #[serde(default = "default_clock_tolerance")]
    pub clock_tolerance_secs: u64,

    /// Token lifetime in seconds when the caller does not request one.
    #[serde(default = "default_expiry")]
    pub default_expiry_secs: u64,

    /// Lower bound for caller-requested token lifetimes.
    #[serde(default = "default_min_expiry")]
    pub min_expiry_secs: u64,

    /// Upper bound for caller-requested token lifetimes.
    #[serde(default = "default_max_expiry")]
    pub max_expiry_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            audience: default_audience(),
            clock_tolerance_secs: default_clock_tolerance(),
            default_expiry_secs: default_expiry(),
            min_expiry_secs: default_min_expiry(),
            max_expiry_secs: default_max_expiry(),
        }
    }
}

/// A single logical bucket binding.
///
/// The map key in `Config::buckets` is the logical name carried in
/// tokens (matched case-insensitively); this struct says where the
/// bytes actually live.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    /// Backend type: `local`, `memory`, or `aws`.
    #[serde(default = "default_bucket_backend")]
    pub backend: String,

    /// `Cache-Control` header sent with successful deliveries from this
    /// bucket.  Access-controlled content defaults to no caching.
    #[serde(default = "default_cache_control")]
    pub cache_control: String,

    /// Local storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// S3-compatible gateway configuration (AWS S3, Cloudflare R2, MinIO).
    #[serde(default)]
    pub aws: Option<AwsStorageConfig>,
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory for stored objects.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// S3-compatible gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsStorageConfig {
    /// Backing bucket name at the provider.
    pub bucket: String,
    /// Region (ignored by some providers, e.g. R2 uses "auto").
    #[serde(default = "default_region")]
    pub region: String,
    /// Key prefix in the backing bucket.
    #[serde(default)]
    pub prefix: String,
    /// Custom S3-compatible endpoint (e.g. R2, MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
///
/// Controls Prometheus metrics collection and health probes.  Both are
/// enabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8640
}

fn default_grant_port() -> u16 {
    8641
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_issuer() -> String {
    "urn:tollgate:issuer".to_string()
}

fn default_audience() -> String {
    "urn:tollgate:audience".to_string()
}

fn default_clock_tolerance() -> u64 {
    60
}

fn default_expiry() -> u64 {
    300
}

fn default_min_expiry() -> u64 {
    30
}

fn default_max_expiry() -> u64 {
    3600
}

fn default_bucket_backend() -> String {
    "local".to_string()
}

fn default_cache_control() -> String {
    "private, no-store".to_string()
}

fn default_storage_root() -> String {
    "./data/objects".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load configuration from a YAML file at `path` and apply environment
/// overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let mut config: Config = serde_yaml::from_str(&contents)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Apply environment variable overrides to a parsed config.
///
/// `JWT_SECRET` replaces `auth.jwt_secret` so the secret never has to
/// be written to disk.
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(secret) = std::env::var("JWT_SECRET") {
        if !secret.is_empty() {
            config.auth.jwt_secret = secret;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.port, 8640);
        assert_eq!(config.server.grant_port, 8641);
        assert_eq!(config.auth.issuer, "urn:tollgate:issuer");
        assert_eq!(config.auth.audience, "urn:tollgate:audience");
        assert_eq!(config.auth.clock_tolerance_secs, 60);
        assert_eq!(config.auth.default_expiry_secs, 300);
        assert_eq!(config.auth.max_expiry_secs, 3600);
        assert!(config.buckets.is_empty());
        assert!(config.observability.metrics);
    }

    #[test]
    fn test_bucket_bindings_parse() {
        let yaml = r#"
buckets:
  datasets:
    backend: local
    local:
      root_dir: /var/lib/tollgate/datasets
  images:
    backend: aws
    cache_control: "public, max-age=3600"
    aws:
      bucket: prod-images
      endpoint_url: https://example.r2.cloudflarestorage.com
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.buckets.len(), 2);

        let datasets = &config.buckets["datasets"];
        assert_eq!(datasets.backend, "local");
        assert_eq!(datasets.local.root_dir, "/var/lib/tollgate/datasets");
        assert_eq!(datasets.cache_control, "private, no-store");

        let images = &config.buckets["images"];
        assert_eq!(images.backend, "aws");
        assert_eq!(images.cache_control, "public, max-age=3600");
        let aws = images.aws.as_ref().unwrap();
        assert_eq!(aws.bucket, "prod-images");
        assert_eq!(aws.region, "auto");
    }

    #[test]
    fn test_jwt_secret_from_yaml() {
        let yaml = "auth:\n  jwt_secret: deadbeef\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.auth.jwt_secret, "deadbeef");
    }
}
