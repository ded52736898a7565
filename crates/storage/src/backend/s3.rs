//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), and others.
//!
//! Listing objects under a prefix is exactly the operation that is expensive
//! and weakly consistent on these services, so this backend implements only
//! [`StorageBackend`] and never [`ListingCapableBackend`]; the type system
//! routes it to the listing-avoidant scanner.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file. Each
//! backend specifies its own `key_id` and `key_secret`.

use crate::{
    StorageBackend,
    error::{ErrorKind, Result},
    file::{FileKind, FileMeta},
    validate_path,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    primitives::{ByteStream, DateTime},
};
use exn::{OptionExt, ResultExt};
use std::path::Path;
use std::sync::Arc;
use time::UtcDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests; a single scan pass is
/// sequential, but several callers may share one backend handle.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// Construct the full object key from an optional prefix and a relative path.
fn compose_key(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path),
        None => path.to_string(),
    }
}

/// S3-compatible storage backend.
///
/// Stores files in an S3 bucket, optionally under a key prefix. All paths are
/// relative to the configured prefix (if any).
///
/// # Supported Services
///
/// - AWS S3
/// - Backblaze B2 (via S3-compatible API)
/// - Tigris (Fly.io storage)
/// - MinIO
/// - Other S3-compatible services
///
/// # Examples
///
/// ```no_run
/// use burrow_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "my-storage",
///     "my-bucket",
///     Some("files/".to_string()),
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used for logging and as the cache storage id)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix
            .map(validate_path)
            .transpose()?
            .map(|p| p.to_str().map(|s| s.to_string()).ok_or_raise(|| ErrorKind::InvalidPath(p)))
            .transpose()?;
        let name = name.into();
        let bucket = bucket.into();
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "burrow-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let client = Client::from_conf(config_builder.build());
        let rate_limiter = Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS));
        Ok(Self {
            name,
            client,
            bucket,
            prefix,
            rate_limiter,
        })
    }

    /// Construct the full S3 key from a relative path.
    fn full_key(&self, path: &Path) -> Result<String> {
        let validated = validate_path(path)?;
        let path_str = validated.to_str().ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))?;
        Ok(compose_key(self.prefix.as_deref(), path_str))
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> OwnedSemaphorePermit {
        // unwrap is safe: semaphore is never closed
        self.rate_limiter.clone().acquire_owned().await.unwrap()
    }

    /// Convert AWS DateTime to UtcDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<UtcDateTime> {
        UtcDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await;
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    exn::bail!(ErrorKind::Network(service.to_string()))
                }
            },
        }
    }

    async fn stat(&self, path: &Path) -> Result<FileMeta> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await;
        let output = match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) => {
                let service = err.into_service_error();
                if service.is_not_found() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                exn::bail!(ErrorKind::Network(service.to_string()));
            },
        };
        let size = output.content_length().and_then(|len| u64::try_from(len).ok()).unwrap_or(0);
        let modified = match output.last_modified() {
            Some(dt) => Self::parse_datetime(dt)?,
            // Every S3-compatible service sends Last-Modified; epoch keeps
            // the etag stable if one ever doesn't.
            None => UtcDateTime::UNIX_EPOCH,
        };
        Ok(FileMeta::new(path, size, modified, FileKind::File))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await;
        let output = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) => {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                exn::bail!(ErrorKind::Network(service.to_string()));
            },
        };
        let bytes = output
            .body
            .collect()
            .await
            .or_raise(|| ErrorKind::Network("interrupted S3 object download".to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|err| ErrorKind::Network(err.into_service_error().to_string()))?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await;
        // S3 deletes are idempotent; a missing key still reports success.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| ErrorKind::Network(err.into_service_error().to_string()))?;
        Ok(())
    }
}
