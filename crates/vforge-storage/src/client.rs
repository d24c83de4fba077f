//! S3-compatible client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Default region when `S3_REGION` is unset.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Content type of uploaded renders.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Configuration for the S3 client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// Endpoint host (and optional port), without scheme
    pub endpoint: String,
    /// Access key ID
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Bucket name
    pub bucket: String,
    /// Region
    pub region: String,
    /// Use HTTPS
    pub use_ssl: bool,
}

impl S3Config {
    /// Create config from environment variables.
    ///
    /// Returns `None` when endpoint, credentials or bucket are missing; object
    /// storage is then disabled.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Some(Self {
            endpoint: var("S3_ENDPOINT")?,
            access_key: var("S3_ACCESS_KEY")?,
            secret_key: var("S3_SECRET_KEY")?,
            bucket: var("S3_BUCKET")?,
            region: var("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            use_ssl: std::env::var("S3_USE_SSL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        })
    }

    fn scheme(&self) -> &'static str {
        if self.use_ssl {
            "https"
        } else {
            "http"
        }
    }

    /// Endpoint URL used by the SDK.
    pub fn endpoint_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.endpoint)
    }

    /// Path-style public URL of an object.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}://{}/{}/{}", self.scheme(), self.endpoint, self.bucket, key)
    }
}

/// Object key for a combined render: `combined/<job_id>/<file name>`.
pub fn combined_object_key(job_id: &str, file_path: &Path) -> String {
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.mp4".to_string());
    format!("combined/{}/{}", job_id, file_name)
}

/// Uploads local files to object storage.
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    /// Upload `path` under `key` and return its public URL.
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<String>;
}

/// S3-compatible storage client.
#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
    config: S3Config,
}

impl std::fmt::Debug for S3Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Uploader")
            .field("endpoint", &self.config.endpoint)
            .field("bucket", &self.config.bucket)
            .finish()
    }
}

impl S3Uploader {
    /// Create a new client from configuration.
    pub fn new(config: S3Config) -> StorageResult<Self> {
        if config.endpoint.is_empty() || config.bucket.is_empty() {
            return Err(StorageError::config_error("endpoint and bucket are required"));
        }

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "vforge",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            config,
        })
    }

    /// Create from environment variables; `None` when storage is not configured.
    pub fn from_env() -> StorageResult<Option<Self>> {
        S3Config::from_env().map(Self::new).transpose()
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Create the bucket if it does not exist yet.
    pub async fn ensure_bucket(&self) -> StorageResult<()> {
        let bucket = &self.config.bucket;
        if self.client.head_bucket().bucket(bucket).send().await.is_ok() {
            return Ok(());
        }

        info!(bucket = %bucket, "Creating bucket");
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| StorageError::bucket_error(e.to_string()))?;
        Ok(())
    }

    /// Upload a file with the given content type.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }
}

#[async_trait]
impl ObjectUploader for S3Uploader {
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<String> {
        self.upload_file(path, key, VIDEO_CONTENT_TYPE).await?;
        Ok(self.config.public_url(key))
    }
}
