//! S3-compatible object store

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};

use super::{async_trait, ObjectStore};
use crate::error::{MonitorError, Result};
use crate::models::ObjectEntry;

const BACKEND: &str = "object store";

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    pub force_path_style: bool,
}

/// Object store backed by the S3 API
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new store from the ambient AWS credentials chain
    pub async fn new(config: &S3StoreConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&aws_config);
        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        info!(
            region = %config.region,
            endpoint = ?config.endpoint_url,
            "S3 object store initialized"
        );

        Self {
            client: S3Client::from_conf(builder.build()),
        }
    }

    pub fn from_client(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn list(&self, source_name: &str) -> Result<Vec<ObjectEntry>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        // Each page holds at most 1000 keys
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(source_name)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| MonitorError::backend(BACKEND, DisplayErrorContext(&e)))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let size = object.size().unwrap_or(0).max(0) as u64;
                objects.push(ObjectEntry::new(key, size));
            }

            match (page.is_truncated(), page.next_continuation_token()) {
                (Some(true), Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(bucket = %source_name, objects = objects.len(), "Listed bucket");
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn delete(&self, source_name: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(source_name)
            .key(key)
            .send()
            .await
            .map_err(|e| MonitorError::backend(BACKEND, DisplayErrorContext(&e)))?;
        Ok(())
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(
        &self,
        source_name: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(source_name)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| MonitorError::backend(BACKEND, DisplayErrorContext(&e)))?;
        Ok(())
    }
}
