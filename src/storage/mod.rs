// projectrestore/src/storage/mod.rs
//! Object storage access for the backup bucket and for federated upload targets.

pub(crate) mod s3_download;
pub(crate) mod s3_upload;

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::{BehaviorVersion, Credentials, Region};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::S3StorageConfig;
use crate::errors::{RestoreError, Result};

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
}

/// Short-lived credentials issued by the Storage API for a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Lists every object under `prefix`, in the order the store returns them.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        server_side_encryption: Option<&str>,
    ) -> Result<()>;

    /// Streams an object to `destination` without holding it in memory.
    async fn download_to_file(&self, bucket: &str, key: &str, destination: &Path) -> Result<PathBuf>;

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        server_side_encryption: Option<&str>,
    ) -> Result<()> {
        let body = tokio::fs::read(path).await?;
        self.put_object(bucket, key, body, server_side_encryption).await
    }
}

/// Builds stores that act with federated credentials.
pub trait ObjectStoreConnector: Send + Sync {
    fn connect(&self, credentials: &FederatedCredentials, region: &str) -> Arc<dyn ObjectStore>;
}

/// [`ObjectStore`] backed by `aws-sdk-s3`.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: s3::Client) -> Self {
        S3ObjectStore { client }
    }

    /// Client for the backup bucket, using the static keys from config.json.
    pub async fn from_config(config: &S3StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        S3ObjectStore::new(s3::Client::new(&sdk_config))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        s3_download::get_object_bytes(&self.client, bucket, key).await
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>> {
        s3_download::list_objects_with_prefix(&self.client, bucket, prefix).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        server_side_encryption: Option<&str>,
    ) -> Result<()> {
        s3_upload::put_bytes(&self.client, bucket, key, body, server_side_encryption).await
    }

    async fn download_to_file(&self, bucket: &str, key: &str, destination: &Path) -> Result<PathBuf> {
        s3_download::download_file_from_s3(&self.client, bucket, key, destination).await
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        server_side_encryption: Option<&str>,
    ) -> Result<()> {
        s3_upload::upload_file_to_s3(&self.client, bucket, key, path, server_side_encryption).await
    }
}

/// Connects to S3 with the federated credentials of a prepared file upload.
#[derive(Debug, Clone, Default)]
pub struct S3Connector;

impl ObjectStoreConnector for S3Connector {
    fn connect(&self, credentials: &FederatedCredentials, region: &str) -> Arc<dyn ObjectStore> {
        let creds = Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            Some(credentials.session_token.clone()),
            None,
            "StorageApiFederation",
        );
        let config = s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(creds)
            .build();

        Arc::new(S3ObjectStore::new(s3::Client::from_conf(config)))
    }
}

pub(crate) fn map_sdk_error<E: std::fmt::Debug>(action: &str, bucket: &str, key: &str, err: E) -> RestoreError {
    RestoreError::object_storage(format!("Failed to {} s3://{}/{}", action, bucket, key), err)
}
