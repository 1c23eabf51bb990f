// projectrestore/src/platform/mod.rs
//! Storage API surface the restore needs: buckets, tables, aliases, files,
//! metadata and component configurations.

pub(crate) mod client;
pub(crate) mod jobs;

use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::errors::Result;
use crate::storage::FederatedCredentials;

pub use client::StorageApiClient;

/// Owner capabilities reported by token verification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerCapabilities {
    #[serde(default)]
    pub has_mysql: Option<bool>,
    #[serde(default)]
    pub has_redshift: Option<bool>,
    #[serde(default)]
    pub has_snowflake: Option<bool>,
}

impl OwnerCapabilities {
    /// Whether buckets of `backend` can be created. Backends without a
    /// capability flag are not checked.
    pub fn supports(&self, backend: &str) -> bool {
        match backend {
            "mysql" => self.has_mysql.unwrap_or(false),
            "redshift" => self.has_redshift.unwrap_or(false),
            "snowflake" => self.has_snowflake.unwrap_or(false),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub owner: OwnerCapabilities,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BucketSummary {
    pub id: String,
}

/// Entry of the component catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentDescriptor {
    pub id: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default, deserialize_with = "string_or_scalar")]
    pub value: String,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBucket {
    pub name: String,
    pub stage: String,
    pub description: Option<String>,
    pub backend: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTable {
    pub bucket_id: String,
    pub name: String,
    /// Header-only CSV payload defining the columns.
    pub header_csv: String,
    /// Comma-joined primary key columns.
    pub primary_key: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasOptions {
    pub alias_filter: Option<Value>,
    pub alias_columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileUploadOptions {
    pub file_name: String,
    pub federation_token: bool,
    pub is_sliced: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadCredentials {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
}

impl From<&UploadCredentials> for FederatedCredentials {
    fn from(creds: &UploadCredentials) -> Self {
        FederatedCredentials {
            access_key_id: creds.access_key_id.clone(),
            secret_access_key: creds.secret_access_key.clone(),
            session_token: creds.session_token.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadParams {
    pub bucket: String,
    pub key: String,
    #[serde(rename = "x-amz-server-side-encryption", default)]
    pub server_side_encryption: Option<String>,
    pub credentials: UploadCredentials,
}

/// Response of a file upload preparation with a federation token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedUpload {
    pub id: u64,
    #[serde(default)]
    pub region: String,
    pub upload_params: UploadParams,
}

/// Source of an asynchronous table write.
#[derive(Debug, Clone, PartialEq)]
pub enum TableWriteRequest {
    /// A single uploaded file whose first line is the header.
    File { name: String, data_file_id: u64 },
    /// A sliced upload without header; `columns` maps the data to the table.
    Sliced { data_file_id: u64, columns: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub component_id: String,
    pub configuration_id: String,
    pub name: String,
    pub description: Option<String>,
    pub change_description: Option<String>,
    pub configuration: Option<Value>,
    pub state: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationRow {
    pub component_id: String,
    pub configuration_id: String,
    pub row_id: String,
    pub change_description: Option<String>,
    pub configuration: Option<Value>,
    pub state: Option<Value>,
}

/// Exported values may be strings, numbers, booleans or null; the API takes strings.
pub(crate) fn string_or_scalar<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("expected a scalar, got {}", other))),
    }
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn verify_token(&self) -> Result<TokenInfo>;
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>>;
    async fn list_components(&self) -> Result<Vec<ComponentDescriptor>>;

    /// Returns the id of the created bucket.
    async fn create_bucket(&self, bucket: &NewBucket) -> Result<String>;
    async fn replace_bucket_attributes(&self, bucket_id: &str, attributes: &[Attribute]) -> Result<()>;
    async fn post_bucket_metadata(&self, bucket_id: &str, provider: &str, metadata: &[MetadataEntry]) -> Result<()>;

    /// Returns the canonical id of the created table.
    async fn create_table(&self, table: &NewTable) -> Result<String>;
    async fn replace_table_attributes(&self, table_id: &str, attributes: &[Attribute]) -> Result<()>;
    async fn post_table_metadata(&self, table_id: &str, provider: &str, metadata: &[MetadataEntry]) -> Result<()>;
    async fn post_column_metadata(&self, column_id: &str, provider: &str, metadata: &[MetadataEntry]) -> Result<()>;

    /// Returns the id of the created alias.
    async fn create_alias_table(
        &self,
        bucket_id: &str,
        source_table_id: &str,
        name: &str,
        options: &AliasOptions,
    ) -> Result<String>;

    /// Uploads a whole local file to file storage and returns its file id.
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<u64>;
    async fn prepare_file_upload(&self, options: &FileUploadOptions) -> Result<PreparedUpload>;
    /// Runs an import job and waits for it to finish.
    async fn write_table_async_direct(&self, table_id: &str, request: &TableWriteRequest) -> Result<()>;

    async fn add_configuration(&self, configuration: &Configuration) -> Result<()>;
    async fn update_configuration(&self, configuration: &Configuration) -> Result<()>;
    async fn add_configuration_row(&self, row: &ConfigurationRow) -> Result<()>;
    async fn update_configuration_row(&self, row: &ConfigurationRow) -> Result<()>;
}
