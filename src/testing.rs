// projectrestore/src/testing.rs
//! In-memory object stores and a recording platform fake for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::{RestoreError, Result};
use crate::platform::{
    AliasOptions, Attribute, BucketSummary, ComponentDescriptor, Configuration, ConfigurationRow,
    FileUploadOptions, MetadataEntry, NewBucket, NewTable, OwnerCapabilities, PlatformApi, PreparedUpload,
    TableWriteRequest, TokenInfo, UploadCredentials, UploadParams,
};
use crate::restore::Restorer;
use crate::storage::{FederatedCredentials, ObjectStore, ObjectStoreConnector, ObjectSummary};

pub const SOURCE_BUCKET: &str = "project-backups";
pub const UPLOAD_BUCKET: &str = "kbc-sapi-files";
pub const UPLOAD_KEY: &str = "exp-15/9001_in.c-main.users";
pub const PREPARED_UPLOAD_ID: u64 = 9001;
pub const FIRST_FILE_ID: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Get { key: String },
    List { prefix: String },
    Download { key: String },
    Put { bucket: String, key: String },
}

impl StoreOp {
    pub fn is_download(&self) -> bool {
        matches!(self, StoreOp::Download { .. })
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            StoreOp::Get { key } | StoreOp::Download { key } | StoreOp::Put { key, .. } => Some(key.as_str()),
            StoreOp::List { .. } => None,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        match self {
            StoreOp::List { prefix } => Some(prefix.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub sse: Option<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    objects: BTreeMap<String, Vec<u8>>,
    ops: Vec<StoreOp>,
    puts: Vec<PutRecord>,
    failing_keys: HashSet<String>,
    reverse_listing: bool,
}

/// Object store keeping objects in memory, keyed by object key only.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<StoreState>,
}

impl MemoryObjectStore {
    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub fn insert(&self, key: &str, body: &[u8]) {
        self.state().objects.insert(key.to_string(), body.to_vec());
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.state().ops.clone()
    }

    /// Successful puts, in order.
    pub fn puts(&self) -> Vec<PutRecord> {
        self.state().puts.clone()
    }

    /// Every later read or write of `key` fails.
    pub fn fail_on(&self, key: &str) {
        self.state().failing_keys.insert(key.to_string());
    }

    /// Lists objects in descending key order.
    pub fn reverse_listing(&self) {
        self.state().reverse_listing = true;
    }

    fn read(&self, op: StoreOp, key: &str) -> Result<Vec<u8>> {
        let mut state = self.state();
        state.ops.push(op);
        if state.failing_keys.contains(key) {
            return Err(RestoreError::ObjectStorage(format!("injected failure reading {}", key)));
        }
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| RestoreError::ObjectStorage(format!("NoSuchKey: {}", key)))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, _bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.read(StoreOp::Get { key: key.to_string() }, key)
    }

    async fn list_objects(&self, _bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>> {
        let mut state = self.state();
        state.ops.push(StoreOp::List { prefix: prefix.to_string() });
        let mut listed: Vec<ObjectSummary> = state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, body)| ObjectSummary {
                key: key.clone(),
                size: body.len() as i64,
            })
            .collect();
        if state.reverse_listing {
            listed.reverse();
        }
        Ok(listed)
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, sse: Option<&str>) -> Result<()> {
        let mut state = self.state();
        state.ops.push(StoreOp::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if state.failing_keys.contains(key) {
            return Err(RestoreError::ObjectStorage(format!("injected failure writing {}", key)));
        }
        state.objects.insert(key.to_string(), body.clone());
        state.puts.push(PutRecord {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
            sse: sse.map(str::to_string),
        });
        Ok(())
    }

    async fn download_to_file(&self, _bucket: &str, key: &str, destination: &Path) -> Result<PathBuf> {
        let body = self.read(StoreOp::Download { key: key.to_string() }, key)?;
        tokio::fs::write(destination, body).await?;
        Ok(destination.to_path_buf())
    }
}

/// Hands out one shared upload target and remembers every connection.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    target: Arc<MemoryObjectStore>,
    connections: Mutex<Vec<(FederatedCredentials, String)>>,
}

impl MemoryConnector {
    pub fn target(&self) -> Arc<MemoryObjectStore> {
        Arc::clone(&self.target)
    }

    pub fn connections(&self) -> Vec<(FederatedCredentials, String)> {
        self.connections.lock().unwrap().clone()
    }
}

impl ObjectStoreConnector for MemoryConnector {
    fn connect(&self, credentials: &FederatedCredentials, region: &str) -> Arc<dyn ObjectStore> {
        self.connections
            .lock()
            .unwrap()
            .push((credentials.clone(), region.to_string()));
        self.target()
    }
}

/// One recorded platform call. Attribute and metadata calls keep only the
/// names and keys, in the order they were sent.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    VerifyToken,
    ListBuckets,
    ListComponents,
    CreateBucket(NewBucket),
    ReplaceBucketAttributes { bucket_id: String, names: Vec<String> },
    PostBucketMetadata { bucket_id: String, provider: String, keys: Vec<String> },
    CreateTable(NewTable),
    ReplaceTableAttributes { table_id: String, names: Vec<String> },
    PostTableMetadata { table_id: String, provider: String, keys: Vec<String> },
    PostColumnMetadata { column_id: String, provider: String, keys: Vec<String> },
    CreateAliasTable { bucket_id: String, source_table_id: String, name: String, options: AliasOptions },
    UploadFile { file_name: String, body: Vec<u8> },
    PrepareFileUpload(FileUploadOptions),
    WriteTableAsync { table_id: String, request: TableWriteRequest },
    AddConfiguration(Configuration),
    UpdateConfiguration(Configuration),
    AddConfigurationRow(ConfigurationRow),
    UpdateConfigurationRow(ConfigurationRow),
}

impl PlatformCall {
    /// Name of the [`PlatformApi`] method that produced the call.
    pub fn kind(&self) -> &'static str {
        match self {
            PlatformCall::VerifyToken => "verify_token",
            PlatformCall::ListBuckets => "list_buckets",
            PlatformCall::ListComponents => "list_components",
            PlatformCall::CreateBucket(_) => "create_bucket",
            PlatformCall::ReplaceBucketAttributes { .. } => "replace_bucket_attributes",
            PlatformCall::PostBucketMetadata { .. } => "post_bucket_metadata",
            PlatformCall::CreateTable(_) => "create_table",
            PlatformCall::ReplaceTableAttributes { .. } => "replace_table_attributes",
            PlatformCall::PostTableMetadata { .. } => "post_table_metadata",
            PlatformCall::PostColumnMetadata { .. } => "post_column_metadata",
            PlatformCall::CreateAliasTable { .. } => "create_alias_table",
            PlatformCall::UploadFile { .. } => "upload_file",
            PlatformCall::PrepareFileUpload(_) => "prepare_file_upload",
            PlatformCall::WriteTableAsync { .. } => "write_table_async_direct",
            PlatformCall::AddConfiguration(_) => "add_configuration",
            PlatformCall::UpdateConfiguration(_) => "update_configuration",
            PlatformCall::AddConfigurationRow(_) => "add_configuration_row",
            PlatformCall::UpdateConfigurationRow(_) => "update_configuration_row",
        }
    }
}

fn names(attributes: &[Attribute]) -> Vec<String> {
    attributes.iter().map(|a| a.name.clone()).collect()
}

fn keys(metadata: &[MetadataEntry]) -> Vec<String> {
    metadata.iter().map(|m| m.key.clone()).collect()
}

#[derive(Debug)]
struct PlatformState {
    calls: Vec<PlatformCall>,
    capabilities: OwnerCapabilities,
    existing_buckets: Vec<String>,
    components: Vec<ComponentDescriptor>,
    table_ids: HashMap<String, String>,
    failing_kinds: HashSet<String>,
    next_file_id: u64,
}

/// Records every call; answers with canned data.
#[derive(Debug)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        FakePlatform {
            state: Mutex::new(PlatformState {
                calls: Vec::new(),
                capabilities: OwnerCapabilities::default(),
                existing_buckets: Vec::new(),
                components: Vec::new(),
                table_ids: HashMap::new(),
                failing_kinds: HashSet::new(),
                next_file_id: FIRST_FILE_ID,
            }),
        }
    }
}

impl FakePlatform {
    fn state(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap()
    }

    /// `owner` object of the token verification response.
    pub fn set_capabilities(&self, owner: Value) {
        self.state().capabilities = serde_json::from_value(owner).unwrap();
    }

    pub fn set_existing_buckets(&self, ids: &[&str]) {
        self.state().existing_buckets = ids.iter().map(|id| id.to_string()).collect();
    }

    pub fn set_components(&self, components: Value) {
        self.state().components = serde_json::from_value(components).unwrap();
    }

    /// Id answered when a table called `name` is created.
    pub fn set_table_id(&self, name: &str, table_id: &str) {
        self.state().table_ids.insert(name.to_string(), table_id.to_string());
    }

    /// Calls of the named method are recorded and then fail.
    pub fn fail_on(&self, kind: &str) {
        self.state().failing_kinds.insert(kind.to_string());
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state().calls.clone()
    }

    pub fn created_buckets(&self) -> Vec<NewBucket> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::CreateBucket(bucket) => Some(bucket),
                _ => None,
            })
            .collect()
    }

    pub fn created_tables(&self) -> Vec<NewTable> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::CreateTable(table) => Some(table),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: PlatformCall) -> Result<()> {
        let mut state = self.state();
        let kind = call.kind();
        state.calls.push(call);
        if state.failing_kinds.contains(kind) {
            return Err(RestoreError::Platform(format!("injected failure in {}", kind)));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn verify_token(&self) -> Result<TokenInfo> {
        self.record(PlatformCall::VerifyToken)?;
        Ok(TokenInfo {
            owner: self.state().capabilities.clone(),
        })
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        self.record(PlatformCall::ListBuckets)?;
        Ok(self
            .state()
            .existing_buckets
            .iter()
            .map(|id| BucketSummary { id: id.clone() })
            .collect())
    }

    async fn list_components(&self) -> Result<Vec<ComponentDescriptor>> {
        self.record(PlatformCall::ListComponents)?;
        Ok(self.state().components.clone())
    }

    async fn create_bucket(&self, bucket: &NewBucket) -> Result<String> {
        self.record(PlatformCall::CreateBucket(bucket.clone()))?;
        Ok(format!("{}.c-{}", bucket.stage, bucket.name))
    }

    async fn replace_bucket_attributes(&self, bucket_id: &str, attributes: &[Attribute]) -> Result<()> {
        self.record(PlatformCall::ReplaceBucketAttributes {
            bucket_id: bucket_id.to_string(),
            names: names(attributes),
        })
    }

    async fn post_bucket_metadata(&self, bucket_id: &str, provider: &str, metadata: &[MetadataEntry]) -> Result<()> {
        self.record(PlatformCall::PostBucketMetadata {
            bucket_id: bucket_id.to_string(),
            provider: provider.to_string(),
            keys: keys(metadata),
        })
    }

    async fn create_table(&self, table: &NewTable) -> Result<String> {
        self.record(PlatformCall::CreateTable(table.clone()))?;
        let mapped = self.state().table_ids.get(&table.name).cloned();
        Ok(mapped.unwrap_or_else(|| format!("{}.{}", table.bucket_id, table.name)))
    }

    async fn replace_table_attributes(&self, table_id: &str, attributes: &[Attribute]) -> Result<()> {
        self.record(PlatformCall::ReplaceTableAttributes {
            table_id: table_id.to_string(),
            names: names(attributes),
        })
    }

    async fn post_table_metadata(&self, table_id: &str, provider: &str, metadata: &[MetadataEntry]) -> Result<()> {
        self.record(PlatformCall::PostTableMetadata {
            table_id: table_id.to_string(),
            provider: provider.to_string(),
            keys: keys(metadata),
        })
    }

    async fn post_column_metadata(&self, column_id: &str, provider: &str, metadata: &[MetadataEntry]) -> Result<()> {
        self.record(PlatformCall::PostColumnMetadata {
            column_id: column_id.to_string(),
            provider: provider.to_string(),
            keys: keys(metadata),
        })
    }

    async fn create_alias_table(
        &self,
        bucket_id: &str,
        source_table_id: &str,
        name: &str,
        options: &AliasOptions,
    ) -> Result<String> {
        self.record(PlatformCall::CreateAliasTable {
            bucket_id: bucket_id.to_string(),
            source_table_id: source_table_id.to_string(),
            name: name.to_string(),
            options: options.clone(),
        })?;
        Ok(format!("{}.{}", bucket_id, name))
    }

    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<u64> {
        let body = tokio::fs::read(path).await?;
        self.record(PlatformCall::UploadFile {
            file_name: file_name.to_string(),
            body,
        })?;
        let mut state = self.state();
        let id = state.next_file_id;
        state.next_file_id += 1;
        Ok(id)
    }

    async fn prepare_file_upload(&self, options: &FileUploadOptions) -> Result<PreparedUpload> {
        self.record(PlatformCall::PrepareFileUpload(options.clone()))?;
        Ok(PreparedUpload {
            id: PREPARED_UPLOAD_ID,
            region: "us-east-1".to_string(),
            upload_params: UploadParams {
                bucket: UPLOAD_BUCKET.to_string(),
                key: UPLOAD_KEY.to_string(),
                server_side_encryption: Some("AES256".to_string()),
                credentials: UploadCredentials {
                    access_key_id: "ASIAFEDERATED".to_string(),
                    secret_access_key: "federated-secret".to_string(),
                    session_token: "session-token".to_string(),
                },
            },
        })
    }

    async fn write_table_async_direct(&self, table_id: &str, request: &TableWriteRequest) -> Result<()> {
        self.record(PlatformCall::WriteTableAsync {
            table_id: table_id.to_string(),
            request: request.clone(),
        })
    }

    async fn add_configuration(&self, configuration: &Configuration) -> Result<()> {
        self.record(PlatformCall::AddConfiguration(configuration.clone()))
    }

    async fn update_configuration(&self, configuration: &Configuration) -> Result<()> {
        self.record(PlatformCall::UpdateConfiguration(configuration.clone()))
    }

    async fn add_configuration_row(&self, row: &ConfigurationRow) -> Result<()> {
        self.record(PlatformCall::AddConfigurationRow(row.clone()))
    }

    async fn update_configuration_row(&self, row: &ConfigurationRow) -> Result<()> {
        self.record(PlatformCall::UpdateConfigurationRow(row.clone()))
    }
}

/// Backup store, upload target and platform wired into a [`Restorer`].
pub struct TestHarness {
    pub source: Arc<MemoryObjectStore>,
    pub upload_target: Arc<MemoryObjectStore>,
    pub connector: Arc<MemoryConnector>,
    pub platform: Arc<FakePlatform>,
}

impl TestHarness {
    pub fn new() -> Self {
        let connector = Arc::new(MemoryConnector::default());
        TestHarness {
            source: Arc::new(MemoryObjectStore::default()),
            upload_target: connector.target(),
            connector,
            platform: Arc::new(FakePlatform::default()),
        }
    }

    /// Restorer reading from [`SOURCE_BUCKET`] under `base_path`.
    pub fn restorer(&self, base_path: Option<&str>) -> Restorer {
        Restorer::new(
            self.source.clone(),
            self.connector.clone(),
            self.platform.clone(),
            SOURCE_BUCKET,
            base_path,
        )
    }

    pub fn put_json(&self, key: &str, document: Value) {
        self.source.insert(key, &serde_json::to_vec(&document).unwrap());
    }

    pub fn put_object(&self, key: &str, body: &[u8]) {
        self.source.insert(key, body);
    }
}
