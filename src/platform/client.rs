// projectrestore/src/platform/client.rs
use async_trait::async_trait;
use log::debug;
use reqwest::{Method, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use url::Url;

use super::jobs::{Job, JobState, result_id};
use super::{
    AliasOptions, Attribute, BucketSummary, ComponentDescriptor, Configuration, ConfigurationRow,
    FileUploadOptions, MetadataEntry, NewBucket, NewTable, PlatformApi, PreparedUpload,
    TableWriteRequest, TokenInfo,
};
use crate::config::StorageApiConfig;
use crate::errors::{RestoreError, Result};
use crate::storage::{FederatedCredentials, ObjectStoreConnector};

const TOKEN_HEADER: &str = "X-StorageApi-Token";

type Form = Vec<(String, String)>;

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(default)]
    components: Vec<ComponentDescriptor>,
}

/// Storage API v2 client.
///
/// File uploads go through federated S3 credentials, so the client needs an
/// [`ObjectStoreConnector`] next to its HTTP client.
pub struct StorageApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    job_poll_interval: Duration,
    job_timeout: Duration,
    connector: Arc<dyn ObjectStoreConnector>,
}

enum UploadBody<'a> {
    File(&'a Path),
    Bytes(Vec<u8>),
}

impl StorageApiClient {
    pub fn new(config: &StorageApiConfig, connector: Arc<dyn ObjectStoreConnector>) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| RestoreError::Config(format!("Invalid Storage API url {}: {}", config.url, e)))?;
        Ok(StorageApiClient {
            http: reqwest::Client::new(),
            base_url,
            token: config.token.clone(),
            job_poll_interval: config.job_poll_interval,
            job_timeout: config.job_timeout,
            connector,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RestoreError::Config(format!("Storage API url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["v2", "storage"])
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        Err(RestoreError::Platform(format!("Request to {} returned {}: {}", url, status, body)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self.http.get(url).header(TOKEN_HEADER, &self.token).send().await?;
        Ok(Self::check(response).await?.json::<T>().await?)
    }

    async fn send_form<T: DeserializeOwned>(&self, method: Method, url: Url, form: &Form) -> Result<T> {
        debug!("{} {}", method, url);
        let response = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, &self.token)
            .form(form)
            .send()
            .await?;
        Ok(Self::check(response).await?.json::<T>().await?)
    }

    async fn wait_for_job(&self, mut job: Job) -> Result<Option<Value>> {
        let started = Instant::now();
        loop {
            match job.state() {
                JobState::Succeeded(results) => return Ok(results),
                JobState::Failed(message) => {
                    return Err(RestoreError::Platform(format!("Job {} failed: {}", job.id, message)));
                }
                JobState::Pending => {}
            }
            if started.elapsed() >= self.job_timeout {
                return Err(RestoreError::Platform(format!(
                    "Job {} did not finish within {} seconds",
                    job.id,
                    self.job_timeout.as_secs()
                )));
            }
            sleep(self.job_poll_interval).await;
            job = self.get_json(self.endpoint(&["jobs", &job.id.to_string()])?).await?;
        }
    }

    async fn upload(&self, body: UploadBody<'_>, file_name: &str) -> Result<u64> {
        let prepared = self
            .prepare_file_upload(&FileUploadOptions {
                file_name: file_name.to_string(),
                federation_token: true,
                is_sliced: false,
            })
            .await?;
        let params = &prepared.upload_params;
        let store = self
            .connector
            .connect(&FederatedCredentials::from(&params.credentials), &prepared.region);
        let sse = params.server_side_encryption.as_deref();
        match body {
            UploadBody::File(path) => store.put_file(&params.bucket, &params.key, path, sse).await?,
            UploadBody::Bytes(bytes) => store.put_object(&params.bucket, &params.key, bytes, sse).await?,
        }
        Ok(prepared.id)
    }
}

#[async_trait]
impl PlatformApi for StorageApiClient {
    async fn verify_token(&self) -> Result<TokenInfo> {
        self.get_json(self.endpoint(&["tokens", "verify"])?).await
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        self.get_json(self.endpoint(&["buckets"])?).await
    }

    async fn list_components(&self) -> Result<Vec<ComponentDescriptor>> {
        let index: IndexResponse = self.get_json(self.endpoint(&[])?).await?;
        Ok(index.components)
    }

    async fn create_bucket(&self, bucket: &NewBucket) -> Result<String> {
        let created: BucketSummary = self
            .send_form(Method::POST, self.endpoint(&["buckets"])?, &bucket_form(bucket))
            .await?;
        Ok(created.id)
    }

    async fn replace_bucket_attributes(&self, bucket_id: &str, attributes: &[Attribute]) -> Result<()> {
        let url = self.endpoint(&["buckets", bucket_id, "attributes"])?;
        let _: Value = self.send_form(Method::POST, url, &attributes_form(attributes)).await?;
        Ok(())
    }

    async fn post_bucket_metadata(&self, bucket_id: &str, provider: &str, metadata: &[MetadataEntry]) -> Result<()> {
        let url = self.endpoint(&["buckets", bucket_id, "metadata"])?;
        let _: Value = self.send_form(Method::POST, url, &metadata_form(provider, metadata)).await?;
        Ok(())
    }

    async fn create_table(&self, table: &NewTable) -> Result<String> {
        let header_file_name = format!("{}.header.csv", table.name);
        let data_file_id = self
            .upload(UploadBody::Bytes(table.header_csv.clone().into_bytes()), &header_file_name)
            .await?;

        let form: Form = vec![
            ("name".to_string(), table.name.clone()),
            ("dataFileId".to_string(), data_file_id.to_string()),
            ("primaryKey".to_string(), table.primary_key.clone()),
        ];
        let url = self.endpoint(&["buckets", &table.bucket_id, "tables-async"])?;
        let job: Job = self.send_form(Method::POST, url, &form).await?;
        let results = self.wait_for_job(job).await?;
        result_id(&results).ok_or_else(|| {
            RestoreError::Platform(format!("Table create job for {} returned no table id", table.name))
        })
    }

    async fn replace_table_attributes(&self, table_id: &str, attributes: &[Attribute]) -> Result<()> {
        let url = self.endpoint(&["tables", table_id, "attributes"])?;
        let _: Value = self.send_form(Method::POST, url, &attributes_form(attributes)).await?;
        Ok(())
    }

    async fn post_table_metadata(&self, table_id: &str, provider: &str, metadata: &[MetadataEntry]) -> Result<()> {
        let url = self.endpoint(&["tables", table_id, "metadata"])?;
        let _: Value = self.send_form(Method::POST, url, &metadata_form(provider, metadata)).await?;
        Ok(())
    }

    async fn post_column_metadata(&self, column_id: &str, provider: &str, metadata: &[MetadataEntry]) -> Result<()> {
        let url = self.endpoint(&["columns", column_id, "metadata"])?;
        let _: Value = self.send_form(Method::POST, url, &metadata_form(provider, metadata)).await?;
        Ok(())
    }

    async fn create_alias_table(
        &self,
        bucket_id: &str,
        source_table_id: &str,
        name: &str,
        options: &AliasOptions,
    ) -> Result<String> {
        let url = self.endpoint(&["buckets", bucket_id, "table-aliases"])?;
        let created: BucketSummary = self
            .send_form(Method::POST, url, &alias_form(source_table_id, name, options))
            .await?;
        Ok(created.id)
    }

    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<u64> {
        self.upload(UploadBody::File(path), file_name).await
    }

    async fn prepare_file_upload(&self, options: &FileUploadOptions) -> Result<PreparedUpload> {
        let form: Form = vec![
            ("name".to_string(), options.file_name.clone()),
            ("federationToken".to_string(), flag(options.federation_token)),
            ("isSliced".to_string(), flag(options.is_sliced)),
        ];
        self.send_form(Method::POST, self.endpoint(&["files", "prepare"])?, &form)
            .await
    }

    async fn write_table_async_direct(&self, table_id: &str, request: &TableWriteRequest) -> Result<()> {
        let url = self.endpoint(&["tables", table_id, "import-async"])?;
        let job: Job = self.send_form(Method::POST, url, &table_write_form(request)).await?;
        self.wait_for_job(job).await?;
        Ok(())
    }

    async fn add_configuration(&self, configuration: &Configuration) -> Result<()> {
        let url = self.endpoint(&["components", &configuration.component_id, "configs"])?;
        let mut form: Form = vec![
            ("configurationId".to_string(), configuration.configuration_id.clone()),
            ("name".to_string(), configuration.name.clone()),
        ];
        if let Some(description) = &configuration.description {
            form.push(("description".to_string(), description.clone()));
        }
        let _: Value = self.send_form(Method::POST, url, &form).await?;
        Ok(())
    }

    async fn update_configuration(&self, configuration: &Configuration) -> Result<()> {
        let url = self.endpoint(&[
            "components",
            &configuration.component_id,
            "configs",
            &configuration.configuration_id,
        ])?;
        let _: Value = self
            .send_form(Method::PUT, url, &configuration_update_form(configuration)?)
            .await?;
        Ok(())
    }

    async fn add_configuration_row(&self, row: &ConfigurationRow) -> Result<()> {
        let url = self.endpoint(&[
            "components",
            &row.component_id,
            "configs",
            &row.configuration_id,
            "rows",
        ])?;
        let form: Form = vec![("rowId".to_string(), row.row_id.clone())];
        let _: Value = self.send_form(Method::POST, url, &form).await?;
        Ok(())
    }

    async fn update_configuration_row(&self, row: &ConfigurationRow) -> Result<()> {
        let url = self.endpoint(&[
            "components",
            &row.component_id,
            "configs",
            &row.configuration_id,
            "rows",
            &row.row_id,
        ])?;
        let form = payload_form(&row.change_description, &row.configuration, &row.state)?;
        let _: Value = self.send_form(Method::PUT, url, &form).await?;
        Ok(())
    }
}

fn flag(value: bool) -> String {
    let value = if value { "1" } else { "0" };
    value.to_string()
}

fn scalar_to_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn bucket_form(bucket: &NewBucket) -> Form {
    let mut form: Form = vec![
        ("name".to_string(), bucket.name.clone()),
        ("stage".to_string(), bucket.stage.clone()),
    ];
    if let Some(description) = &bucket.description {
        form.push(("description".to_string(), description.clone()));
    }
    if let Some(backend) = &bucket.backend {
        form.push(("backend".to_string(), backend.clone()));
    }
    form
}

fn attributes_form(attributes: &[Attribute]) -> Form {
    let mut form = Form::new();
    for (i, attribute) in attributes.iter().enumerate() {
        form.push((format!("attributes[{}][name]", i), attribute.name.clone()));
        form.push((format!("attributes[{}][value]", i), attribute.value.clone()));
        if attribute.protected {
            form.push((format!("attributes[{}][protected]", i), flag(true)));
        }
    }
    form
}

fn metadata_form(provider: &str, metadata: &[MetadataEntry]) -> Form {
    let mut form: Form = vec![("provider".to_string(), provider.to_string())];
    for (i, entry) in metadata.iter().enumerate() {
        form.push((format!("metadata[{}][key]", i), entry.key.clone()));
        form.push((format!("metadata[{}][value]", i), entry.value.clone()));
    }
    form
}

fn alias_form(source_table_id: &str, name: &str, options: &AliasOptions) -> Form {
    let mut form: Form = vec![
        ("sourceTable".to_string(), source_table_id.to_string()),
        ("name".to_string(), name.to_string()),
    ];
    if let Some(Value::Object(filter)) = &options.alias_filter {
        for (field, value) in filter {
            match value {
                Value::Array(items) => {
                    for item in items {
                        form.push((format!("aliasFilter[{}][]", field), scalar_to_form(item)));
                    }
                }
                other => form.push((format!("aliasFilter[{}]", field), scalar_to_form(other))),
            }
        }
    }
    if let Some(columns) = &options.alias_columns {
        for column in columns {
            form.push(("aliasColumns[]".to_string(), column.clone()));
        }
    }
    form
}

fn table_write_form(request: &TableWriteRequest) -> Form {
    match request {
        TableWriteRequest::File { name, data_file_id } => vec![
            ("name".to_string(), name.clone()),
            ("dataFileId".to_string(), data_file_id.to_string()),
        ],
        TableWriteRequest::Sliced { data_file_id, columns } => {
            let mut form: Form = vec![("dataFileId".to_string(), data_file_id.to_string())];
            for column in columns {
                form.push(("columns[]".to_string(), column.clone()));
            }
            form
        }
    }
}

fn configuration_update_form(configuration: &Configuration) -> Result<Form> {
    let mut form: Form = vec![("name".to_string(), configuration.name.clone())];
    if let Some(description) = &configuration.description {
        form.push(("description".to_string(), description.clone()));
    }
    form.extend(payload_form(
        &configuration.change_description,
        &configuration.configuration,
        &configuration.state,
    )?);
    Ok(form)
}

// Payloads are sent as JSON text so `{}` and `[]` reach the API unchanged.
fn payload_form(change_description: &Option<String>, configuration: &Option<Value>, state: &Option<Value>) -> Result<Form> {
    let mut form = Form::new();
    if let Some(change_description) = change_description {
        form.push(("changeDescription".to_string(), change_description.clone()));
    }
    if let Some(configuration) = configuration {
        let encoded = serde_json::to_string(configuration).map_err(|e| RestoreError::decode("configuration payload", e))?;
        form.push(("configuration".to_string(), encoded));
    }
    if let Some(state) = state {
        let encoded = serde_json::to_string(state).map_err(|e| RestoreError::decode("configuration state", e))?;
        form.push(("state".to_string(), encoded));
    }
    Ok(form)
}
