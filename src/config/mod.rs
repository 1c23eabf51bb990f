// projectrestore/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_JOB_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonStorageApiConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRestoreOptions {
    pub check_backend: Option<bool>,
    pub job_poll_interval_secs: Option<u64>,
    pub job_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub storage_api: Option<JsonStorageApiConfig>,
    pub restore_options: Option<JsonRestoreOptions>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct S3StorageConfig {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>,
    /// Already normalized with [`trim_source_base_path`].
    pub folder_prefix: String,
}

#[derive(Debug, Clone)]
pub struct StorageApiConfig {
    pub url: String,
    pub token: String,
    pub job_poll_interval: Duration,
    pub job_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub check_backend: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub s3: S3StorageConfig,
    pub storage_api: StorageApiConfig,
    pub restore: RestoreOptions,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        Self::from_raw(raw_json_config, |name| std::env::var(name).ok())
    }

    /// Builds the configuration from the parsed file, letting environment
    /// variables (looked up through `env`) override secrets and endpoints.
    pub fn from_raw<F>(raw: RawJsonConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        let s3_raw = raw.s3_storage.unwrap_or_default();
        let api_raw = raw.storage_api.unwrap_or_default();
        let opts = raw.restore_options.unwrap_or_default();

        let s3 = S3StorageConfig {
            bucket_name: required(s3_raw.bucket_name, "s3_storage.bucket_name")?,
            region: required(s3_raw.region, "s3_storage.region")?,
            access_key_id: required(
                from_env("AWS_ACCESS_KEY_ID").or(s3_raw.access_key_id),
                "s3_storage.access_key_id (or AWS_ACCESS_KEY_ID)",
            )?,
            secret_access_key: required(
                from_env("AWS_SECRET_ACCESS_KEY").or(s3_raw.secret_access_key),
                "s3_storage.secret_access_key (or AWS_SECRET_ACCESS_KEY)",
            )?,
            endpoint_url: s3_raw.endpoint_url.filter(|s| !s.is_empty()),
            folder_prefix: trim_source_base_path(s3_raw.folder_prefix.as_deref()),
        };

        let url = required(
            from_env("STORAGE_API_URL").or(api_raw.url),
            "storage_api.url (or STORAGE_API_URL)",
        )?;
        url::Url::parse(&url).with_context(|| format!("Invalid Storage API url: {}", url))?;

        let storage_api = StorageApiConfig {
            url,
            token: required(
                from_env("STORAGE_API_TOKEN").or(api_raw.token),
                "storage_api.token (or STORAGE_API_TOKEN)",
            )?,
            job_poll_interval: Duration::from_secs(
                opts.job_poll_interval_secs.unwrap_or(DEFAULT_JOB_POLL_INTERVAL_SECS),
            ),
            job_timeout: Duration::from_secs(
                opts.job_timeout_secs.unwrap_or(DEFAULT_JOB_TIMEOUT_SECS),
            ),
        };

        Ok(AppConfig {
            s3,
            storage_api,
            restore: RestoreOptions {
                check_backend: opts.check_backend.unwrap_or(true),
            },
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(anyhow::anyhow!("{} must be set in config.json", field)),
    }
}

/// Normalizes the backup root inside the source bucket.
///
/// Empty or `/` means the bucket root (no prefix); anything else is trimmed of
/// surrounding slashes and gets exactly one trailing `/`.
pub fn trim_source_base_path(base_path: Option<&str>) -> String {
    match base_path {
        None | Some("") | Some("/") => String::new(),
        Some(path) => format!("{}/", path.trim_matches('/')),
    }
}
