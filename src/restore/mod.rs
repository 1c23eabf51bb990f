// projectrestore/src/restore/mod.rs
//! Restores a project backup phase by phase: buckets, tables, aliases, configurations.

pub(crate) mod aliases;
pub(crate) mod buckets;
pub(crate) mod configs;
pub(crate) mod eligibility;
pub(crate) mod manifest;
pub(crate) mod metadata;
pub(crate) mod tables;
pub(crate) mod transfer;

use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::{Builder as TempFileBuilder, TempDir};

use crate::config::trim_source_base_path;
use crate::platform::{Attribute, PlatformApi};
use crate::storage::{ObjectStore, ObjectStoreConnector};
use manifest::MetadataRecord;
use metadata::prepare_metadata;

/// Bucket ids created by the bucket phase. Tables and aliases are only
/// restored into these buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoredBuckets {
    ids: BTreeSet<String>,
}

impl RestoredBuckets {
    pub fn insert(&mut self, bucket_id: impl Into<String>) {
        self.ids.insert(bucket_id.into());
    }

    pub fn contains(&self, bucket_id: &str) -> bool {
        self.ids.contains(bucket_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl<S: Into<String>> FromIterator<S> for RestoredBuckets {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        RestoredBuckets {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    All,
    Buckets,
    Tables,
    Aliases,
    Configs,
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "0" | "all" => Ok(Phase::All),
            "1" | "buckets" => Ok(Phase::Buckets),
            "2" | "tables" => Ok(Phase::Tables),
            "3" | "aliases" => Ok(Phase::Aliases),
            "4" | "configs" | "configurations" => Ok(Phase::Configs),
            other => anyhow::bail!("Invalid restore phase '{}'", other),
        }
    }
}

/// Which entity a set of attributes and metadata belongs to.
#[derive(Debug, Clone, Copy)]
enum MetadataTarget<'a> {
    Bucket(&'a str),
    Table(&'a str),
}

pub struct Restorer {
    source: Arc<dyn ObjectStore>,
    connector: Arc<dyn ObjectStoreConnector>,
    platform: Arc<dyn PlatformApi>,
    source_bucket: String,
    base_path: String,
}

impl Restorer {
    pub fn new(
        source: Arc<dyn ObjectStore>,
        connector: Arc<dyn ObjectStoreConnector>,
        platform: Arc<dyn PlatformApi>,
        source_bucket: impl Into<String>,
        base_path: Option<&str>,
    ) -> Self {
        Restorer {
            source,
            connector,
            platform,
            source_bucket: source_bucket.into(),
            base_path: trim_source_base_path(base_path),
        }
    }

    /// Key of a backup object relative to the backup root.
    fn backup_key(&self, relative: &str) -> String {
        format!("{}{}", self.base_path, relative)
    }

    fn work_dir(&self, phase: &str) -> Result<TempDir> {
        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H_%M_%S");
        TempFileBuilder::new()
            .prefix(&format!("restore_{}_{}_", phase, timestamp))
            .tempdir()
            .with_context(|| format!("Failed to create temporary directory for {} restore", phase))
    }

    async fn load_document<T: serde::de::DeserializeOwned>(&self, relative: &str) -> Result<T> {
        let key = self.backup_key(relative);
        manifest::load_backup_document(self.source.as_ref(), &self.source_bucket, &key)
            .await
            .with_context(|| format!("Failed to load s3://{}/{}", self.source_bucket, key))
    }

    /// Bucket ids currently in the project, used when a table or alias phase
    /// runs without the bucket phase before it.
    pub async fn existing_buckets(&self) -> Result<RestoredBuckets> {
        let buckets = self
            .platform
            .list_buckets()
            .await
            .context("Failed to list buckets of the target project")?;
        Ok(buckets.into_iter().map(|b| b.id).collect())
    }

    async fn restore_attributes_and_metadata(
        &self,
        target: MetadataTarget<'_>,
        attributes: &[Attribute],
        metadata: &[MetadataRecord],
    ) -> Result<()> {
        match target {
            MetadataTarget::Bucket(bucket_id) => {
                if !attributes.is_empty() {
                    self.platform
                        .replace_bucket_attributes(bucket_id, attributes)
                        .await
                        .with_context(|| format!("Failed to restore attributes of bucket {}", bucket_id))?;
                }
                for (provider, entries) in prepare_metadata(metadata) {
                    self.platform
                        .post_bucket_metadata(bucket_id, &provider, &entries)
                        .await
                        .with_context(|| format!("Failed to restore metadata of bucket {}", bucket_id))?;
                }
            }
            MetadataTarget::Table(table_id) => {
                if !attributes.is_empty() {
                    self.platform
                        .replace_table_attributes(table_id, attributes)
                        .await
                        .with_context(|| format!("Failed to restore attributes of table {}", table_id))?;
                }
                for (provider, entries) in prepare_metadata(metadata) {
                    self.platform
                        .post_table_metadata(table_id, &provider, &entries)
                        .await
                        .with_context(|| format!("Failed to restore metadata of table {}", table_id))?;
                }
            }
        }
        Ok(())
    }

    async fn restore_column_metadata(
        &self,
        table_id: &str,
        column_metadata: &[(String, Vec<MetadataRecord>)],
    ) -> Result<()> {
        for (column, records) in column_metadata {
            let column_id = format!("{}.{}", table_id, column);
            for (provider, entries) in prepare_metadata(records) {
                self.platform
                    .post_column_metadata(&column_id, &provider, &entries)
                    .await
                    .with_context(|| format!("Failed to restore metadata of column {}", column_id))?;
            }
        }
        Ok(())
    }
}

/// Runs the requested phase, or every phase in dependency order.
pub async fn run_restore_flow(restorer: &Restorer, phase: Phase, check_backend: bool) -> Result<()> {
    info!("Restore phase: {:?}", phase);
    match phase {
        Phase::All => {
            let restored = restorer.restore_buckets(check_backend).await?;
            restorer.restore_tables(&restored).await?;
            restorer.restore_table_aliases(&restored).await?;
            restorer.restore_configs().await?;
        }
        Phase::Buckets => {
            restorer.restore_buckets(check_backend).await?;
        }
        Phase::Tables => {
            let restored = restorer.existing_buckets().await?;
            restorer.restore_tables(&restored).await?;
        }
        Phase::Aliases => {
            let restored = restorer.existing_buckets().await?;
            restorer.restore_table_aliases(&restored).await?;
        }
        Phase::Configs => {
            restorer.restore_configs().await?;
        }
    }
    Ok(())
}
