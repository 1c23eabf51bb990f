// projectrestore/src/restore/manifest.rs
//! Records of the backup manifests and the transfer manifest written for sliced uploads.

use serde::de::{self, DeserializeOwned, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::{RestoreError, Result};
use crate::platform::{Attribute, string_or_scalar};
use crate::storage::ObjectStore;

pub const BUCKETS_MANIFEST: &str = "buckets.json";
pub const TABLES_MANIFEST: &str = "tables.json";
pub const CONFIGURATIONS_MANIFEST: &str = "configurations.json";

/// One `(provider, key, value)` metadata item as exported.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetadataRecord {
    pub provider: String,
    pub key: String,
    #[serde(default, deserialize_with = "string_or_scalar")]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRecord {
    pub id: String,
    pub name: String,
    pub stage: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Set for linked buckets.
    #[serde(default)]
    pub source_bucket: Option<Value>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub metadata: Vec<MetadataRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRecord {
    pub id: String,
    pub bucket: EntityRef,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub is_alias: bool,
    #[serde(default)]
    pub source_table: Option<EntityRef>,
    #[serde(default)]
    pub alias_filter: Option<Value>,
    /// `None` when the export did not carry the flag at all.
    #[serde(default)]
    pub alias_columns_auto_sync: Option<bool>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub metadata: Vec<MetadataRecord>,
    /// Per-column metadata in the order the export lists the columns.
    #[serde(default, deserialize_with = "column_metadata_entries")]
    pub column_metadata: Vec<(String, Vec<MetadataRecord>)>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigurationRef {
    #[serde(deserialize_with = "string_or_scalar")]
    pub id: String,
}

/// Entry of `configurations.json`: a component and the ids of its configurations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentConfigurations {
    pub id: String,
    #[serde(default)]
    pub configurations: Vec<ConfigurationRef>,
}

/// `configurations/<componentId>/<configurationId>.json`.
///
/// Payloads stay [`Value`]s so an empty object and an empty array survive as
/// exported.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigurationDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub state: Option<Value>,
    #[serde(default)]
    pub rows: Vec<ConfigurationRowDocument>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigurationRowDocument {
    #[serde(deserialize_with = "string_or_scalar")]
    pub id: String,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub state: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferManifestEntry {
    pub url: String,
    pub mandatory: bool,
}

/// Manifest listing the uploaded slices of one table write.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferManifest {
    pub entries: Vec<TransferManifestEntry>,
}

impl TransferManifest {
    pub fn push_slice(&mut self, bucket: &str, key: &str) {
        self.entries.push(TransferManifestEntry {
            url: format!("s3://{}/{}", bucket, key),
            mandatory: true,
        });
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| RestoreError::decode("transfer manifest", e))
    }
}

/// Fetches a backup manifest and decodes it. Manifests are small enough
/// to hold in memory.
pub async fn load_backup_document<T: DeserializeOwned>(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<T> {
    let content = store.get_object(bucket, key).await?;
    serde_json::from_slice(&content).map_err(|e| RestoreError::decode(key, e))
}

type ColumnMetadata = Vec<(String, Vec<MetadataRecord>)>;

struct ColumnMetadataVisitor;

impl<'de> Visitor<'de> for ColumnMetadataVisitor {
    type Value = ColumnMetadata;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an object keyed by column, an empty list or null")
    }

    // Entries are read straight off the document so column order survives.
    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<ColumnMetadata, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((column, records)) = map.next_entry::<String, Vec<MetadataRecord>>()? {
            entries.push((column, records));
        }
        Ok(entries)
    }

    // Exports write an empty list instead of an empty object when no column has metadata.
    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<ColumnMetadata, A::Error> {
        match seq.next_element::<de::IgnoredAny>()? {
            None => Ok(Vec::new()),
            Some(_) => Err(de::Error::custom("columnMetadata must be an object keyed by column")),
        }
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<ColumnMetadata, E> {
        Ok(Vec::new())
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<ColumnMetadata, E> {
        Ok(Vec::new())
    }
}

fn column_metadata_entries<'de, D>(deserializer: D) -> std::result::Result<ColumnMetadata, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(ColumnMetadataVisitor)
}
