// projectrestore/src/restore/aliases.rs
use anyhow::{Context, Result};
use log::{info, warn};

use super::manifest::{TABLES_MANIFEST, TableRecord};
use super::{MetadataTarget, RestoredBuckets, Restorer};
use crate::platform::AliasOptions;

/// Alias options as exported: the filter when present, and the column list
/// only when auto-sync was explicitly switched off.
fn alias_options(record: &TableRecord) -> AliasOptions {
    AliasOptions {
        alias_filter: record.alias_filter.clone(),
        alias_columns: (record.alias_columns_auto_sync == Some(false)).then(|| record.columns.clone()),
    }
}

impl Restorer {
    /// Recreates alias tables pointing at their source tables.
    pub async fn restore_table_aliases(&self, restored: &RestoredBuckets) -> Result<()> {
        info!("Downloading tables");
        let tables: Vec<TableRecord> = self.load_document(TABLES_MANIFEST).await?;

        for record in tables.iter().filter(|t| t.is_alias) {
            if !restored.contains(&record.bucket.id) {
                warn!("Skipping alias {}", record.id);
                continue;
            }
            let Some(source_table) = &record.source_table else {
                warn!("Skipping alias {} - no source table in backup", record.id);
                continue;
            };

            info!("Restoring alias {}", record.id);
            self.platform
                .create_alias_table(&record.bucket.id, &source_table.id, &record.name, &alias_options(record))
                .await
                .with_context(|| format!("Failed to create alias {}", record.id))?;

            self.restore_attributes_and_metadata(MetadataTarget::Table(&record.id), &record.attributes, &record.metadata)
                .await?;
            self.restore_column_metadata(&record.id, &record.column_metadata)
                .await?;
        }
        Ok(())
    }
}
