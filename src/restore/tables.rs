// projectrestore/src/restore/tables.rs
use anyhow::{Context, Result};
use log::{info, warn};

use super::manifest::{TABLES_MANIFEST, TableRecord};
use super::transfer::TransferOutcome;
use super::{MetadataTarget, RestoredBuckets, Restorer};
use crate::platform::NewTable;

/// Header-only CSV defining `columns`, quoted the way table exports are.
pub fn header_csv(columns: &[String]) -> String {
    let quoted: Vec<String> = columns
        .iter()
        .map(|column| format!("\"{}\"", column.replace('"', "\"\"")))
        .collect();
    format!("{}\n", quoted.join(","))
}

impl Restorer {
    /// Recreates non-alias tables inside restored buckets and loads their data.
    pub async fn restore_tables(&self, restored: &RestoredBuckets) -> Result<()> {
        info!("Downloading tables");
        let work_dir = self.work_dir("tables")?;
        let tables: Vec<TableRecord> = self.load_document(TABLES_MANIFEST).await?;

        for record in tables.iter().filter(|t| !t.is_alias) {
            if !restored.contains(&record.bucket.id) {
                warn!("Skipping table {}", record.id);
                continue;
            }

            info!("Restoring table {}", record.id);
            let new_table = NewTable {
                bucket_id: record.bucket.id.clone(),
                name: record.name.clone(),
                header_csv: header_csv(&record.columns),
                primary_key: record.primary_key.join(","),
            };
            // the platform may normalize the id; use its answer from here on
            let table_id = self
                .platform
                .create_table(&new_table)
                .await
                .with_context(|| format!("Failed to create table {}", record.id))?;

            self.restore_attributes_and_metadata(MetadataTarget::Table(&table_id), &record.attributes, &record.metadata)
                .await?;
            self.restore_column_metadata(&table_id, &record.column_metadata)
                .await?;

            let outcome = self
                .transfer_table_data(record, &table_id, work_dir.path())
                .await
                .with_context(|| format!("Failed to restore data of table {}", table_id))?;
            if outcome == TransferOutcome::Empty {
                info!("No data found for table {}", table_id);
            }
        }
        Ok(())
    }
}
