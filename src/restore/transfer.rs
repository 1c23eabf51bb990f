// projectrestore/src/restore/transfer.rs
//! Table Data Transfer Engine.
//!
//! Table data is exported either as one whole gzipped CSV (with header) or
//! as a run of headerless `.part_N.csv.gz` slices. A whole file goes through
//! a plain file upload; slices are re-uploaded with federated credentials and
//! stitched together by the platform from a transfer manifest.

use log::{debug, info};
use std::path::Path;

use super::Restorer;
use super::manifest::{TableRecord, TransferManifest};
use crate::errors::{RestoreError, Result};
use crate::platform::{FileUploadOptions, TableWriteRequest};
use crate::storage::{FederatedCredentials, ObjectSummary};

/// Key suffix of the first slice of a sliced export.
pub const FIRST_SLICE_SUFFIX: &str = ".part_0.csv.gz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The backup holds no data objects for the table.
    Empty,
    Direct { file_id: u64 },
    Sliced { file_id: u64, parts: usize },
}

/// Decides between the direct and the sliced path.
///
/// Exports carry no explicit "sliced" flag: a lone object is a whole file
/// unless its key ends in `.part_0.csv.gz`, in which case it is a sliced
/// export that happens to have a single slice.
pub fn is_single_file_export(objects: &[ObjectSummary]) -> bool {
    matches!(objects, [only] if !only.key.ends_with(FIRST_SLICE_SUFFIX))
}

/// Upload key of slice `part` under the federated upload key.
pub fn part_key(upload_key: &str, part: usize) -> String {
    format!("{}.part_{}.csv.gz", upload_key, part)
}

impl Restorer {
    /// Prefix under which the backup stores the data objects of a table.
    pub(crate) fn table_data_prefix(&self, table_id: &str) -> String {
        self.backup_key(&format!("{}.", table_id.replace('.', "/")))
    }

    /// Loads the exported data of `record` into the already created `table_id`.
    ///
    /// Data objects are looked up under the id the platform returned, not
    /// the exported one. Any failed list, download or upload aborts the
    /// transfer; slices uploaded before the failure stay in the upload target.
    pub(crate) async fn transfer_table_data(
        &self,
        record: &TableRecord,
        table_id: &str,
        work_dir: &Path,
    ) -> Result<TransferOutcome> {
        let prefix = self.table_data_prefix(table_id);
        let objects = self
            .source
            .list_objects(&self.source_bucket, &prefix)
            .await
            .map_err(|e| RestoreError::transfer(format!("Failed to list data objects of table {}", table_id), e))?;

        if objects.is_empty() {
            return Ok(TransferOutcome::Empty);
        }

        if is_single_file_export(&objects) {
            self.transfer_single_file(record, table_id, &objects[0], work_dir).await
        } else {
            self.transfer_slices(record, table_id, &objects, work_dir).await
        }
    }

    async fn transfer_single_file(
        &self,
        record: &TableRecord,
        table_id: &str,
        object: &ObjectSummary,
        work_dir: &Path,
    ) -> Result<TransferOutcome> {
        let file_name = format!("{}.csv.gz", table_id);
        let local_path = work_dir.join(&file_name);

        self.source
            .download_to_file(&self.source_bucket, &object.key, &local_path)
            .await
            .map_err(|e| RestoreError::transfer(format!("Failed to download {}", object.key), e))?;
        let file_id = self
            .platform
            .upload_file(&local_path, &file_name)
            .await
            .map_err(|e| RestoreError::transfer(format!("Failed to upload data of table {}", table_id), e))?;
        tokio::fs::remove_file(&local_path).await?;

        self.platform
            .write_table_async_direct(
                table_id,
                &TableWriteRequest::File {
                    name: record.name.clone(),
                    data_file_id: file_id,
                },
            )
            .await?;

        info!("Loaded table {} from a single file ({} bytes)", table_id, object.size);
        Ok(TransferOutcome::Direct { file_id })
    }

    async fn transfer_slices(
        &self,
        record: &TableRecord,
        table_id: &str,
        slices: &[ObjectSummary],
        work_dir: &Path,
    ) -> Result<TransferOutcome> {
        let prepared = self
            .platform
            .prepare_file_upload(&FileUploadOptions {
                file_name: table_id.to_string(),
                federation_token: true,
                is_sliced: true,
            })
            .await?;
        let params = &prepared.upload_params;
        let target = self
            .connector
            .connect(&FederatedCredentials::from(&params.credentials), &prepared.region);
        let sse = params.server_side_encryption.as_deref();

        let mut manifest = TransferManifest::default();
        for (part, slice) in slices.iter().enumerate() {
            let local_path = work_dir.join(format!("{}.part_{}.csv.gz", table_id, part));
            self.source
                .download_to_file(&self.source_bucket, &slice.key, &local_path)
                .await
                .map_err(|e| RestoreError::transfer(format!("Failed to download slice {}", slice.key), e))?;

            let key = part_key(&params.key, part);
            target
                .put_file(&params.bucket, &key, &local_path, sse)
                .await
                .map_err(|e| RestoreError::transfer(format!("Failed to upload slice {} of table {}", part, table_id), e))?;
            manifest.push_slice(&params.bucket, &key);

            // one slice on disk at a time
            tokio::fs::remove_file(&local_path).await?;
            debug!("Uploaded slice {} of table {} from {}", part, table_id, slice.key);
        }

        let manifest_key = format!("{}manifest", params.key);
        target
            .put_object(&params.bucket, &manifest_key, manifest.to_json()?, sse)
            .await
            .map_err(|e| RestoreError::transfer(format!("Failed to upload manifest of table {}", table_id), e))?;

        self.platform
            .write_table_async_direct(
                table_id,
                &TableWriteRequest::Sliced {
                    data_file_id: prepared.id,
                    columns: record.columns.clone(),
                },
            )
            .await?;

        info!("Loaded table {} from {} slices", table_id, slices.len());
        Ok(TransferOutcome::Sliced {
            file_id: prepared.id,
            parts: slices.len(),
        })
    }
}
