// projectrestore/src/restore/buckets.rs
use anyhow::{Context, Result};
use log::{info, warn};

use super::manifest::{BUCKETS_MANIFEST, BucketRecord};
use super::{MetadataTarget, RestoredBuckets, Restorer};
use crate::errors::RestoreError;
use crate::platform::{NewBucket, OwnerCapabilities};

const STAGE_PREFIX: &str = "c-";

/// Fails with the first bucket whose backend the project cannot host.
fn check_backends(buckets: &[BucketRecord], owner: &OwnerCapabilities) -> std::result::Result<(), RestoreError> {
    match buckets.iter().find(|bucket| !owner.supports(&bucket.backend)) {
        Some(bucket) => Err(RestoreError::MissingBackendCapability {
            backend: bucket.backend.clone(),
        }),
        None => Ok(()),
    }
}

impl Restorer {
    /// Recreates the exported buckets.
    ///
    /// With `check_backend` the project's backends are verified for every
    /// bucket before anything is created, and each bucket is created on its
    /// exported backend. Without it the platform picks the default backend.
    pub async fn restore_buckets(&self, check_backend: bool) -> Result<RestoredBuckets> {
        info!("Downloading buckets");
        let buckets: Vec<BucketRecord> = self.load_document(BUCKETS_MANIFEST).await?;

        if check_backend {
            let token = self
                .platform
                .verify_token()
                .await
                .context("Failed to verify Storage API token")?;
            check_backends(&buckets, &token.owner)?;
        }

        let mut restored = RestoredBuckets::default();
        for bucket in &buckets {
            if bucket.source_bucket.is_some() {
                warn!("Skipping bucket {} - linked bucket", bucket.name);
                continue;
            }
            let Some(stripped_name) = bucket.name.strip_prefix(STAGE_PREFIX) else {
                warn!("Skipping bucket {} - name has no {} prefix", bucket.name, STAGE_PREFIX);
                continue;
            };

            info!("Restoring bucket {}", bucket.name);
            let new_bucket = NewBucket {
                name: stripped_name.to_string(),
                stage: bucket.stage.clone(),
                description: bucket.description.clone(),
                backend: check_backend.then(|| bucket.backend.clone()),
            };
            self.platform
                .create_bucket(&new_bucket)
                .await
                .with_context(|| format!("Failed to create bucket {}", bucket.id))?;
            restored.insert(bucket.id.clone());

            self.restore_attributes_and_metadata(
                MetadataTarget::Bucket(&bucket.id),
                &bucket.attributes,
                &bucket.metadata,
            )
            .await?;
        }

        info!("Restored {} buckets", restored.len());
        Ok(restored)
    }
}
