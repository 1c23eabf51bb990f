// projectrestore/src/restore/metadata.rs
use std::collections::BTreeMap;

use super::manifest::MetadataRecord;
use crate::platform::MetadataEntry;

/// Groups exported metadata by provider, keeping item order within a provider.
pub fn prepare_metadata(raw_metadata: &[MetadataRecord]) -> BTreeMap<String, Vec<MetadataEntry>> {
    let mut result: BTreeMap<String, Vec<MetadataEntry>> = BTreeMap::new();
    for item in raw_metadata {
        result
            .entry(item.provider.clone())
            .or_default()
            .push(MetadataEntry {
                key: item.key.clone(),
                value: item.value.clone(),
            });
    }
    result
}
