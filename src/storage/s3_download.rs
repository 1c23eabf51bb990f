// projectrestore/src/storage/s3_download.rs
use aws_sdk_s3 as s3;
use log::debug;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt; // For write_all

use super::{ObjectSummary, map_sdk_error};
use crate::errors::Result;

pub async fn get_object_bytes(client: &s3::Client, s3_bucket: &str, s3_key: &str) -> Result<Vec<u8>> {
    let object = client
        .get_object()
        .bucket(s3_bucket)
        .key(s3_key)
        .send()
        .await
        .map_err(|e| map_sdk_error("get object", s3_bucket, s3_key, e))?;

    let body = object
        .body
        .collect()
        .await
        .map_err(|e| map_sdk_error("read body of", s3_bucket, s3_key, e))?;
    Ok(body.into_bytes().to_vec())
}

/// Lists all keys under `prefix`, following continuation tokens.
pub async fn list_objects_with_prefix(
    client: &s3::Client,
    s3_bucket: &str,
    prefix: &str,
) -> Result<Vec<ObjectSummary>> {
    let mut objects = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let response = client
            .list_objects_v2()
            .bucket(s3_bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token.take())
            .send()
            .await
            .map_err(|e| map_sdk_error("list objects under", s3_bucket, prefix, e))?;

        for object in response.contents() {
            if let Some(key) = object.key() {
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default(),
                });
            }
        }

        match response.next_continuation_token() {
            Some(token) if response.is_truncated().unwrap_or(false) => {
                continuation_token = Some(token.to_string());
            }
            _ => break,
        }
    }

    debug!("Listed {} objects under s3://{}/{}", objects.len(), s3_bucket, prefix);
    Ok(objects)
}

/// Downloads an object to `destination_path`, streaming the body to disk.
///
/// # Returns
/// Path to the downloaded file.
pub async fn download_file_from_s3(
    client: &s3::Client,
    s3_bucket: &str,
    s3_key: &str,
    destination_path: &Path,
) -> Result<PathBuf> {
    debug!(
        "Downloading s3://{}/{} to {}",
        s3_bucket,
        s3_key,
        destination_path.display()
    );

    if let Some(parent_dir) = destination_path.parent() {
        if !parent_dir.exists() {
            tokio::fs::create_dir_all(parent_dir).await?;
        }
    }

    let mut object = client
        .get_object()
        .bucket(s3_bucket)
        .key(s3_key)
        .send()
        .await
        .map_err(|e| map_sdk_error("get object", s3_bucket, s3_key, e))?;

    let mut output_file = File::create(destination_path).await?;
    let mut total_bytes_downloaded = 0;
    while let Some(bytes_chunk) = object
        .body
        .try_next()
        .await
        .map_err(|e| map_sdk_error("read body of", s3_bucket, s3_key, e))?
    {
        output_file.write_all(&bytes_chunk).await?;
        total_bytes_downloaded += bytes_chunk.len();
    }
    output_file.flush().await?;

    debug!(
        "Downloaded {} bytes from s3://{}/{}",
        total_bytes_downloaded, s3_bucket, s3_key
    );
    Ok(destination_path.to_path_buf())
}

