// projectrestore/src/storage/s3_upload.rs
use aws_sdk_s3 as s3;
use log::debug;
use s3::primitives::ByteStream;
use s3::types::ServerSideEncryption;
use std::path::Path;

use super::map_sdk_error;
use crate::errors::{RestoreError, Result};

/// Uploads a local file, with the server-side encryption mode the upload target demands.
pub async fn upload_file_to_s3(
    client: &s3::Client,
    s3_bucket: &str,
    s3_key: &str,
    file_path: &Path,
    server_side_encryption: Option<&str>,
) -> Result<()> {
    debug!(
        "Uploading {} to s3://{}/{}",
        file_path.display(),
        s3_bucket,
        s3_key
    );

    let body = ByteStream::from_path(file_path).await.map_err(|e| {
        RestoreError::object_storage(
            format!("Failed to create ByteStream from file {}", file_path.display()),
            e,
        )
    })?;

    send_put(client, s3_bucket, s3_key, body, server_side_encryption).await
}

pub async fn put_bytes(
    client: &s3::Client,
    s3_bucket: &str,
    s3_key: &str,
    body: Vec<u8>,
    server_side_encryption: Option<&str>,
) -> Result<()> {
    debug!("Uploading {} bytes to s3://{}/{}", body.len(), s3_bucket, s3_key);
    send_put(client, s3_bucket, s3_key, ByteStream::from(body), server_side_encryption).await
}

async fn send_put(
    client: &s3::Client,
    s3_bucket: &str,
    s3_key: &str,
    body: ByteStream,
    server_side_encryption: Option<&str>,
) -> Result<()> {
    client
        .put_object()
        .bucket(s3_bucket)
        .key(s3_key)
        .body(body)
        .set_server_side_encryption(server_side_encryption.map(ServerSideEncryption::from))
        .send()
        .await
        .map_err(|e| map_sdk_error("put object", s3_bucket, s3_key, e))?;
    Ok(())
}
