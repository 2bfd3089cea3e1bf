//! S3/MinIO object-store implementation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures::StreamExt;
use tokio_util::io::ReaderStream;

use crate::traits::{
    range_header_value, ObjectBody, ObjectEntry, ObjectInfo, ObjectStore, ObjectStream,
    StorageError, StorageResult,
};

/// Copy buffer for streamed reads.
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Wall-clock budget for bucket bootstrap.
const ENSURE_BUCKET_DEADLINE: Duration = Duration::from_secs(30);
const ENSURE_BUCKET_BACKOFF: Duration = Duration::from_secs(1);

/// MinIO uses a region-shaped placeholder; any value works with a fixed
/// endpoint and path-style addressing.
const PLACEHOLDER_REGION: &str = "us-east-1";

/// Remote object store speaking the S3 API, addressed path-style so it works
/// against MinIO and other S3-compatible endpoints.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client for a fixed endpoint with static credentials.
    pub fn connect(endpoint: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "clipstream");
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(PLACEHOLDER_REGION))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn transport<E>(err: &SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::Transport(format!("{}", DisplayErrorContext(err)))
}

/// Public-read policy applied to freshly created buckets so the CDN objects
/// are fetchable without signed URLs.
fn public_read_policy(bucket: &str) -> String {
    format!(
        r#"{{
    "Version": "2012-10-17",
    "Statement": [
        {{
            "Effect": "Allow",
            "Principal": {{"AWS": ["*"]}},
            "Action": ["s3:GetObject"],
            "Resource": ["arn:aws:s3:::{bucket}/*"]
        }}
    ]
}}"#
    )
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn stat(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if matches!(&e, SdkError::ServiceError(se) if se.err().is_not_found()) {
                    StorageError::NotFound(format!("{bucket}/{key}"))
                } else {
                    tracing::error!(error = %DisplayErrorContext(&e), bucket = %bucket, key = %key, "stat failed");
                    transport(&e)
                }
            })?;

        Ok(ObjectInfo {
            size: output.content_length().unwrap_or(0),
            content_type: output.content_type().map(str::to_string),
        })
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: i64,
        end: i64,
    ) -> StorageResult<ObjectStream> {
        let mut request = self.client.get_object().bucket(bucket).key(key);
        if let Some(range) = range_header_value(start, end) {
            request = request.range(range);
        }

        let output = request.send().await.map_err(|e| {
            if matches!(&e, SdkError::ServiceError(se) if se.err().is_no_such_key()) {
                StorageError::NotFound(format!("{bucket}/{key}"))
            } else {
                tracing::error!(error = %DisplayErrorContext(&e), bucket = %bucket, key = %key, "get_range failed");
                transport(&e)
            }
        })?;

        let reader = output.body.into_async_read();
        let stream = ReaderStream::with_capacity(reader, READ_BUFFER_SIZE)
            .map(|chunk| chunk.map_err(StorageError::Io));
        Ok(Box::pin(stream))
    }

    async fn list(&self, bucket: &str) -> StorageResult<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                tracing::error!(error = %DisplayErrorContext(&e), bucket = %bucket, "list failed");
                transport(&e)
            })?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                entries.push(ObjectEntry {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0),
                });
            }
        }

        Ok(entries)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        _size_hint: i64,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()> {
        let start = Instant::now();
        let body = match body {
            ObjectBody::File(path) => ByteStream::from_path(&path).await.map_err(|e| {
                StorageError::Transport(format!("failed to open {}: {e}", path.display()))
            })?,
            ObjectBody::Bytes(bytes) => ByteStream::from(bytes),
        };

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .set_metadata(if metadata.is_empty() {
                None
            } else {
                Some(metadata)
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "put failed"
                );
                transport(&e)
            })?;

        tracing::debug!(
            bucket = %bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "put successful"
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %DisplayErrorContext(&e), bucket = %bucket, key = %key, "delete failed");
                transport(&e)
            })?;
        Ok(())
    }

    async fn ensure_bucket(&self, bucket: &str, public_read: bool) -> StorageResult<()> {
        let deadline = Instant::now() + ENSURE_BUCKET_DEADLINE;
        let mut backoff = ENSURE_BUCKET_BACKOFF;

        loop {
            match self.try_ensure_bucket(bucket, public_read).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if Instant::now() + backoff >= deadline {
                        tracing::error!(bucket = %bucket, error = %err, "bucket bootstrap deadline exceeded");
                        return Err(err);
                    }
                    tracing::warn!(bucket = %bucket, error = %err, backoff_secs = backoff.as_secs(), "bucket bootstrap failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

impl S3ObjectStore {
    async fn try_ensure_bucket(&self, bucket: &str, public_read: bool) -> StorageResult<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                if !matches!(&e, SdkError::ServiceError(se) if se.err().is_not_found()) {
                    return Err(transport(&e));
                }
            }
        }

        if let Err(e) = self.client.create_bucket().bucket(bucket).send().await {
            // A concurrent creator is fine; anything else is transport.
            let already_there = matches!(&e, SdkError::ServiceError(se)
                if se.err().is_bucket_already_owned_by_you() || se.err().is_bucket_already_exists());
            if !already_there {
                return Err(transport(&e));
            }
            return Ok(());
        }

        if public_read {
            self.client
                .put_bucket_policy()
                .bucket(bucket)
                .policy(public_read_policy(bucket))
                .send()
                .await
                .map_err(|e| transport(&e))?;
        }

        tracing::info!(bucket = %bucket, public_read, "created bucket");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_targets_all_objects_in_bucket() {
        let policy = public_read_policy("videos");
        assert!(policy.contains(r#""arn:aws:s3:::videos/*""#));
        assert!(policy.contains(r#""s3:GetObject""#));
    }
}
