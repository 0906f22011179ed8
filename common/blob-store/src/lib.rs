//! Blob store access for services that read whole objects from a bucket.
//!
//! The `BlobClient` trait is the only thing callers depend on. `S3BlobClient` talks to any
//! S3-compatible store (AWS, MinIO, or GCS through its interoperability endpoint), and
//! `MockBlobClient` is always compiled in so downstream crates can use it in their tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client as AwsS3SdkClient;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    #[error("could not reach blob store: {0}")]
    Connection(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("failed to read object: {0}")]
    Read(String),
}

#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Read the full contents of an object into memory.
    async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError>;

    /// List up to `max_keys` object keys in a bucket.
    async fn list_keys(&self, bucket: &str, max_keys: i32) -> Result<Vec<String>, BlobError>;
}

// Failures that happen before the store ever answers.
fn is_connection_failure<E, R>(err: &SdkError<E, R>) -> bool {
    matches!(
        err,
        SdkError::ConstructionFailure(_) | SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    )
}

pub struct S3BlobClient {
    client: AwsS3SdkClient,
}

impl S3BlobClient {
    pub fn new(client: AwsS3SdkClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobClient for S3BlobClient {
    async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                if is_connection_failure(&e) {
                    return BlobError::Connection(message);
                }
                match e.into_service_error() {
                    GetObjectError::NoSuchKey(_) => BlobError::NotFound(key.to_string()),
                    _ => BlobError::Read(message),
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| BlobError::Read(format!("failed to stream object body: {e}")))?;

        let bytes = body.into_bytes().to_vec();
        tracing::debug!(bucket, key, len = bytes.len(), "read object");
        Ok(bytes)
    }

    async fn list_keys(&self, bucket: &str, max_keys: i32) -> Result<Vec<String>, BlobError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                if is_connection_failure(&e) {
                    BlobError::Connection(message)
                } else {
                    BlobError::Read(message)
                }
            })?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect())
    }
}

/// In-memory client for tests. Responses are registered per bucket and key; anything
/// unregistered is `NotFound`. Clones share the fetch counter.
#[derive(Clone, Default)]
pub struct MockBlobClient {
    get_bytes_responses: HashMap<String, Result<Vec<u8>, BlobError>>,
    list_keys_responses: HashMap<String, Result<Vec<String>, BlobError>>,
    get_bytes_calls: Arc<AtomicUsize>,
}

impl MockBlobClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_bytes_ret(
        mut self,
        bucket: &str,
        key: &str,
        response: Result<Vec<u8>, BlobError>,
    ) -> Self {
        self.get_bytes_responses
            .insert(format!("{bucket}:{key}"), response);
        self
    }

    /// Override the listing for a bucket. Without an override the listing is derived from
    /// the objects registered through `get_bytes_ret`.
    pub fn list_keys_ret(
        mut self,
        bucket: &str,
        response: Result<Vec<String>, BlobError>,
    ) -> Self {
        self.list_keys_responses.insert(bucket.to_string(), response);
        self
    }

    pub fn get_bytes_calls(&self) -> usize {
        self.get_bytes_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobClient for MockBlobClient {
    async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        self.get_bytes_calls.fetch_add(1, Ordering::SeqCst);
        match self.get_bytes_responses.get(&format!("{bucket}:{key}")) {
            Some(response) => response.clone(),
            None => Err(BlobError::NotFound(key.to_string())),
        }
    }

    async fn list_keys(&self, bucket: &str, max_keys: i32) -> Result<Vec<String>, BlobError> {
        if let Some(response) = self.list_keys_responses.get(bucket) {
            return response.clone();
        }

        let prefix = format!("{bucket}:");
        let mut keys: Vec<String> = self
            .get_bytes_responses
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        keys.sort();
        keys.truncate(usize::try_from(max_keys).unwrap_or(0));
        Ok(keys)
    }
}
