use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_blob_store::{BlobClient, BlobError, MockBlobClient};
use serde_json::{json, Value};

use crate::config::Config;
use crate::flags::flag_store::FlagStoreLoader;

/// Wraps a JSON array of flags in the stored document shape.
pub fn flag_set_bytes(flags: Value) -> Vec<u8> {
    json!({ "featureFlags": flags }).to_string().into_bytes()
}

pub fn sample_flags() -> Value {
    json!([
        {"market": "US", "newFeatureActive": true},
        {
            "market": "FR",
            "newFeatureActive": false,
            "abSplitPercentage": {"new": 20, "current": 80}
        },
        {"market": "US", "newFeatureActive": false}
    ])
}

/// A mock client serving `flags` at the configured bucket and key.
pub fn setup_mock_client(config: &Config, flags: Value) -> MockBlobClient {
    MockBlobClient::new().get_bytes_ret(
        &config.bucket_name,
        &config.data_filename,
        Ok(flag_set_bytes(flags)),
    )
}

pub fn setup_flag_store(config: &Config, client: MockBlobClient) -> Arc<FlagStoreLoader> {
    Arc::new(FlagStoreLoader::from_config(Arc::new(client), config))
}

/// Answers every fetch after `delay`.
pub struct SlowBlobClient {
    delay: Duration,
    body: Vec<u8>,
}

impl SlowBlobClient {
    pub fn new(delay: Duration, body: Vec<u8>) -> Self {
        Self { delay, body }
    }
}

#[async_trait]
impl BlobClient for SlowBlobClient {
    async fn get_bytes(&self, _bucket: &str, _key: &str) -> Result<Vec<u8>, BlobError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.body.clone())
    }

    async fn list_keys(&self, _bucket: &str, _max_keys: i32) -> Result<Vec<String>, BlobError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

/// Fails the first `failures` fetches with a connection error, then serves `body`.
pub struct FlakyBlobClient {
    failures: usize,
    calls: AtomicUsize,
    body: Vec<u8>,
}

impl FlakyBlobClient {
    pub fn new(failures: usize, body: Vec<u8>) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            body,
        }
    }
}

#[async_trait]
impl BlobClient for FlakyBlobClient {
    async fn get_bytes(&self, _bucket: &str, _key: &str) -> Result<Vec<u8>, BlobError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(BlobError::Connection("connection refused".to_string()));
        }
        Ok(self.body.clone())
    }

    async fn list_keys(&self, _bucket: &str, _max_keys: i32) -> Result<Vec<String>, BlobError> {
        Ok(Vec::new())
    }
}
