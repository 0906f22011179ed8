use std::sync::Arc;
use std::time::Duration;

use common_blob_store::{BlobClient, BlobError};
use thiserror::Error;
use tokio::time::timeout;
use tracing::instrument;

use crate::config::Config;
use crate::flags::flag_models::FlagSet;
use crate::metrics_consts::{FLAG_STORE_ERRORS_COUNTER, FLAG_STORE_LOAD_TIME};
use crate::metrics_utils::{inc, timing_guard};

// Only used to log what the bucket holds, never for resolution.
const BUCKET_LISTING_MAX_KEYS: i32 = 1000;

#[derive(Error, Debug)]
pub enum FlagStoreError {
    #[error("could not connect to blob store: {0}")]
    Connection(String),
    #[error("failed to read flag data: {0}")]
    Read(String),
    #[error("timed out after {0:?} while fetching flag data")]
    Timeout(Duration),
    #[error("failed to decode flag data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("split percentage for market {market} does not sum to 100 ({new} + {current})")]
    InvalidSplit {
        market: String,
        new: i64,
        current: i64,
    },
}

impl FlagStoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            FlagStoreError::Connection(_) => "connection",
            FlagStoreError::Read(_) => "read",
            FlagStoreError::Timeout(_) => "timeout",
            FlagStoreError::Decode(_) => "decode",
            FlagStoreError::InvalidSplit { .. } => "invalid_split",
        }
    }
}

impl From<BlobError> for FlagStoreError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Connection(msg) => FlagStoreError::Connection(msg),
            BlobError::NotFound(key) => FlagStoreError::Read(format!("object {key} not found")),
            BlobError::Read(msg) => FlagStoreError::Read(msg),
        }
    }
}

/// Loads the flag document from the blob store. Nothing is cached: each call fetches and
/// decodes the whole object again.
pub struct FlagStoreLoader {
    client: Arc<dyn BlobClient + Send + Sync>,
    bucket: String,
    key: String,
    fetch_timeout: Duration,
    validate_splits: bool,
    log_bucket_listing: bool,
}

impl FlagStoreLoader {
    pub fn new(
        client: Arc<dyn BlobClient + Send + Sync>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
            fetch_timeout,
            validate_splits: false,
            log_bucket_listing: false,
        }
    }

    pub fn from_config(client: Arc<dyn BlobClient + Send + Sync>, config: &Config) -> Self {
        Self::new(
            client,
            config.bucket_name.clone(),
            config.data_filename.clone(),
            config.flag_fetch_timeout(),
        )
        .with_split_validation(*config.validate_split_percentage)
        .with_bucket_listing(*config.log_bucket_listing)
    }

    pub fn with_split_validation(mut self, enabled: bool) -> Self {
        self.validate_splits = enabled;
        self
    }

    pub fn with_bucket_listing(mut self, enabled: bool) -> Self {
        self.log_bucket_listing = enabled;
        self
    }

    #[instrument(skip_all, fields(bucket = %self.bucket, key = %self.key))]
    pub async fn load(&self) -> Result<FlagSet, FlagStoreError> {
        let timer = timing_guard(FLAG_STORE_LOAD_TIME, &[]);

        let result = self.fetch_and_decode().await;

        match &result {
            Ok(flag_set) => {
                tracing::debug!(flags = flag_set.len(), "loaded flag set");
                timer.label("outcome", "ok").fin();
            }
            Err(e) => {
                tracing::error!("failed to load flag set: {}", e);
                inc(
                    FLAG_STORE_ERRORS_COUNTER,
                    &[("kind".to_string(), e.kind().to_string())],
                    1,
                );
                timer.label("outcome", "error").fin();
            }
        }

        result
    }

    async fn fetch_and_decode(&self) -> Result<FlagSet, FlagStoreError> {
        if self.log_bucket_listing {
            self.log_bucket_contents().await;
        }

        let bytes = timeout(
            self.fetch_timeout,
            self.client.get_bytes(&self.bucket, &self.key),
        )
        .await
        .map_err(|_| FlagStoreError::Timeout(self.fetch_timeout))??;

        let flag_set = FlagSet::from_slice(&bytes)?;

        if self.validate_splits {
            if let Some((flag, split)) = flag_set.first_invalid_split() {
                return Err(FlagStoreError::InvalidSplit {
                    market: flag.market.clone(),
                    new: split.new,
                    current: split.current,
                });
            }
        }

        let duplicates = flag_set.duplicate_markets();
        if !duplicates.is_empty() {
            tracing::warn!(
                ?duplicates,
                "flag set has duplicate markets, the first entry for each wins"
            );
        }

        Ok(flag_set)
    }

    async fn log_bucket_contents(&self) {
        match timeout(
            self.fetch_timeout,
            self.client.list_keys(&self.bucket, BUCKET_LISTING_MAX_KEYS),
        )
        .await
        {
            Ok(Ok(keys)) => {
                for key in keys {
                    tracing::debug!(key = %key, "bucket object");
                }
            }
            Ok(Err(e)) => tracing::warn!("failed to list bucket objects: {}", e),
            Err(_) => tracing::warn!("timed out listing bucket objects"),
        }
    }

    /// Confirms the bucket answers, without reading the flag document.
    #[instrument(skip_all, fields(bucket = %self.bucket))]
    pub async fn probe(&self) -> Result<(), FlagStoreError> {
        timeout(self.fetch_timeout, self.client.list_keys(&self.bucket, 1))
            .await
            .map_err(|_| FlagStoreError::Timeout(self.fetch_timeout))??;
        Ok(())
    }
}
