use std::net::SocketAddr;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use envconfig::Envconfig;
use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl From<FlexBool> for bool {
    fn from(flex: FlexBool) -> Self {
        flex.0
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The value sent back in `Access-Control-Allow-Origin`, checked once at startup so a bad
/// origin never surfaces as a per-request failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowOrigin(pub HeaderValue);

impl FromStr for AllowOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeaderValue::from_str(s.trim())
            .map(AllowOrigin)
            .map_err(|e| format!("Invalid origin {:?}: {}", s, e))
    }
}

impl Deref for AllowOrigin {
    type Target = HeaderValue;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyValue(&'static str),
    #[error("FLAG_FETCH_TIMEOUT_MS must be greater than zero")]
    ZeroFetchTimeout,
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3001")]
    pub address: SocketAddr,

    #[envconfig(from = "ACCESS_CONTROL_ALLOW_ORIGIN")]
    pub access_control_allow_origin: AllowOrigin,

    #[envconfig(from = "BUCKET_NAME")]
    pub bucket_name: String,

    #[envconfig(from = "DATA_FILENAME")]
    pub data_filename: String,

    #[envconfig(from = "S3_REGION", default = "us-east-1")]
    pub s3_region: String,

    // MinIO locally, or https://storage.googleapis.com for GCS interop
    #[envconfig(from = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[envconfig(from = "FLAG_FETCH_TIMEOUT_MS", default = "5000")]
    pub flag_fetch_timeout_ms: u64,

    #[envconfig(from = "VALIDATE_SPLIT_PERCENTAGE", default = "false")]
    pub validate_split_percentage: FlexBool,

    #[envconfig(from = "LOG_BUCKET_LISTING", default = "false")]
    pub log_bucket_listing: FlexBool,

    #[envconfig(default = "1000")]
    pub max_concurrency: usize,

    #[envconfig(default = "false")]
    pub enable_metrics: FlexBool,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,
}

impl Config {
    pub fn default_test_config() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 0)),
            access_control_allow_origin: AllowOrigin(HeaderValue::from_static(
                "https://shop.example.com",
            )),
            bucket_name: "test-flags-bucket".to_string(),
            data_filename: "flags.json".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            flag_fetch_timeout_ms: 1000,
            validate_split_percentage: FlexBool(false),
            log_bucket_listing: FlexBool(false),
            max_concurrency: 1000,
            enable_metrics: FlexBool(false),
            debug: FlexBool(false),
        }
    }

    /// Checks that envconfig can't express on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_name.trim().is_empty() {
            return Err(ConfigError::EmptyValue("BUCKET_NAME"));
        }
        if self.data_filename.trim().is_empty() {
            return Err(ConfigError::EmptyValue("DATA_FILENAME"));
        }
        if self.flag_fetch_timeout_ms == 0 {
            return Err(ConfigError::ZeroFetchTimeout);
        }
        Ok(())
    }

    pub fn flag_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.flag_fetch_timeout_ms)
    }

    pub fn get_s3_endpoint(&self) -> Option<&str> {
        self.s3_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }
}

pub static DEFAULT_TEST_CONFIG: Lazy<Config> = Lazy::new(Config::default_test_config);
