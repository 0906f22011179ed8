use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::flags::flag_store::FlagStoreError;

// All client errors share one body.
const BAD_REQUEST_BODY: &str = "Bad request";
const SERVICE_UNAVAILABLE_BODY: &str = "Service unavailable";
const INTERNAL_ERROR_BODY: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum FlagError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("No market in request")]
    EmptyMarket,
    #[error("No flags found for market {0}")]
    MarketNotFound(String),
    #[error(transparent)]
    FlagStore(#[from] FlagStoreError),
}

impl FlagError {
    /// Returns (error_code, status_code) for this error.
    fn error_metadata(&self) -> (&'static str, StatusCode) {
        match self {
            FlagError::RequestDecodingError(_) => {
                ("request_decoding_error", StatusCode::BAD_REQUEST)
            }
            FlagError::RequestParsingError(_) => ("request_parsing_error", StatusCode::BAD_REQUEST),
            FlagError::EmptyMarket => ("empty_market", StatusCode::BAD_REQUEST),
            // Not found is a 400, not a 404.
            FlagError::MarketNotFound(_) => ("market_not_found", StatusCode::BAD_REQUEST),
            FlagError::FlagStore(err) => match err {
                FlagStoreError::Connection(_) => {
                    ("flag_store_unavailable", StatusCode::SERVICE_UNAVAILABLE)
                }
                FlagStoreError::Timeout(_) => {
                    ("flag_store_timeout", StatusCode::SERVICE_UNAVAILABLE)
                }
                FlagStoreError::Read(_) => {
                    ("flag_store_read_error", StatusCode::INTERNAL_SERVER_ERROR)
                }
                FlagStoreError::Decode(_) => {
                    ("flag_store_decode_error", StatusCode::INTERNAL_SERVER_ERROR)
                }
                FlagStoreError::InvalidSplit { .. } => {
                    ("flag_store_invalid_split", StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
        }
    }

    /// Returns a short error code for logs and metrics.
    pub fn error_code(&self) -> &'static str {
        self.error_metadata().0
    }

    pub fn status_code(&self) -> StatusCode {
        self.error_metadata().1
    }
}

impl IntoResponse for FlagError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match status {
            StatusCode::BAD_REQUEST => {
                tracing::debug!(code = self.error_code(), "rejecting request: {}", self);
                BAD_REQUEST_BODY
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                tracing::error!(code = self.error_code(), "flag store unavailable: {}", self);
                SERVICE_UNAVAILABLE_BODY
            }
            _ => {
                tracing::error!(code = self.error_code(), "internal error: {}", self);
                INTERNAL_ERROR_BODY
            }
        };

        (status, body).into_response()
    }
}
