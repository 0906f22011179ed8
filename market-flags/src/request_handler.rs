use bytes::Bytes;
use tracing::instrument;

use crate::{
    api::{errors::FlagError, types::FlagRequest},
    flags::{flag_matching::find_match, flag_models::FeatureFlag, flag_store::FlagStoreLoader},
};

/// Resolves one lookup: decode, validate, load, match.
///
/// The flag store is only touched once the request is known to carry a market, so a bad
/// request never costs a fetch.
#[instrument(skip_all, fields(market))]
pub async fn process_request(
    flag_store: &FlagStoreLoader,
    body: Bytes,
) -> Result<FeatureFlag, FlagError> {
    let request = FlagRequest::from_bytes(body)?;
    let market = request.extract_market()?;
    tracing::Span::current().record("market", market);

    let flag_set = flag_store.load().await?;

    match find_match(&flag_set, market) {
        Some(index) => flag_set
            .into_flag(index)
            .ok_or_else(|| FlagError::MarketNotFound(market.to_string())),
        None => {
            tracing::debug!(flags = flag_set.len(), "no flags for market");
            Err(FlagError::MarketNotFound(market.to_string()))
        }
    }
}

/// Label for the lookup outcome counter.
pub fn outcome_label(result: &Result<FeatureFlag, FlagError>) -> &'static str {
    match result {
        Ok(_) => "found",
        Err(FlagError::MarketNotFound(_)) => "not_found",
        Err(FlagError::FlagStore(_)) => "backend_error",
        Err(_) => "invalid_request",
    }
}

#[cfg(test)]
mod tests {
    use common_blob_store::{BlobError, MockBlobClient};
    use serde_json::json;

    use super::*;
    use crate::config::DEFAULT_TEST_CONFIG;
    use crate::flags::flag_models::SplitPercentage;
    use crate::flags::flag_store::FlagStoreError;
    use crate::test_utils::{sample_flags, setup_flag_store, setup_mock_client};

    #[tokio::test]
    async fn test_returns_matching_flag() {
        let config = DEFAULT_TEST_CONFIG.clone();
        let flag_store = setup_flag_store(&config, setup_mock_client(&config, sample_flags()));

        let flag = process_request(&flag_store, Bytes::from(r#"{"Market":"FR"}"#))
            .await
            .unwrap();

        assert_eq!(
            flag,
            FeatureFlag {
                market: "FR".to_string(),
                new_feature_active: false,
                ab_split_percentage: Some(SplitPercentage {
                    new: 20,
                    current: 80
                }),
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_market_returns_first_entry() {
        let config = DEFAULT_TEST_CONFIG.clone();
        let flag_store = setup_flag_store(&config, setup_mock_client(&config, sample_flags()));

        let flag = process_request(&flag_store, Bytes::from(r#"{"Market":"US"}"#))
            .await
            .unwrap();

        assert!(flag.new_feature_active);
    }

    #[tokio::test]
    async fn test_unknown_market_is_not_found() {
        let config = DEFAULT_TEST_CONFIG.clone();
        let flag_store = setup_flag_store(&config, setup_mock_client(&config, sample_flags()));

        let result = process_request(&flag_store, Bytes::from(r#"{"Market":"JP"}"#)).await;

        assert_eq!(outcome_label(&result), "not_found");
        match result {
            Err(FlagError::MarketNotFound(market)) => assert_eq!(market, "JP"),
            other => panic!("Expected MarketNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_flag_set_is_not_found() {
        let config = DEFAULT_TEST_CONFIG.clone();
        let flag_store = setup_flag_store(&config, setup_mock_client(&config, json!([])));

        let result = process_request(&flag_store, Bytes::from(r#"{"Market":"US"}"#)).await;

        assert!(matches!(result, Err(FlagError::MarketNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_market_skips_fetch() {
        let config = DEFAULT_TEST_CONFIG.clone();
        let client = setup_mock_client(&config, sample_flags());
        let flag_store = setup_flag_store(&config, client.clone());

        let result = process_request(&flag_store, Bytes::from(r#"{"Market":""}"#)).await;

        assert!(matches!(result, Err(FlagError::EmptyMarket)));
        assert_eq!(outcome_label(&result), "invalid_request");
        assert_eq!(client.get_bytes_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_skips_fetch() {
        let config = DEFAULT_TEST_CONFIG.clone();
        let client = setup_mock_client(&config, sample_flags());
        let flag_store = setup_flag_store(&config, client.clone());

        let result = process_request(&flag_store, Bytes::from("not json")).await;

        assert!(matches!(result, Err(FlagError::RequestParsingError(_))));
        assert_eq!(client.get_bytes_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_propagated() {
        let config = DEFAULT_TEST_CONFIG.clone();
        let client = MockBlobClient::new().get_bytes_ret(
            &config.bucket_name,
            &config.data_filename,
            Err(BlobError::Connection("connection refused".to_string())),
        );
        let flag_store = setup_flag_store(&config, client);

        let result = process_request(&flag_store, Bytes::from(r#"{"Market":"US"}"#)).await;

        assert_eq!(outcome_label(&result), "backend_error");
        assert!(matches!(
            result,
            Err(FlagError::FlagStore(FlagStoreError::Connection(_)))
        ));
    }
}
