use std::fmt;

use bytes::Bytes;
use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::errors::FlagError;

const MARKET_FIELD: &str = "Market";

#[derive(Default, Debug, Serialize)]
pub struct FlagRequest {
    #[serde(rename = "Market")]
    pub market: Option<String>,
}

// Field names match case-insensitively (`Market`, `market`, `MARKET`, ...). When the key
// appears more than once the last non-null value wins.
impl<'de> Deserialize<'de> for FlagRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FlagRequestVisitor;

        impl<'de> Visitor<'de> for FlagRequestVisitor {
            type Value = FlagRequest;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object with a Market field")
            }

            fn visit_map<A>(self, mut map: A) -> Result<FlagRequest, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut market = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key.eq_ignore_ascii_case(MARKET_FIELD) {
                        if let Some(value) = map.next_value::<Option<String>>()? {
                            market = Some(value);
                        }
                    } else {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
                Ok(FlagRequest { market })
            }
        }

        deserializer.deserialize_map(FlagRequestVisitor)
    }
}

impl FlagRequest {
    /// Decodes a raw request body. Anything that is not UTF-8 JSON of the expected shape is a
    /// client error, never a panic.
    #[instrument(skip_all)]
    pub fn from_bytes(bytes: Bytes) -> Result<FlagRequest, FlagError> {
        tracing::debug!(len = bytes.len(), "decoding new request");
        let payload = String::from_utf8(bytes.into()).map_err(|e| {
            tracing::debug!("failed to decode body: {}", e);
            FlagError::RequestDecodingError(String::from("invalid body encoding"))
        })?;

        Ok(serde_json::from_str::<FlagRequest>(&payload)?)
    }

    pub fn extract_market(&self) -> Result<&str, FlagError> {
        match self.market.as_deref() {
            Some(market) if !market.is_empty() => Ok(market),
            _ => Err(FlagError::EmptyMarket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_market() {
        let request = FlagRequest::from_bytes(Bytes::from(r#"{"Market":"US"}"#)).unwrap();
        assert_eq!(request.extract_market().unwrap(), "US");
    }

    #[test]
    fn test_accepts_lowercase_field() {
        let request = FlagRequest::from_bytes(Bytes::from(r#"{"market":"FR"}"#)).unwrap();
        assert_eq!(request.extract_market().unwrap(), "FR");
    }

    #[test]
    fn test_field_name_is_case_insensitive() {
        for body in [
            r#"{"MARKET":"US"}"#,
            r#"{"mArKeT":"US"}"#,
            r#"{"locale":"en-US","market":"US"}"#,
        ] {
            let request = FlagRequest::from_bytes(Bytes::from(body)).unwrap();
            assert_eq!(request.extract_market().unwrap(), "US", "body {body}");
        }
    }

    #[test]
    fn test_repeated_field_takes_last_value() {
        let request =
            FlagRequest::from_bytes(Bytes::from(r#"{"Market":"US","market":"FR"}"#)).unwrap();
        assert_eq!(request.extract_market().unwrap(), "FR");

        let request =
            FlagRequest::from_bytes(Bytes::from(r#"{"Market":"US","MARKET":null}"#)).unwrap();
        assert_eq!(request.extract_market().unwrap(), "US");
    }

    #[test]
    fn test_non_object_body_is_parsing_error() {
        for body in ["null", "true", r#""US""#] {
            assert!(
                matches!(
                    FlagRequest::from_bytes(Bytes::from(body)),
                    Err(FlagError::RequestParsingError(_))
                ),
                "expected {body:?} to fail parsing"
            );
        }
    }

    #[test]
    fn test_ignores_unknown_fields() {
        let request =
            FlagRequest::from_bytes(Bytes::from(r#"{"Market":"DE","locale":"de-DE"}"#)).unwrap();
        assert_eq!(request.extract_market().unwrap(), "DE");
    }

    #[test]
    fn test_empty_missing_or_null_market_is_rejected() {
        for body in [r#"{"Market":""}"#, r#"{}"#, r#"{"Market":null}"#] {
            let request = FlagRequest::from_bytes(Bytes::from(body)).unwrap();
            assert!(
                matches!(request.extract_market(), Err(FlagError::EmptyMarket)),
                "expected {body} to have no market"
            );
        }
    }

    #[test]
    fn test_whitespace_market_is_kept_verbatim() {
        let request = FlagRequest::from_bytes(Bytes::from(r#"{"Market":" US"}"#)).unwrap();
        assert_eq!(request.extract_market().unwrap(), " US");
    }

    #[test]
    fn test_malformed_json_is_parsing_error() {
        for body in ["", "{", "Market=US", r#"{"Market": 42}"#, r#"["US"]"#] {
            assert!(
                matches!(
                    FlagRequest::from_bytes(Bytes::from(body)),
                    Err(FlagError::RequestParsingError(_))
                ),
                "expected {body:?} to fail parsing"
            );
        }
    }

    #[test]
    fn test_invalid_utf8_is_decoding_error() {
        let body = Bytes::from_static(&[0x7b, 0xff, 0xfe, 0x7d]);
        assert!(matches!(
            FlagRequest::from_bytes(body),
            Err(FlagError::RequestDecodingError(_))
        ));
    }
}
