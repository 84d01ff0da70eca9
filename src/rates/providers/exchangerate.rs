//! ExchangeRate-API (v6) fiat provider. Requires an API key.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::usd_based_table;
use crate::error::SourceError;
use crate::models::CurrencyCode;
use crate::rates::policy::{decode_json, RequestPolicy};
use crate::rates::source::{RateSource, RateTable};
use crate::rates::CancelToken;

const EXCHANGERATE_API_BASE: &str = "https://v6.exchangerate-api.com/v6";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: Option<String>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    conversion_rates: Option<HashMap<String, f64>>,
    rates: Option<HashMap<String, f64>>,
}

pub struct ExchangeRateSource {
    policy: Arc<RequestPolicy>,
    base_url: String,
    api_key: Option<SecretString>,
    currencies: Vec<CurrencyCode>,
}

impl ExchangeRateSource {
    pub fn new(
        policy: Arc<RequestPolicy>,
        api_key: Option<SecretString>,
        currencies: Vec<CurrencyCode>,
    ) -> Self {
        Self {
            policy,
            base_url: EXCHANGERATE_API_BASE.to_string(),
            api_key,
            currencies,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait::async_trait]
impl RateSource for ExchangeRateSource {
    fn name(&self) -> &str {
        "exchangerate"
    }

    async fn fetch(&self, cancel: &CancelToken) -> Result<RateTable, SourceError> {
        let Some(api_key) = &self.api_key else {
            return Err(SourceError::permanent(
                "missing API key (set EXCHANGERATE_API_KEY)",
            ));
        };

        let url = format!("{}/{}/latest/USD", self.base_url, api_key.expose_secret());
        let response = self.policy.execute(self.name(), &url, &[], cancel).await?;
        let body: LatestResponse = decode_json(response).await?;

        if let Some(result) = &body.result {
            if result != "success" {
                let error_type = body.error_type.as_deref().unwrap_or("unknown");
                return Err(SourceError::permanent(format!("API error: {error_type}")));
            }
        }

        let rates = body
            .conversion_rates
            .or(body.rates)
            .ok_or_else(|| SourceError::permanent("response has no conversion_rates"))?;

        Ok(usd_based_table(&rates, &self.currencies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let policy = Arc::new(RequestPolicy::new());
        let source = ExchangeRateSource::new(policy, None, vec![CurrencyCode::usd()])
            .with_base_url("http://127.0.0.1:9");

        let err = source.fetch(&CancelToken::new()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
        assert!(err.reason.contains("API key"));
    }

    #[test]
    fn parses_error_payload() {
        let body: LatestResponse =
            serde_json::from_str(r#"{"result":"error","error-type":"invalid-key"}"#).unwrap();
        assert_eq!(body.result.as_deref(), Some("error"));
        assert_eq!(body.error_type.as_deref(), Some("invalid-key"));
        assert!(body.conversion_rates.is_none());
    }
}
