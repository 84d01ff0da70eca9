//! Frankfurter FX rate provider using ECB daily reference rates.
//!
//! The Frankfurter API provides free access to ECB exchange rates without an
//! API key. Rates are requested with USD as the base and translated the same
//! way as ExchangeRate-API quotes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use super::usd_based_table;
use crate::error::SourceError;
use crate::models::CurrencyCode;
use crate::rates::policy::{decode_json, RequestPolicy};
use crate::rates::source::{RateSource, RateTable};
use crate::rates::CancelToken;

const FRANKFURTER_BASE_URL: &str = "https://api.frankfurter.app";

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    /// Map of currency codes to units per 1 USD.
    rates: HashMap<String, f64>,
}

pub struct FrankfurterSource {
    policy: Arc<RequestPolicy>,
    base_url: String,
    currencies: Vec<CurrencyCode>,
}

impl FrankfurterSource {
    pub fn new(policy: Arc<RequestPolicy>, currencies: Vec<CurrencyCode>) -> Self {
        Self {
            policy,
            base_url: FRANKFURTER_BASE_URL.to_string(),
            currencies,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait::async_trait]
impl RateSource for FrankfurterSource {
    fn name(&self) -> &str {
        "frankfurter"
    }

    async fn fetch(&self, cancel: &CancelToken) -> Result<RateTable, SourceError> {
        let usd = CurrencyCode::usd();
        let symbols = self
            .currencies
            .iter()
            .filter(|c| **c != usd)
            .map(CurrencyCode::as_str)
            .collect::<Vec<_>>()
            .join(",");
        if symbols.is_empty() {
            return Ok(RateTable::new());
        }

        let url = format!("{}/latest", self.base_url);
        let response = self
            .policy
            .execute(
                self.name(),
                &url,
                &[("from", "USD"), ("to", symbols.as_str())],
                cancel,
            )
            .await?;
        let body: FrankfurterResponse = decode_json(response).await?;

        Ok(usd_based_table(&body.rates, &self.currencies))
    }
}
