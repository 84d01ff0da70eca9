//! CoinGecko crypto price provider.
//!
//! Uses the free `/simple/price` endpoint to fetch current USD prices for all
//! configured coins in one request. No API key is required, though rate limits
//! apply (which is what the 429 cooldown in the request policy is for).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::SourceError;
use crate::models::{CurrencyCode, PairKey};
use crate::rates::policy::{decode_json, RequestPolicy};
use crate::rates::source::{insert_rate, RateSource, RateTable};
use crate::rates::CancelToken;

const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";

/// `{"bitcoin": {"usd": 59337.21}, ...}`
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

pub struct CoinGeckoSource {
    policy: Arc<RequestPolicy>,
    base_url: String,
    coins: Vec<CurrencyCode>,
    /// Custom symbol to CoinGecko ID mappings (overrides defaults)
    custom_mappings: HashMap<String, String>,
}

impl CoinGeckoSource {
    pub fn new(policy: Arc<RequestPolicy>, coins: Vec<CurrencyCode>) -> Self {
        Self {
            policy,
            base_url: COINGECKO_API_BASE.to_string(),
            coins,
            custom_mappings: HashMap::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Adds a single custom mapping from symbol to CoinGecko ID.
    pub fn with_mapping(mut self, symbol: impl Into<String>, coingecko_id: impl Into<String>) -> Self {
        self.custom_mappings
            .insert(symbol.into().to_uppercase(), coingecko_id.into());
        self
    }

    /// Maps a ticker to a CoinGecko coin ID, falling back to the lower-cased
    /// ticker when neither the custom nor the built-in table knows it.
    fn coingecko_id(&self, code: &CurrencyCode) -> String {
        if let Some(id) = self.custom_mappings.get(code.as_str()) {
            return id.clone();
        }

        let id = match code.as_str() {
            "BTC" => "bitcoin",
            "ETH" => "ethereum",
            "SOL" => "solana",
            "BNB" => "binancecoin",
            "XRP" => "ripple",
            "USDT" => "tether",
            "USDC" => "usd-coin",
            "ADA" => "cardano",
            "DOGE" => "dogecoin",
            "DOT" => "polkadot",
            "LTC" => "litecoin",
            "TRX" => "tron",
            "AVAX" => "avalanche-2",
            "LINK" => "chainlink",
            "XLM" => "stellar",
            "XMR" => "monero",
            _ => return code.as_str().to_lowercase(),
        };
        id.to_string()
    }
}

#[async_trait::async_trait]
impl RateSource for CoinGeckoSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch(&self, cancel: &CancelToken) -> Result<RateTable, SourceError> {
        let ids: Vec<(CurrencyCode, String)> = self
            .coins
            .iter()
            .map(|code| (code.clone(), self.coingecko_id(code)))
            .collect();
        if ids.is_empty() {
            return Ok(RateTable::new());
        }

        let joined = ids
            .iter()
            .map(|(_, id)| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/simple/price", self.base_url);

        let response = self
            .policy
            .execute(
                self.name(),
                &url,
                &[("ids", joined.as_str()), ("vs_currencies", "usd")],
                cancel,
            )
            .await?;
        let data: SimplePriceResponse = decode_json(response).await?;

        let mut table = RateTable::new();
        for (code, id) in ids {
            let Some(price) = data.get(&id).and_then(|prices| prices.get("usd")) else {
                debug!(code = %code, id = %id, "CoinGecko returned no USD price");
                continue;
            };
            insert_rate(&mut table, PairKey::new(code, CurrencyCode::usd()), *price);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> CoinGeckoSource {
        let policy = Arc::new(RequestPolicy::new());
        CoinGeckoSource::new(policy, vec![]).with_mapping("wbtc", "wrapped-bitcoin")
    }

    #[test]
    fn maps_known_and_custom_symbols() {
        let source = source();
        let id = |c: &str| source.coingecko_id(&CurrencyCode::parse(c).unwrap());
        assert_eq!(id("BTC"), "bitcoin");
        assert_eq!(id("BNB"), "binancecoin");
        assert_eq!(id("WBTC"), "wrapped-bitcoin");
        assert_eq!(id("PEPE"), "pepe");
    }

    #[tokio::test]
    async fn no_coins_means_no_request() {
        let table = source().fetch(&CancelToken::new()).await.unwrap();
        assert!(table.is_empty());
    }
}
