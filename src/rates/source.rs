use std::collections::HashMap;

use super::CancelToken;
use crate::error::SourceError;
use crate::models::{is_usable_rate, CurrencyCode, PairKey};

/// Rates from one fetch, keyed by directional pair.
pub type RateTable = HashMap<PairKey, f64>;

/// An upstream provider of exchange rates.
///
/// A source only translates its provider's payload into [`RateTable`] entries.
/// Retries, caching and history are handled by the caller.
#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    /// Stable lower-case identifier ("coingecko", "exchangerate", ...).
    fn name(&self) -> &str;

    /// `cancel` belongs to the update run; waits inside the fetch must
    /// give up once it fires.
    async fn fetch(&self, cancel: &CancelToken) -> Result<RateTable, SourceError>;
}

/// Insert `rate` unless it is zero, negative or non-finite.
///
/// Returns whether the entry was kept.
pub fn insert_rate(table: &mut RateTable, pair: PairKey, rate: f64) -> bool {
    if !is_usable_rate(rate) {
        return false;
    }
    table.insert(pair, rate);
    true
}

/// Deterministic offline source. Performs no I/O and never fails.
#[derive(Debug, Clone)]
pub struct StaticRateSource {
    name: String,
    rates: RateTable,
}

const DEFAULT_TABLE: &[(&str, f64)] = &[
    ("BTC", 59337.21),
    ("ETH", 3720.00),
    ("SOL", 145.12),
    ("BNB", 580.50),
    ("XRP", 0.52),
    ("EUR", 1.0786),
    ("GBP", 1.2567),
    ("RUB", 0.01016),
    ("JPY", 0.0067),
    ("CNY", 0.138),
];

impl StaticRateSource {
    pub fn new(rates: RateTable) -> Self {
        let mut table = RateTable::with_capacity(rates.len());
        for (pair, rate) in rates {
            insert_rate(&mut table, pair, rate);
        }
        Self {
            name: "mock".to_string(),
            rates: table,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Snapshot values for common crypto and fiat currencies against USD.
    pub fn default_table() -> RateTable {
        let mut table = RateTable::new();
        for (code, rate) in DEFAULT_TABLE {
            if let Ok(base) = CurrencyCode::parse(code) {
                insert_rate(&mut table, PairKey::new(base, CurrencyCode::usd()), *rate);
            }
        }
        table
    }
}

impl Default for StaticRateSource {
    fn default() -> Self {
        Self::new(Self::default_table())
    }
}

#[async_trait::async_trait]
impl RateSource for StaticRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _cancel: &CancelToken) -> Result<RateTable, SourceError> {
        Ok(self.rates.clone())
    }
}
