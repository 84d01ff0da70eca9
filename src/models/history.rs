use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CurrencyCode, PairKey, Quote};

/// One journal entry of an observed rate. Never mutated, only pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub from_currency: CurrencyCode,
    pub to_currency: CurrencyCode,
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl HistoryRecord {
    pub fn from_quote(quote: &Quote, meta: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_currency: quote.pair.base.clone(),
            to_currency: quote.pair.quote.clone(),
            rate: quote.rate,
            timestamp: quote.updated_at,
            source: quote.source.clone(),
            meta,
        }
    }

    pub fn pair(&self) -> PairKey {
        PairKey::new(self.from_currency.clone(), self.to_currency.clone())
    }
}

/// Conjunctive filter for history queries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub from: Option<CurrencyCode>,
    pub to: Option<CurrencyCode>,
    pub source: Option<String>,
}

impl HistoryFilter {
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        if let Some(from) = &self.from {
            if &record.from_currency != from {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if &record.to_currency != to {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if !record.source.eq_ignore_ascii_case(source) {
                return false;
            }
        }
        true
    }
}

/// Aggregates over every journal entry of one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairStatistics {
    pub pair: PairKey,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub latest: f64,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
}
