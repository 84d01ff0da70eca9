use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PairKey;

/// A single observed exchange rate with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub pair: PairKey,
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
    pub source: String,
}

impl Quote {
    /// Returns `None` unless `rate` is finite and strictly positive.
    pub fn new(
        pair: PairKey,
        rate: f64,
        updated_at: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Option<Self> {
        if !is_usable_rate(rate) {
            return None;
        }
        Some(Self {
            pair,
            rate,
            updated_at,
            source: source.into(),
        })
    }
}

pub fn is_usable_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_and_non_finite_rates() {
        let pair = PairKey::from_codes("BTC", "USD").unwrap();
        let now = Utc::now();
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(Quote::new(pair.clone(), rate, now, "test").is_none());
        }
        assert!(Quote::new(pair, 60000.0, now, "test").is_some());
    }
}
