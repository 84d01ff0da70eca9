use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::currency::{CurrencyCode, CurrencyCodeError};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PairKeyError {
    #[error("Invalid pair key {0:?}: expected FROM_TO")]
    Shape(String),
    #[error(transparent)]
    Code(#[from] CurrencyCodeError),
}

/// Directional exchange-rate key: one unit of `base` costs `rate` units of `quote`.
///
/// Canonical string form is `"{BASE}_{QUOTE}"`, which is also how the key is
/// serialized (so it can be used as a JSON object key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub base: CurrencyCode,
    pub quote: CurrencyCode,
}

impl PairKey {
    pub fn new(base: CurrencyCode, quote: CurrencyCode) -> Self {
        Self { base, quote }
    }

    /// Build a key from two raw codes.
    pub fn from_codes(base: &str, quote: &str) -> Result<Self, PairKeyError> {
        Ok(Self {
            base: CurrencyCode::parse(base)?,
            quote: CurrencyCode::parse(quote)?,
        })
    }

    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.quote)
    }
}

impl FromStr for PairKey {
    type Err = PairKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => Self::from_codes(base, quote),
            _ => Err(PairKeyError::Shape(s.to_string())),
        }
    }
}

impl Serialize for PairKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PairKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn parses_and_displays_canonical_form() {
        let pair: PairKey = "btc_usd".parse().unwrap();
        assert_eq!(pair.base.as_str(), "BTC");
        assert_eq!(pair.quote.as_str(), "USD");
        assert_eq!(pair.to_string(), "BTC_USD");
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert!("BTCUSD".parse::<PairKey>().is_err());
        assert!("BTC_USD_EUR".parse::<PairKey>().is_err());
        assert!("_USD".parse::<PairKey>().is_err());
    }

    #[test]
    fn inverse_swaps_sides() {
        let pair = PairKey::from_codes("EUR", "USD").unwrap();
        assert_eq!(pair.inverse().to_string(), "USD_EUR");
        assert_eq!(pair.inverse().inverse(), pair);
    }

    #[test]
    fn works_as_json_object_key() {
        let mut map = BTreeMap::new();
        map.insert(PairKey::from_codes("EUR", "USD").unwrap(), 1.08);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"EUR_USD":1.08}"#);

        let back: BTreeMap<PairKey, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
