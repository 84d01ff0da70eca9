use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid currency code {value:?}: expected 2-5 letters")]
pub struct CurrencyCodeError {
    value: String,
}

/// Upper-case ticker of a fiat or crypto currency (`USD`, `BTC`).
///
/// Input is trimmed and upper-cased before validation, so `" eur "` parses as
/// `EUR`. Codes never contain `_`, which keeps pair keys unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{2,5}$").expect("static regex is valid"))
}

impl CurrencyCode {
    pub fn parse(value: &str) -> Result<Self, CurrencyCodeError> {
        let normalized = value.trim().to_uppercase();
        if code_pattern().is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(CurrencyCodeError {
                value: value.to_string(),
            })
        }
    }

    /// The anchor currency every provider quotes against.
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CurrencyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CurrencyKind {
    Fiat {
        issuing_country: String,
    },
    Crypto {
        algorithm: String,
        #[serde(default)]
        market_cap: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: CurrencyCode,
    pub name: String,
    #[serde(flatten)]
    pub kind: CurrencyKind,
}

impl Currency {
    pub fn fiat(code: &str, name: &str, issuing_country: &str) -> Result<Self, CurrencyCodeError> {
        Ok(Self {
            code: CurrencyCode::parse(code)?,
            name: name.to_string(),
            kind: CurrencyKind::Fiat {
                issuing_country: issuing_country.to_string(),
            },
        })
    }

    pub fn crypto(
        code: &str,
        name: &str,
        algorithm: &str,
        market_cap: f64,
    ) -> Result<Self, CurrencyCodeError> {
        Ok(Self {
            code: CurrencyCode::parse(code)?,
            name: name.to_string(),
            kind: CurrencyKind::Crypto {
                algorithm: algorithm.to_string(),
                market_cap,
            },
        })
    }

    pub fn is_crypto(&self) -> bool {
        matches!(self.kind, CurrencyKind::Crypto { .. })
    }

    /// One-line description for listings and logs.
    pub fn display_info(&self) -> String {
        match &self.kind {
            CurrencyKind::Fiat { issuing_country } => {
                format!("[FIAT] {} - {} (Issuing: {issuing_country})", self.code, self.name)
            }
            CurrencyKind::Crypto {
                algorithm,
                market_cap,
            } => {
                let mcap = if *market_cap > 0.0 {
                    format!("{market_cap:.2e}")
                } else {
                    "N/A".to_string()
                };
                format!(
                    "[CRYPTO] {} - {} (Algo: {algorithm}, MCAP: {mcap})",
                    self.code, self.name
                )
            }
        }
    }
}

/// Currencies the wallet knows how to hold and trade.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<CurrencyCode, Currency>,
}

impl CurrencyRegistry {
    pub fn empty() -> Self {
        Self {
            currencies: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, currency: Currency) {
        self.currencies.insert(currency.code.clone(), currency);
    }

    pub fn get(&self, code: &CurrencyCode) -> Option<&Currency> {
        self.currencies.get(code)
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.currencies.contains_key(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.values()
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        let builtin = [
            Currency::fiat("USD", "US Dollar", "United States"),
            Currency::fiat("EUR", "Euro", "Eurozone"),
            Currency::fiat("GBP", "British Pound", "United Kingdom"),
            Currency::fiat("RUB", "Russian Ruble", "Russia"),
            Currency::fiat("JPY", "Japanese Yen", "Japan"),
            Currency::fiat("CNY", "Chinese Yuan", "China"),
            Currency::crypto("BTC", "Bitcoin", "SHA-256", 1.12e12),
            Currency::crypto("ETH", "Ethereum", "Ethash", 4.5e11),
            Currency::crypto("SOL", "Solana", "Proof of History", 6.5e10),
            Currency::crypto("BNB", "BNB", "Proof of Staked Authority", 8.5e10),
            Currency::crypto("XRP", "XRP", "XRP Ledger Consensus", 3.0e10),
        ];

        let mut registry = Self::empty();
        for currency in builtin.into_iter().flatten() {
            registry.register(currency);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        assert_eq!(CurrencyCode::parse(" btc ").unwrap().as_str(), "BTC");
    }

    #[test]
    fn parse_rejects_bad_codes() {
        for bad in ["", "A", "TOOLONG", "US_D", "U5D", "€"] {
            assert!(CurrencyCode::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn deserialization_validates() {
        let ok: CurrencyCode = serde_json::from_str(r#""eur""#).unwrap();
        assert_eq!(ok.as_str(), "EUR");
        assert!(serde_json::from_str::<CurrencyCode>(r#""E""#).is_err());
    }

    #[test]
    fn default_registry_has_fiat_and_crypto() {
        let registry = CurrencyRegistry::default();
        let usd = registry.get(&CurrencyCode::parse("USD").unwrap()).unwrap();
        assert!(!usd.is_crypto());
        assert!(usd.display_info().starts_with("[FIAT] USD"));

        let btc = registry.get(&CurrencyCode::parse("BTC").unwrap()).unwrap();
        assert!(btc.is_crypto());
        assert!(btc.display_info().contains("SHA-256"));
    }

    #[test]
    fn register_adds_new_currency() {
        let mut registry = CurrencyRegistry::empty();
        registry.register(Currency::crypto("DOGE", "Dogecoin", "Scrypt", 0.0).unwrap());
        let doge = CurrencyCode::parse("DOGE").unwrap();
        assert!(registry.contains(&doge));
        assert!(registry.get(&doge).unwrap().display_info().contains("MCAP: N/A"));
    }
}
