//! HTTP rate providers.

mod coingecko;
mod exchangerate;
mod frankfurter;

pub use coingecko::CoinGeckoSource;
pub use exchangerate::ExchangeRateSource;
pub use frankfurter::FrankfurterSource;

use std::collections::HashMap;

use super::source::{insert_rate, RateTable};
use crate::models::{CurrencyCode, PairKey};

/// Translate a USD-based quote map (`rates[X]` = units of X per 1 USD).
///
/// Produces `X_USD = 1 / rates[X]` for every requested code and each cross
/// pair `A_B = rates[B] / rates[A]`. Codes missing from `rates` are skipped.
pub(crate) fn usd_based_table(rates: &HashMap<String, f64>, codes: &[CurrencyCode]) -> RateTable {
    let usd = CurrencyCode::usd();
    let present: Vec<(&CurrencyCode, f64)> = codes
        .iter()
        .filter(|code| **code != usd)
        .filter_map(|code| rates.get(code.as_str()).map(|r| (code, *r)))
        .collect();

    let mut table = RateTable::new();
    for (code, per_usd) in &present {
        insert_rate(
            &mut table,
            PairKey::new((*code).clone(), usd.clone()),
            1.0 / per_usd,
        );
    }

    for (from, from_per_usd) in &present {
        for (to, to_per_usd) in &present {
            if from == to {
                continue;
            }
            insert_rate(
                &mut table,
                PairKey::new((*from).clone(), (*to).clone()),
                to_per_usd / from_per_usd,
            );
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(raw: &[&str]) -> Vec<CurrencyCode> {
        raw.iter().map(|c| CurrencyCode::parse(c).unwrap()).collect()
    }

    #[test]
    fn inverts_usd_quotes_and_builds_crosses() {
        let rates = HashMap::from([
            ("EUR".to_string(), 0.9259),
            ("GBP".to_string(), 0.8),
            ("USD".to_string(), 1.0),
        ]);
        let table = usd_based_table(&rates, &codes(&["EUR", "GBP", "JPY"]));

        let eur_usd = table[&PairKey::from_codes("EUR", "USD").unwrap()];
        assert!((eur_usd - 1.0 / 0.9259).abs() < 1e-9);

        let eur_gbp = table[&PairKey::from_codes("EUR", "GBP").unwrap()];
        assert!((eur_gbp - 0.8 / 0.9259).abs() < 1e-9);
        assert!(table.contains_key(&PairKey::from_codes("GBP", "EUR").unwrap()));

        // JPY was requested but not returned
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn zero_quote_is_dropped() {
        let rates = HashMap::from([("EUR".to_string(), 0.0)]);
        assert!(usd_based_table(&rates, &codes(&["EUR"])).is_empty());
    }
}
