//! Builds the configured rate sources.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use super::policy::RequestPolicy;
use super::providers::{CoinGeckoSource, ExchangeRateSource, FrankfurterSource};
use super::source::{RateSource, StaticRateSource};
use crate::config::{RequestConfig, ResolvedConfig};

pub fn build_policy(config: &RequestConfig) -> RequestPolicy {
    RequestPolicy::new()
        .with_timeout(config.timeout)
        .with_max_attempts(config.max_attempts)
        .with_retry_delay(config.retry_delay)
        .with_rate_limit_cooldown(config.rate_limit_cooldown)
}

/// Every enabled live source, in a fixed order. ExchangeRate-API is skipped
/// when no key is configured. Falls back to the offline table when `mock`
/// is set or nothing live remains.
pub fn build_sources(config: &ResolvedConfig, policy: Arc<RequestPolicy>) -> Vec<Arc<dyn RateSource>> {
    let settings = &config.sources;
    let mut sources: Vec<Arc<dyn RateSource>> = Vec::new();

    if settings.mock {
        info!("Using the offline rate table");
        return vec![Arc::new(StaticRateSource::default())];
    }

    if settings.coingecko {
        let mut source = CoinGeckoSource::new(Arc::clone(&policy), config.crypto.clone());
        if let Some(url) = &settings.coingecko_url {
            source = source.with_base_url(url);
        }
        sources.push(Arc::new(source));
    }

    if settings.exchangerate {
        match &config.exchangerate_api_key {
            Some(key) => {
                let key = SecretString::from(key.expose_secret().to_string());
                let mut source =
                    ExchangeRateSource::new(Arc::clone(&policy), Some(key), config.fiat.clone());
                if let Some(url) = &settings.exchangerate_url {
                    source = source.with_base_url(url);
                }
                sources.push(Arc::new(source));
            }
            None => warn!("ExchangeRate-API enabled but no API key set; skipping it"),
        }
    }

    if settings.frankfurter {
        let mut source = FrankfurterSource::new(Arc::clone(&policy), config.fiat.clone());
        if let Some(url) = &settings.frankfurter_url {
            source = source.with_base_url(url);
        }
        sources.push(Arc::new(source));
    }

    if sources.is_empty() {
        warn!("No live rate source available; using the offline rate table");
        sources.push(Arc::new(StaticRateSource::default()));
    }
    sources
}
