use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{PersistenceError, RateError};
use crate::models::{is_usable_rate, CurrencyCode, PairKey, Quote};
use crate::storage::{write_document, DocumentStore};

/// Document key the cache is persisted under.
pub const RATES_KEY: &str = "rates";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateCacheState {
    #[serde(default)]
    pub pairs: BTreeMap<PairKey, Quote>,
    #[serde(default)]
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Answer to a freshness-checked lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLookup {
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
    /// `None` for the identity pair, which never touches the cache.
    pub source: Option<String>,
    /// True when derived from the reverse pair.
    pub inverted: bool,
}

/// Shared `pair -> Quote` table with staleness tracking.
///
/// Merges are serialized and copy-on-write: a new state is built and persisted
/// before it replaces the old one, so readers never observe a half-applied
/// batch and a failed persist leaves the cache as it was.
pub struct RateCache {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    merge_lock: Mutex<()>,
    state: RwLock<Arc<RateCacheState>>,
}

impl RateCache {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_state(store, clock, RateCacheState::default())
    }

    fn with_state(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        state: RateCacheState,
    ) -> Self {
        Self {
            store,
            clock,
            merge_lock: Mutex::new(()),
            state: RwLock::new(Arc::new(state)),
        }
    }

    /// Restore the persisted cache. Entries that don't parse are dropped.
    pub async fn load(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PersistenceError> {
        let raw = store
            .read(RATES_KEY)
            .await
            .map_err(|e| PersistenceError::new(RATES_KEY, e))?;
        let state = raw.map(parse_state).unwrap_or_default();
        debug!(pairs = state.pairs.len(), "Loaded rate cache");
        Ok(Self::with_state(store, clock, state))
    }

    fn current(&self) -> Arc<RateCacheState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Upsert a batch of quotes. Later entries for the same pair win.
    ///
    /// Returns the number of quotes applied.
    pub async fn merge(&self, quotes: Vec<Quote>) -> Result<usize, PersistenceError> {
        let _guard = self.merge_lock.lock().await;

        let mut next = (*self.current()).clone();
        let applied = quotes.len();
        for quote in quotes {
            next.pairs.insert(quote.pair.clone(), quote);
        }
        next.last_refresh = Some(self.clock.now());

        write_document(self.store.as_ref(), RATES_KEY, &next).await?;

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(applied)
    }

    /// Freshness-checked rate for `from -> to`.
    ///
    /// The direct pair wins whenever it is fresh; otherwise a fresh reverse
    /// entry is inverted. Age equal to `ttl` still counts as fresh.
    pub fn lookup(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        ttl: Duration,
    ) -> Result<RateLookup, RateError> {
        let now = self.clock.now();
        if from == to {
            return Ok(RateLookup {
                rate: 1.0,
                updated_at: now,
                source: None,
                inverted: false,
            });
        }

        let state = self.current();
        let pair = PairKey::new(from.clone(), to.clone());

        if let Some(quote) = state.pairs.get(&pair) {
            if is_fresh(quote, now, ttl) {
                return Ok(RateLookup {
                    rate: quote.rate,
                    updated_at: quote.updated_at,
                    source: Some(quote.source.clone()),
                    inverted: false,
                });
            }
        }

        if let Some(quote) = state.pairs.get(&pair.inverse()) {
            if is_fresh(quote, now, ttl) {
                return Ok(RateLookup {
                    rate: 1.0 / quote.rate,
                    updated_at: quote.updated_at,
                    source: Some(quote.source.clone()),
                    inverted: true,
                });
            }
        }

        Err(RateError::StaleOrMissingRate {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn snapshot(&self) -> RateCacheState {
        (*self.current()).clone()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.current().last_refresh
    }

    pub fn len(&self) -> usize {
        self.current().pairs.len()
    }

    /// Number of cached pairs last supplied by each source.
    pub fn pairs_by_source(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for quote in self.current().pairs.values() {
            *counts.entry(quote.source.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A timestamp in the future counts as age zero.
fn is_fresh(quote: &Quote, now: DateTime<Utc>, ttl: Duration) -> bool {
    let age = (now - quote.updated_at).to_std().unwrap_or(Duration::ZERO);
    age <= ttl
}

fn parse_state(raw: serde_json::Value) -> RateCacheState {
    let mut state = RateCacheState {
        pairs: BTreeMap::new(),
        last_refresh: raw
            .get("last_refresh")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok()),
    };

    let Some(pairs) = raw.get("pairs").and_then(|p| p.as_object()) else {
        return state;
    };
    for (key, value) in pairs {
        match serde_json::from_value::<Quote>(value.clone()) {
            Ok(quote) if is_usable_rate(quote.rate) => {
                state.pairs.insert(quote.pair.clone(), quote);
            }
            Ok(_) => warn!(pair = %key, "Dropping cached rate with unusable value"),
            Err(e) => warn!(pair = %key, error = %e, "Dropping unparseable cached rate"),
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn code(c: &str) -> CurrencyCode {
        CurrencyCode::parse(c).unwrap()
    }

    fn quote(pair: &str, rate: f64, at: DateTime<Utc>) -> Quote {
        Quote::new(pair.parse().unwrap(), rate, at, "test").unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn merge_then_lookup_direct_and_inverse() {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = RateCache::new(Arc::new(MemoryStore::new()), clock.clone());
        cache
            .merge(vec![quote("USD_EUR", 0.9259, start())])
            .await
            .unwrap();

        let direct = cache.lookup(&code("USD"), &code("EUR"), Duration::from_secs(300)).unwrap();
        assert_eq!(direct.rate, 0.9259);
        assert!(!direct.inverted);

        let inverse = cache.lookup(&code("EUR"), &code("USD"), Duration::from_secs(300)).unwrap();
        assert!((inverse.rate - 1.0 / 0.9259).abs() < 1e-12);
        assert!(inverse.inverted);
        assert_eq!(cache.last_refresh(), Some(start()));
    }

    #[tokio::test]
    async fn later_quote_in_batch_wins() {
        let cache = RateCache::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(start())));
        cache
            .merge(vec![quote("BTC_USD", 1.0, start()), quote("BTC_USD", 2.0, start())])
            .await
            .unwrap();
        assert_eq!(cache.snapshot().pairs.len(), 1);
        let hit = cache.lookup(&code("BTC"), &code("USD"), Duration::from_secs(1)).unwrap();
        assert_eq!(hit.rate, 2.0);
    }

    #[tokio::test]
    async fn counts_pairs_per_source() {
        let cache = RateCache::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(start())));
        let eur = Quote::new("EUR_USD".parse().unwrap(), 1.08, start(), "frankfurter").unwrap();
        cache
            .merge(vec![quote("BTC_USD", 1.0, start()), quote("ETH_USD", 2.0, start()), eur])
            .await
            .unwrap();

        let counts = cache.pairs_by_source();
        assert_eq!(counts.get("test"), Some(&2));
        assert_eq!(counts.get("frankfurter"), Some(&1));
    }

    #[tokio::test]
    async fn future_timestamp_counts_as_fresh() {
        let cache = RateCache::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(start())));
        let ahead = start() + chrono::Duration::seconds(30);
        cache.merge(vec![quote("BTC_USD", 1.0, ahead)]).await.unwrap();
        assert!(cache.lookup(&code("BTC"), &code("USD"), Duration::ZERO).is_ok());
    }

    #[tokio::test]
    async fn load_drops_corrupt_entries() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_raw(
                RATES_KEY,
                serde_json::json!({
                    "pairs": {
                        "BTC_USD": {"pair": "BTC_USD", "rate": 60000.0, "updated_at": "2024-05-01T12:00:00Z", "source": "coingecko"},
                        "ETH_USD": {"pair": "ETH_USD", "rate": 3000.0, "updated_at": "yesterday", "source": "coingecko"},
                        "XRP_USD": {"pair": "XRP_USD", "rate": -1.0, "updated_at": "2024-05-01T12:00:00Z", "source": "coingecko"}
                    },
                    "last_refresh": "2024-05-01T12:00:00Z"
                }),
            )
            .await;

        let cache = RateCache::load(store, Arc::new(ManualClock::new(start()))).await.unwrap();
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.pairs.len(), 1);
        assert_eq!(snapshot.last_refresh, Some(start()));
    }
}
