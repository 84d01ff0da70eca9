use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::PersistenceError;
use crate::models::{HistoryFilter, HistoryRecord, PairKey, PairStatistics};
use crate::storage::{write_document, DocumentStore};

/// Document key the journal is persisted under.
pub const HISTORY_KEY: &str = "exchange_rates";

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Bounded, append-only journal of observed rates.
///
/// Records are kept in append order; once the cap is exceeded the oldest are
/// evicted first. Writers are serialized and persist the next journal before
/// swapping it in, so readers only wait for the swap.
pub struct HistoryLog {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    cap: usize,
    writer: Mutex<()>,
    records: RwLock<Vec<HistoryRecord>>,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, cap: usize) -> Self {
        Self::with_records(store, clock, cap, Vec::new())
    }

    fn with_records(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        cap: usize,
        mut records: Vec<HistoryRecord>,
    ) -> Self {
        let cap = cap.max(1);
        evict_oldest(&mut records, cap);
        Self {
            store,
            clock,
            cap,
            writer: Mutex::new(()),
            records: RwLock::new(records),
        }
    }

    /// Restore the persisted journal. Records that fail to parse (bad
    /// timestamp, missing fields) are skipped with a warning.
    pub async fn load(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        cap: usize,
    ) -> Result<Self, PersistenceError> {
        let raw = store
            .read(HISTORY_KEY)
            .await
            .map_err(|e| PersistenceError::new(HISTORY_KEY, e))?;

        let entries = match raw {
            Some(serde_json::Value::Array(entries)) => entries,
            Some(_) => {
                warn!(key = HISTORY_KEY, "History document is not a list; starting empty");
                Vec::new()
            }
            None => Vec::new(),
        };

        let total = entries.len();
        let records: Vec<HistoryRecord> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping invalid history record");
                    None
                }
            })
            .collect();
        debug!(loaded = records.len(), skipped = total - records.len(), "Loaded rate history");

        Ok(Self::with_records(store, clock, cap, records))
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn append(&self, record: HistoryRecord) -> Result<(), PersistenceError> {
        self.append_batch(vec![record]).await.map(|_| ())
    }

    /// Append all records in one persisted write. Returns how many were added.
    pub async fn append_batch(&self, batch: Vec<HistoryRecord>) -> Result<usize, PersistenceError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let added = batch.len();

        let _writer = self.writer.lock().await;
        let mut next = self.records.read().await.clone();
        next.extend(batch);
        evict_oldest(&mut next, self.cap);

        write_document(self.store.as_ref(), HISTORY_KEY, &next).await?;
        *self.records.write().await = next;
        Ok(added)
    }

    /// Matching records, newest first, at most `limit`.
    pub async fn query(&self, filter: &HistoryFilter, limit: usize) -> Vec<HistoryRecord> {
        let records = self.records.read().await;
        let mut matched: Vec<HistoryRecord> =
            records.iter().filter(|r| filter.matches(r)).cloned().collect();
        matched.reverse();
        // Stable, so equal timestamps keep newest-appended first.
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit);
        matched
    }

    /// Drop records older than `max_age`. Returns the number removed.
    pub async fn prune(&self, max_age: Duration) -> Result<usize, PersistenceError> {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return Ok(0);
        };
        let Some(cutoff) = self.clock.now().checked_sub_signed(max_age) else {
            return Ok(0);
        };

        let _writer = self.writer.lock().await;
        let (next, removed) = {
            let records = self.records.read().await;
            let next: Vec<HistoryRecord> = records
                .iter()
                .filter(|r| r.timestamp >= cutoff)
                .cloned()
                .collect();
            let removed = records.len() - next.len();
            (next, removed)
        };
        if removed == 0 {
            return Ok(0);
        }

        write_document(self.store.as_ref(), HISTORY_KEY, &next).await?;
        *self.records.write().await = next;
        Ok(removed)
    }

    pub async fn statistics(&self, pair: &PairKey) -> Option<PairStatistics> {
        let records = self.records.read().await;
        let mut matched: Vec<&HistoryRecord> = records
            .iter()
            .filter(|r| r.from_currency == pair.base && r.to_currency == pair.quote)
            .collect();
        matched.sort_by_key(|r| r.timestamp);

        let first = matched.first()?;
        let last = matched.last()?;

        let count = matched.len();
        let (min, max, sum) = matched.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), r| (min.min(r.rate), max.max(r.rate), sum + r.rate),
        );

        Some(PairStatistics {
            pair: pair.clone(),
            count,
            min,
            max,
            avg: sum / count as f64,
            latest: last.rate,
            first_timestamp: first.timestamp,
            last_timestamp: last.timestamp,
        })
    }
}

fn evict_oldest(records: &mut Vec<HistoryRecord>, cap: usize) {
    if records.len() > cap {
        let excess = records.len() - cap;
        records.drain(..excess);
    }
}
