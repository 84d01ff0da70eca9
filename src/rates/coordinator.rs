//! One update cycle: fetch every source, merge results, journal them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinError;
use tracing::{info, warn};

use super::cache::RateCache;
use super::history::HistoryLog;
use super::source::{RateSource, RateTable};
use super::CancelToken;
use crate::clock::Clock;
use crate::error::SourceError;
use crate::models::{HistoryRecord, PairKey, Quote};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSuccess {
    pub source: String,
    pub rates_count: usize,
    #[serde(rename = "duration_ms", with = "crate::duration::millis")]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

/// Outcome of one cycle. Source failures are data here, never errors.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub successes: Vec<SourceSuccess>,
    pub failures: Vec<SourceFailure>,
    pub total_rates: usize,
    pub unique_pairs: usize,
    pub timestamp: DateTime<Utc>,
}

impl UpdateReport {
    fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
            total_rates: 0,
            unique_pairs: 0,
            timestamp,
        }
    }

    /// True when at least one source ran and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.successes.is_empty() && !self.failures.is_empty()
    }
}

pub struct UpdateCoordinator {
    sources: Vec<Arc<dyn RateSource>>,
    cache: Arc<RateCache>,
    history: Arc<HistoryLog>,
    clock: Arc<dyn Clock>,
}

impl UpdateCoordinator {
    pub fn new(
        sources: Vec<Arc<dyn RateSource>>,
        cache: Arc<RateCache>,
        history: Arc<HistoryLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sources,
            cache,
            history,
            clock,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Run one cycle over all sources, or only the one named by `filter`
    /// (case-insensitive).
    ///
    /// Once `cancel` fires the source in flight finishes; every source not yet
    /// started is reported as a "cancelled" failure.
    pub async fn run(&self, filter: Option<&str>, cancel: &CancelToken) -> UpdateReport {
        let selected: Vec<&Arc<dyn RateSource>> = self
            .sources
            .iter()
            .filter(|s| filter.map_or(true, |f| s.name().eq_ignore_ascii_case(f)))
            .collect();

        if selected.is_empty() {
            match filter {
                Some(f) => warn!(
                    filter = f,
                    available = ?self.source_names(),
                    "No rate source matches filter"
                ),
                None => warn!("No rate sources configured"),
            }
            return UpdateReport::empty(self.clock.now());
        }

        info!(sources = selected.len(), "Starting rate update");
        let mut report = UpdateReport::empty(self.clock.now());
        let mut pairs: HashSet<PairKey> = HashSet::new();

        for source in selected {
            let name = source.name().to_string();
            if cancel.is_cancelled() {
                info!(source = %name, "Rate update cancelled; skipping source");
                report.failures.push(SourceFailure {
                    source: name,
                    reason: "cancelled".to_string(),
                });
                continue;
            }

            let started = Instant::now();
            let task_source = Arc::clone(source);
            let task_cancel = cancel.clone();
            let outcome =
                tokio::spawn(async move { task_source.fetch(&task_cancel).await }).await;
            let duration = started.elapsed();

            match self.apply(&name, outcome, duration).await {
                Ok((count, applied)) => {
                    info!(
                        source = %name,
                        rates = count,
                        duration_ms = duration.as_millis() as u64,
                        "Source updated"
                    );
                    pairs.extend(applied);
                    report.total_rates += count;
                    report.successes.push(SourceSuccess {
                        source: name,
                        rates_count: count,
                        duration,
                    });
                }
                Err(reason) => {
                    warn!(source = %name, reason = %reason, "Source failed");
                    report.failures.push(SourceFailure {
                        source: name,
                        reason,
                    });
                }
            }
        }

        report.unique_pairs = pairs.len();
        report.timestamp = self.clock.now();
        info!(
            succeeded = report.successes.len(),
            failed = report.failures.len(),
            total_rates = report.total_rates,
            "Rate update finished"
        );
        report
    }

    /// Turn one fetch outcome into stored quotes, or a failure reason.
    async fn apply(
        &self,
        name: &str,
        outcome: Result<Result<RateTable, SourceError>, JoinError>,
        duration: Duration,
    ) -> Result<(usize, Vec<PairKey>), String> {
        let table = match outcome {
            Ok(Ok(table)) => table,
            Ok(Err(e)) => return Err(e.reason),
            Err(e) => return Err(format!("unexpected error: {}", panic_message(e))),
        };

        let now = self.clock.now();
        let quotes: Vec<Quote> = table
            .into_iter()
            .filter_map(|(pair, rate)| Quote::new(pair, rate, now, name))
            .collect();
        if quotes.is_empty() {
            return Err("no rates received".to_string());
        }

        let count = quotes.len();
        let pairs: Vec<PairKey> = quotes.iter().map(|q| q.pair.clone()).collect();

        let mut meta = serde_json::Map::new();
        meta.insert(
            "fetch_time_ms".to_string(),
            serde_json::json!(duration.as_millis() as u64),
        );
        meta.insert("rates_count".to_string(), serde_json::json!(count));
        let records: Vec<HistoryRecord> = quotes
            .iter()
            .map(|q| HistoryRecord::from_quote(q, meta.clone()))
            .collect();

        self.cache
            .merge(quotes)
            .await
            .map_err(|e| format!("failed to store rates: {e}"))?;

        if let Err(e) = self.history.append_batch(records).await {
            warn!(source = %name, error = %e, "Rates cached but history was not saved");
        }

        Ok((count, pairs))
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "source panicked".to_string()
    }
}
