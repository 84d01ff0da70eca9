#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ratekeep::clock::ManualClock;
use ratekeep::error::SourceError;
use ratekeep::models::PairKey;
use ratekeep::rates::{CancelToken, RateSource, RateTable};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

pub fn pair(raw: &str) -> PairKey {
    raw.parse().expect("valid pair")
}

pub fn table(entries: &[(&str, f64)]) -> RateTable {
    entries.iter().map(|(p, r)| (pair(p), *r)).collect()
}

/// Returns a fixed table and counts how often it was asked.
pub struct CountingSource {
    pub name: String,
    pub rates: RateTable,
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl CountingSource {
    pub fn new(name: &str, rates: RateTable) -> Self {
        Self {
            name: name.to_string(),
            rates,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for CountingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _cancel: &CancelToken) -> Result<RateTable, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.rates.clone())
    }
}

/// Always fails with the given reason.
pub struct FailingSource {
    pub name: String,
    pub reason: String,
}

impl FailingSource {
    pub fn new(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl RateSource for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _cancel: &CancelToken) -> Result<RateTable, SourceError> {
        Err(SourceError::transient(self.reason.clone()))
    }
}

/// Succeeds with nothing.
pub struct EmptySource(pub String);

#[async_trait]
impl RateSource for EmptySource {
    fn name(&self) -> &str {
        &self.0
    }

    async fn fetch(&self, _cancel: &CancelToken) -> Result<RateTable, SourceError> {
        Ok(RateTable::new())
    }
}

/// Panics inside `fetch`.
pub struct PanickingSource(pub String);

#[async_trait]
impl RateSource for PanickingSource {
    fn name(&self) -> &str {
        &self.0
    }

    async fn fetch(&self, _cancel: &CancelToken) -> Result<RateTable, SourceError> {
        panic!("provider exploded");
    }
}
