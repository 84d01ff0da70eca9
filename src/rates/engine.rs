use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use super::cache::{RateCache, RateCacheState, RateLookup};
use super::coordinator::{UpdateCoordinator, UpdateReport};
use super::factory::{build_policy, build_sources};
use super::history::{HistoryLog, DEFAULT_HISTORY_LIMIT};
use super::scheduler::{Scheduler, SchedulerStatus, DEFAULT_STOP_TIMEOUT, DEFAULT_UPDATE_INTERVAL};
use super::source::RateSource;
use super::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::error::{PersistenceError, RateError};
use crate::models::{CurrencyCode, HistoryFilter, HistoryRecord, PairKey, PairStatistics};
use crate::storage::{DocumentStore, JsonFileStore, MemoryStore};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Composition root for the rate subsystem.
///
/// Owns the cache, the history log, the update coordinator and the scheduler,
/// and exposes the query surface the wallet and the CLI use. Build one with
/// [`RateEngine::open`] or [`RateEngine::builder`] and share it via `Arc`.
pub struct RateEngine {
    cache: Arc<RateCache>,
    history: Arc<HistoryLog>,
    coordinator: Arc<UpdateCoordinator>,
    scheduler: Scheduler,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl RateEngine {
    pub fn builder() -> RateEngineBuilder {
        RateEngineBuilder::default()
    }

    /// Open the engine over the JSON data directory with the configured sources.
    pub async fn open(config: &ResolvedConfig) -> Result<Self> {
        let policy = Arc::new(build_policy(&config.request));
        let sources = build_sources(config, policy);

        let engine = Self::builder()
            .with_store(Arc::new(JsonFileStore::new(&config.data_dir)))
            .with_sources(sources)
            .with_ttl(config.rates.ttl)
            .with_update_interval(config.rates.update_interval)
            .with_history_limit(config.rates.history_limit)
            .build()
            .await?;

        info!(
            data_dir = %config.data_dir.display(),
            sources = ?engine.source_names(),
            "Rate engine ready"
        );
        Ok(engine)
    }

    /// Fresh rate for `from -> to` under the configured TTL.
    pub fn lookup(&self, from: &str, to: &str) -> Result<RateLookup, RateError> {
        self.lookup_with_ttl(from, to, self.ttl)
    }

    pub fn lookup_with_ttl(&self, from: &str, to: &str, ttl: Duration) -> Result<RateLookup, RateError> {
        let from = parse_code(from)?;
        let to = parse_code(to)?;
        self.cache.lookup(&from, &to, ttl)
    }

    pub fn lookup_codes(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<RateLookup, RateError> {
        self.cache.lookup(from, to, self.ttl)
    }

    /// Run one update cycle in the caller's task. Stopping the scheduler does
    /// not interrupt it.
    pub async fn run_update(&self, source_filter: Option<&str>) -> UpdateReport {
        self.coordinator.run(source_filter, &CancelToken::new()).await
    }

    /// Like [`run_update`](Self::run_update), but gives up retry waits and
    /// skips remaining sources once `cancel` fires.
    pub async fn run_update_with_cancel(
        &self,
        source_filter: Option<&str>,
        cancel: &CancelToken,
    ) -> UpdateReport {
        self.coordinator.run(source_filter, cancel).await
    }

    pub async fn start(&self) -> bool {
        self.scheduler.start().await
    }

    pub async fn stop(&self) -> bool {
        self.scheduler.stop().await
    }

    pub fn status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub async fn history_query(&self, filter: &HistoryFilter, limit: usize) -> Vec<HistoryRecord> {
        self.history.query(filter, limit).await
    }

    pub async fn pair_statistics(&self, pair: &PairKey) -> Option<PairStatistics> {
        self.history.statistics(pair).await
    }

    pub async fn prune_history(&self, max_age: Duration) -> Result<usize, PersistenceError> {
        self.history.prune(max_age).await
    }

    pub fn snapshot(&self) -> RateCacheState {
        self.cache.snapshot()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.coordinator.source_names()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

fn parse_code(raw: &str) -> Result<CurrencyCode, RateError> {
    CurrencyCode::parse(raw).map_err(|_| RateError::InvalidCurrency(raw.to_string()))
}

pub struct RateEngineBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    clock: Option<Arc<dyn Clock>>,
    sources: Vec<Arc<dyn RateSource>>,
    ttl: Duration,
    update_interval: Duration,
    stop_timeout: Duration,
    history_limit: usize,
}

impl Default for RateEngineBuilder {
    fn default() -> Self {
        Self {
            store: None,
            clock: None,
            sources: Vec::new(),
            ttl: DEFAULT_TTL,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl RateEngineBuilder {
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_source(mut self, source: Arc<dyn RateSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources(mut self, sources: Vec<Arc<dyn RateSource>>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Load persisted cache and history, then wire everything together.
    /// Defaults to an in-memory store and the system clock.
    pub async fn build(self) -> Result<RateEngine, PersistenceError> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let cache = Arc::new(RateCache::load(Arc::clone(&store), Arc::clone(&clock)).await?);
        let history = Arc::new(
            HistoryLog::load(Arc::clone(&store), Arc::clone(&clock), self.history_limit).await?,
        );
        let coordinator = Arc::new(UpdateCoordinator::new(
            self.sources,
            Arc::clone(&cache),
            Arc::clone(&history),
            Arc::clone(&clock),
        ));
        let scheduler = Scheduler::new(Arc::clone(&coordinator), Arc::clone(&cache))
            .with_interval(self.update_interval)
            .with_stop_timeout(self.stop_timeout);

        Ok(RateEngine {
            cache,
            history,
            coordinator,
            scheduler,
            store,
            clock,
            ttl: self.ttl,
        })
    }
}
