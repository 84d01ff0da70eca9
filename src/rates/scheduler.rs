use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::RateCache;
use super::coordinator::UpdateCoordinator;
use super::CancelToken;

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePairs {
    pub name: String,
    pub rates_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    #[serde(with = "crate::duration::human")]
    pub interval: Duration,
    pub last_refresh: Option<DateTime<Utc>>,
    pub cached_pairs: usize,
    pub worker_alive: bool,
    pub sources: Vec<SourcePairs>,
}

/// Background task plus the token that stops it. Each start gets a fresh
/// token, so stopping never reaches foreground updates.
struct Worker {
    handle: JoinHandle<()>,
    cancel: CancelToken,
}

impl Worker {
    fn stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs the update coordinator on a fixed interval in one background task.
pub struct Scheduler {
    coordinator: Arc<UpdateCoordinator>,
    cache: Arc<RateCache>,
    interval: Duration,
    stop_timeout: Duration,
    lifecycle: tokio::sync::Mutex<()>,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    pub fn new(coordinator: Arc<UpdateCoordinator>, cache: Arc<RateCache>) -> Self {
        Self {
            coordinator,
            cache,
            interval: DEFAULT_UPDATE_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            lifecycle: tokio::sync::Mutex::new(()),
            worker: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the update loop. Returns `false` if it is already running.
    pub async fn start(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(worker) = slot.as_ref() {
            let finished = worker.handle.is_finished();
            if !worker.stopping() {
                if !finished {
                    warn!("Scheduler already running");
                    return false;
                }
                warn!("Scheduler worker exited unexpectedly; replacing it");
            } else if !finished {
                info!("Previous worker is still finishing its last source");
            }
        }

        let cancel = CancelToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.coordinator),
            cancel.clone(),
            self.interval,
        ));
        *slot = Some(Worker { handle, cancel });
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        true
    }

    /// Signal the loop to exit and wait up to the stop timeout. A worker
    /// still busy after that is left to finish its current source in the
    /// background. Returns `false` if it wasn't running.
    pub async fn stop(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let worker = {
            let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            let running = slot.as_ref().map_or(false, |worker| !worker.stopping());
            if running {
                slot.take()
            } else {
                None
            }
        };
        let Some(mut worker) = worker else {
            debug!("Scheduler not running; nothing to stop");
            return false;
        };

        worker.cancel.cancel();
        match tokio::time::timeout(self.stop_timeout, &mut worker.handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => warn!(error = %e, "Scheduler worker ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "Scheduler still busy after stop timeout; letting the current source finish"
                );
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);
            }
        }
        true
    }

    pub fn status(&self) -> SchedulerStatus {
        let (running, worker_alive) = {
            let slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(worker) => (!worker.stopping(), !worker.handle.is_finished()),
                None => (false, false),
            }
        };
        let sources = self
            .cache
            .pairs_by_source()
            .into_iter()
            .map(|(name, rates_count)| SourcePairs { name, rates_count })
            .collect();
        SchedulerStatus {
            running,
            interval: self.interval,
            last_refresh: self.cache.last_refresh(),
            cached_pairs: self.cache.len(),
            worker_alive,
            sources,
        }
    }
}

async fn run_loop(coordinator: Arc<UpdateCoordinator>, cancel: CancelToken, interval: Duration) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let report = coordinator.run(None, &cancel).await;
        if report.all_failed() && !cancel.is_cancelled() {
            warn!(failures = report.failures.len(), "Every rate source failed this cycle");
        }

        if !cancel.sleep(interval).await {
            break;
        }
    }
    debug!("Scheduler loop exited");
}
