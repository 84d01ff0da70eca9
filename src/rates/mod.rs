//! Rate acquisition and freshness-gated caching.
//!
//! The scheduler periodically runs the update coordinator, which fetches every
//! configured [`RateSource`] through the [`RequestPolicy`], merges the results
//! into the [`RateCache`] and journals them in the [`HistoryLog`]. Callers read
//! rates back through [`RateEngine::lookup`], which refuses stale entries.

mod cache;
mod cancel;
mod coordinator;
mod engine;
mod factory;
mod history;
pub mod policy;
pub mod providers;
mod scheduler;
mod source;

pub use cache::{RateCache, RateCacheState, RateLookup, RATES_KEY};
pub use cancel::CancelToken;
pub use coordinator::{SourceFailure, SourceSuccess, UpdateCoordinator, UpdateReport};
pub use engine::{RateEngine, RateEngineBuilder, DEFAULT_TTL};
pub use factory::{build_policy, build_sources};
pub use history::{HistoryLog, DEFAULT_HISTORY_LIMIT, HISTORY_KEY};
pub use policy::RequestPolicy;
pub use scheduler::{
    Scheduler, SchedulerStatus, SourcePairs, DEFAULT_STOP_TIMEOUT, DEFAULT_UPDATE_INTERVAL,
};
pub use source::{insert_rate, RateSource, RateTable, StaticRateSource};
