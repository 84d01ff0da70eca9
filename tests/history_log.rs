mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use ratekeep::models::{HistoryFilter, HistoryRecord, Quote};
use ratekeep::rates::{HistoryLog, HISTORY_KEY};
use ratekeep::storage::{DocumentStore, MemoryStore};
use support::{manual_clock, pair, start_time};

fn record(rate: f64, offset_secs: i64) -> HistoryRecord {
    let quote = Quote::new(
        pair("BTC_USD"),
        rate,
        start_time() + ChronoDuration::seconds(offset_secs),
        "mock",
    )
    .unwrap();
    HistoryRecord::from_quote(&quote, serde_json::Map::new())
}

#[tokio::test]
async fn cap_evicts_oldest_after_1001_appends() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let log = HistoryLog::new(store.clone(), manual_clock(), 1000);

    log.append_batch((0..1000).map(|i| record(1.0 + i as f64, i)).collect())
        .await?;
    assert_eq!(log.len().await, 1000);
    log.append(record(1001.0, 1000)).await?;

    assert_eq!(log.len().await, 1000);
    let all = log.query(&HistoryFilter::default(), 2000).await;
    assert_eq!(all.len(), 1000);
    assert_eq!(all.first().map(|r| r.rate), Some(1001.0));
    assert_eq!(all.last().map(|r| r.rate), Some(2.0));

    let persisted = store.read(HISTORY_KEY).await?.unwrap();
    assert_eq!(persisted.as_array().map(Vec::len), Some(1000));
    Ok(())
}

#[tokio::test]
async fn load_truncates_to_a_smaller_cap() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let log = HistoryLog::new(store.clone(), manual_clock(), 10);
    log.append_batch((0..10).map(|i| record(i as f64 + 1.0, i)).collect())
        .await?;

    let reloaded = HistoryLog::load(store, manual_clock(), 3).await?;
    assert_eq!(reloaded.len().await, 3);
    let rates: Vec<f64> = reloaded
        .query(&HistoryFilter::default(), 10)
        .await
        .iter()
        .map(|r| r.rate)
        .collect();
    assert_eq!(rates, vec![10.0, 9.0, 8.0]);
    Ok(())
}

#[tokio::test]
async fn prune_uses_the_injected_clock() -> Result<()> {
    let clock = manual_clock();
    let log = HistoryLog::new(Arc::new(MemoryStore::new()), clock.clone(), 100);
    log.append_batch(vec![record(1.0, 0), record(2.0, 3600)]).await?;

    clock.advance(ChronoDuration::hours(2));
    let removed = log.prune(Duration::from_secs(90 * 60)).await?;

    assert_eq!(removed, 1);
    let left = log.query(&HistoryFilter::default(), 10).await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].rate, 2.0);
    Ok(())
}
