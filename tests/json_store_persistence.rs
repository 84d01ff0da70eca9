mod support;

use std::sync::Arc;

use anyhow::Result;
use ratekeep::models::HistoryFilter;
use ratekeep::rates::{RateEngine, HISTORY_KEY, RATES_KEY};
use ratekeep::storage::{DocumentStore, JsonFileStore};
use support::{manual_clock, table, CountingSource};
use tempfile::TempDir;

#[tokio::test]
async fn cache_and_history_survive_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    let clock = manual_clock();

    {
        let engine = RateEngine::builder()
            .with_store(Arc::new(JsonFileStore::new(dir.path())))
            .with_clock(clock.clone())
            .with_source(Arc::new(CountingSource::new(
                "counting",
                table(&[("BTC_USD", 60000.0), ("EUR_USD", 1.08)]),
            )))
            .build()
            .await?;
        engine.run_update(None).await;
    }

    assert!(dir.path().join("rates.json").exists());
    assert!(dir.path().join("exchange_rates.json").exists());

    let reopened = RateEngine::builder()
        .with_store(Arc::new(JsonFileStore::new(dir.path())))
        .with_clock(clock)
        .build()
        .await?;

    assert_eq!(reopened.snapshot().pairs.len(), 2);
    assert_eq!(reopened.lookup("BTC", "USD")?.rate, 60000.0);
    assert_eq!(
        reopened
            .history_query(&HistoryFilter::default(), 100)
            .await
            .len(),
        2
    );
    Ok(())
}

#[tokio::test]
async fn invalid_history_records_are_skipped_on_load() -> Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path());
    store
        .write(
            HISTORY_KEY,
            &serde_json::json!([
                {
                    "id": "a",
                    "from_currency": "BTC",
                    "to_currency": "USD",
                    "rate": 60000.0,
                    "timestamp": "2024-05-01T12:00:00Z",
                    "source": "coingecko"
                },
                {
                    "id": "b",
                    "from_currency": "BTC",
                    "to_currency": "USD",
                    "rate": 61000.0,
                    "timestamp": "not-a-time",
                    "source": "coingecko"
                },
                {"id": "c"}
            ]),
        )
        .await?;

    let engine = RateEngine::builder()
        .with_store(Arc::new(store))
        .with_clock(manual_clock())
        .build()
        .await?;

    let records = engine.history_query(&HistoryFilter::default(), 10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "a");
    assert!(records[0].meta.is_empty());
    Ok(())
}

#[tokio::test]
async fn corrupt_rates_document_fails_to_open() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join(format!("{RATES_KEY}.json")), "{truncated")?;

    let result = RateEngine::builder()
        .with_store(Arc::new(JsonFileStore::new(dir.path())))
        .build()
        .await;

    let err = result.err().expect("corrupt document must surface");
    assert_eq!(err.key, RATES_KEY);
    Ok(())
}
