mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ratekeep::error::FailureKind;
use ratekeep::models::CurrencyCode;
use ratekeep::rates::providers::{CoinGeckoSource, ExchangeRateSource, FrankfurterSource};
use ratekeep::rates::{CancelToken, RateSource, RequestPolicy};
use secrecy::SecretString;
use support::pair;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn policy() -> Arc<RequestPolicy> {
    Arc::new(
        RequestPolicy::new()
            .with_max_attempts(1)
            .with_timeout(Duration::from_secs(2)),
    )
}

fn codes(raw: &[&str]) -> Vec<CurrencyCode> {
    raw.iter().map(|c| CurrencyCode::parse(c).unwrap()).collect()
}

#[tokio::test]
async fn coingecko_translates_simple_price() -> Result<()> {
    let server = MockServer::start().await;
    let body = r#"{
        "bitcoin": {"usd": 59337.21},
        "ethereum": {"usd": 3720.0}
    }"#;

    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "bitcoin,ethereum,solana"))
        .and(query_param("vs_currencies", "usd"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let source = CoinGeckoSource::new(policy(), codes(&["BTC", "ETH", "SOL"]))
        .with_base_url(server.uri());
    let table = source.fetch(&CancelToken::new()).await?;

    assert_eq!(table.len(), 2, "SOL had no price and is skipped");
    assert_eq!(table[&pair("BTC_USD")], 59337.21);
    assert_eq!(table[&pair("ETH_USD")], 3720.0);
    Ok(())
}

#[tokio::test]
async fn coingecko_drops_zero_prices() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"bitcoin": {"usd": 0.0}}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let source = CoinGeckoSource::new(policy(), codes(&["BTC"])).with_base_url(server.uri());
    assert!(source.fetch(&CancelToken::new()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn coingecko_malformed_body_is_permanent() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("[1, 2]", "application/json"))
        .mount(&server)
        .await;

    let source = CoinGeckoSource::new(policy(), codes(&["BTC"])).with_base_url(server.uri());
    let err = source.fetch(&CancelToken::new()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Permanent);
    Ok(())
}

#[tokio::test]
async fn exchangerate_inverts_and_crosses_usd_rates() -> Result<()> {
    let server = MockServer::start().await;
    let body = r#"{
        "result": "success",
        "base_code": "USD",
        "conversion_rates": {"USD": 1.0, "EUR": 0.9259, "GBP": 0.8}
    }"#;

    Mock::given(method("GET"))
        .and(path("/test-key/latest/USD"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let source = ExchangeRateSource::new(
        policy(),
        Some(SecretString::from("test-key".to_string())),
        codes(&["EUR", "GBP"]),
    )
    .with_base_url(server.uri());
    let table = source.fetch(&CancelToken::new()).await?;

    assert!((table[&pair("EUR_USD")] - 1.0 / 0.9259).abs() < 1e-9);
    assert!((table[&pair("GBP_USD")] - 1.25).abs() < 1e-9);
    assert!((table[&pair("EUR_GBP")] - 0.8 / 0.9259).abs() < 1e-9);
    assert!((table[&pair("GBP_EUR")] - 0.9259 / 0.8).abs() < 1e-9);
    assert_eq!(table.len(), 4);
    Ok(())
}

#[tokio::test]
async fn exchangerate_error_payload_is_permanent() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"result": "error", "error-type": "invalid-key"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let source = ExchangeRateSource::new(
        policy(),
        Some(SecretString::from("bad".to_string())),
        codes(&["EUR"]),
    )
    .with_base_url(server.uri());
    let err = source.fetch(&CancelToken::new()).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::Permanent);
    assert_eq!(err.reason, "API error: invalid-key");
    Ok(())
}

#[tokio::test]
async fn exchangerate_forbidden_does_not_leak_key() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let source = ExchangeRateSource::new(
        policy(),
        Some(SecretString::from("super-secret".to_string())),
        codes(&["EUR"]),
    )
    .with_base_url(server.uri());
    let err = source.fetch(&CancelToken::new()).await.unwrap_err();

    assert!(err.is_permanent());
    assert!(!err.reason.contains("super-secret"));
    Ok(())
}

#[tokio::test]
async fn frankfurter_requests_usd_base() -> Result<()> {
    let server = MockServer::start().await;
    let body = r#"{
        "amount": 1.0,
        "base": "USD",
        "date": "2024-05-01",
        "rates": {"EUR": 0.9259, "JPY": 150.0}
    }"#;

    Mock::given(method("GET"))
        .and(path("/latest"))
        .and(query_param("from", "USD"))
        .and(query_param("to", "EUR,JPY"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let source = FrankfurterSource::new(policy(), codes(&["USD", "EUR", "JPY"]))
        .with_base_url(server.uri());
    let table = source.fetch(&CancelToken::new()).await?;

    assert!((table[&pair("EUR_USD")] - 1.0 / 0.9259).abs() < 1e-9);
    assert!((table[&pair("EUR_JPY")] - 150.0 / 0.9259).abs() < 1e-9);
    assert_eq!(source.name(), "frankfurter");
    Ok(())
}
