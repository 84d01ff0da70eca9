//! Error types shared across the rate engine and the wallet.
//!
//! - [`SourceError`]: one upstream source failed. Never escapes the update
//!   coordinator; it becomes an entry in the update report.
//! - [`RateError`]: a lookup could not be answered. Returned to the caller.
//! - [`PersistenceError`]: the document store failed. Returned to the caller.
//! - [`WalletError`]: a ledger or trade operation was rejected.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// How a failed upstream call should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Credentials or permissions are wrong (401/403) or the response is
    /// unusable. Retrying won't help.
    Permanent,
    /// The provider answered 429. Worth retrying after a longer cooldown.
    RateLimited,
    /// Timeouts, connection failures and other server-side errors.
    Transient,
}

#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct SourceError {
    pub reason: String,
    pub kind: FailureKind,
    pub attempts: u32,
}

impl SourceError {
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            kind: FailureKind::Permanent,
            attempts: 1,
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            kind: FailureKind::Transient,
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }
}

#[derive(Debug, Error)]
#[error("document store failed for '{key}': {source}")]
pub struct PersistenceError {
    pub key: String,
    #[source]
    pub source: anyhow::Error,
}

impl PersistenceError {
    pub fn new(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            key: key.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate {from}->{to} is missing or stale; run update-rates to refresh")]
    StaleOrMissingRate { from: String, to: String },

    #[error("invalid currency code '{0}'")]
    InvalidCurrency(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("insufficient funds: available {available} {currency}, required {required} {currency}")]
    InsufficientFunds {
        currency: String,
        available: Decimal,
        required: Decimal,
    },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("unknown currency '{0}'")]
    UnknownCurrency(String),

    #[error("cannot trade {0} against itself")]
    SameCurrency(String),

    #[error("rate {0} cannot be used for pricing")]
    UnusableRate(f64),

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
