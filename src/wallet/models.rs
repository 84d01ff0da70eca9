use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::models::CurrencyCode;

/// A single-currency balance. Never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub currency: CurrencyCode,
    pub balance: Decimal,
}

impl Wallet {
    pub fn new(currency: CurrencyCode) -> Self {
        Self {
            currency,
            balance: Decimal::ZERO,
        }
    }

    pub fn deposit(&mut self, amount: Decimal) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(WalletError::InvalidAmount(amount))?;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Decimal) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        if amount > self.balance {
            return Err(WalletError::InsufficientFunds {
                currency: self.currency.to_string(),
                available: self.balance,
                required: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(())
}

/// All wallets of one owner, keyed by currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub owner: String,
    #[serde(default)]
    pub wallets: BTreeMap<CurrencyCode, Wallet>,
}

impl Portfolio {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            wallets: BTreeMap::new(),
        }
    }

    pub fn balance(&self, currency: &CurrencyCode) -> Decimal {
        self.wallets
            .get(currency)
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO)
    }

    /// The wallet for `currency`, created empty on first use.
    pub fn wallet_mut(&mut self, currency: &CurrencyCode) -> &mut Wallet {
        self.wallets
            .entry(currency.clone())
            .or_insert_with(|| Wallet::new(currency.clone()))
    }
}

/// One line of a portfolio valuation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub currency: CurrencyCode,
    pub balance: Decimal,
    /// `None` when no fresh rate to the base currency was available.
    pub rate: Option<f64>,
    pub value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValuation {
    pub owner: String,
    pub base_currency: CurrencyCode,
    /// Sum over priced holdings only.
    pub total: Decimal,
    pub holdings: Vec<Holding>,
    pub unpriced: Vec<CurrencyCode>,
}

/// Result of a buy or sell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeReceipt {
    pub owner: String,
    pub currency: CurrencyCode,
    pub amount: Decimal,
    pub base_currency: CurrencyCode,
    /// Units of base currency per unit of `currency`.
    pub rate: f64,
    /// Base-currency amount debited (buy) or credited (sell).
    pub base_amount: Decimal,
    pub currency_balance: Decimal,
    pub base_balance: Decimal,
}
