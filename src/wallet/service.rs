use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

use super::models::{Holding, Portfolio, PortfolioValuation, TradeReceipt, Wallet};
use crate::error::{PersistenceError, WalletError};
use crate::models::{CurrencyCode, CurrencyRegistry};
use crate::rates::RateEngine;
use crate::storage::{read_document, write_document, DocumentStore};

/// Document key the ledger is persisted under.
pub const PORTFOLIOS_KEY: &str = "portfolios";

/// Rates are float observations; trim conversion noise before pricing.
const RATE_DECIMALS: u32 = 10;

/// Persists every portfolio as one document keyed by owner.
pub struct PortfolioStore {
    store: Arc<dyn DocumentStore>,
}

impl PortfolioStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn load_all(&self) -> Result<BTreeMap<String, Portfolio>, PersistenceError> {
        read_document(self.store.as_ref(), PORTFOLIOS_KEY).await
    }

    pub async fn save_all(&self, portfolios: &BTreeMap<String, Portfolio>) -> Result<(), PersistenceError> {
        write_document(self.store.as_ref(), PORTFOLIOS_KEY, portfolios).await
    }
}

/// Deposits and trades against the base currency, priced from the rate cache.
///
/// Every operation is load, mutate, save under one lock, so a rejected trade
/// changes nothing.
pub struct TradeService {
    engine: Arc<RateEngine>,
    portfolios: PortfolioStore,
    registry: CurrencyRegistry,
    base: CurrencyCode,
    ledger: Mutex<()>,
}

impl TradeService {
    pub fn new(engine: Arc<RateEngine>, base: CurrencyCode) -> Self {
        let portfolios = PortfolioStore::new(engine.store());
        Self {
            engine,
            portfolios,
            registry: CurrencyRegistry::default(),
            base,
            ledger: Mutex::new(()),
        }
    }

    pub fn with_registry(mut self, registry: CurrencyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn base_currency(&self) -> &CurrencyCode {
        &self.base
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    fn known_currency(&self, raw: &str) -> Result<CurrencyCode, WalletError> {
        let code =
            CurrencyCode::parse(raw).map_err(|_| WalletError::UnknownCurrency(raw.to_string()))?;
        if !self.registry.contains(&code) {
            return Err(WalletError::UnknownCurrency(code.to_string()));
        }
        Ok(code)
    }

    /// Units of base currency per unit of `code`, from a fresh cached rate.
    fn price(&self, code: &CurrencyCode) -> Result<(f64, Decimal), WalletError> {
        let lookup = self.engine.lookup_codes(code, &self.base)?;
        let rate = Decimal::from_f64(lookup.rate)
            .map(|r| r.round_dp(RATE_DECIMALS))
            .filter(|r| *r > Decimal::ZERO)
            .ok_or(WalletError::UnusableRate(lookup.rate))?;
        Ok((lookup.rate, rate))
    }

    pub async fn portfolio(&self, owner: &str) -> Result<Portfolio, WalletError> {
        let all = self.portfolios.load_all().await?;
        Ok(all.get(owner).cloned().unwrap_or_else(|| Portfolio::new(owner)))
    }

    pub async fn deposit(&self, owner: &str, currency: &str, amount: Decimal) -> Result<Wallet, WalletError> {
        let code = self.known_currency(currency)?;

        let _ledger = self.ledger.lock().await;
        let mut all = self.portfolios.load_all().await?;
        let portfolio = all
            .entry(owner.to_string())
            .or_insert_with(|| Portfolio::new(owner));
        let wallet = portfolio.wallet_mut(&code);
        wallet.deposit(amount)?;
        let wallet = wallet.clone();
        self.portfolios.save_all(&all).await?;

        info!(owner, currency = %code, amount = %amount, "Deposit recorded");
        Ok(wallet)
    }

    /// Buy `amount` of `currency`, paying from the base-currency wallet.
    pub async fn buy(&self, owner: &str, currency: &str, amount: Decimal) -> Result<TradeReceipt, WalletError> {
        let code = self.tradable(currency)?;
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount(amount));
        }

        let _ledger = self.ledger.lock().await;
        let (rate, rate_dec) = self.price(&code)?;
        let cost = amount
            .checked_mul(rate_dec)
            .ok_or(WalletError::InvalidAmount(amount))?;

        let mut all = self.portfolios.load_all().await?;
        let portfolio = all
            .entry(owner.to_string())
            .or_insert_with(|| Portfolio::new(owner));
        portfolio.wallet_mut(&self.base).withdraw(cost)?;
        portfolio.wallet_mut(&code).deposit(amount)?;
        let receipt = self.receipt(portfolio, &code, amount, rate, cost);
        self.portfolios.save_all(&all).await?;

        info!(owner, currency = %code, amount = %amount, cost = %cost, rate, "Buy executed");
        Ok(receipt)
    }

    /// Sell `amount` of `currency`, crediting the base-currency wallet.
    pub async fn sell(&self, owner: &str, currency: &str, amount: Decimal) -> Result<TradeReceipt, WalletError> {
        let code = self.tradable(currency)?;
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount(amount));
        }

        let _ledger = self.ledger.lock().await;
        let (rate, rate_dec) = self.price(&code)?;
        let proceeds = amount
            .checked_mul(rate_dec)
            .ok_or(WalletError::InvalidAmount(amount))?;

        let mut all = self.portfolios.load_all().await?;
        let portfolio = all
            .entry(owner.to_string())
            .or_insert_with(|| Portfolio::new(owner));
        portfolio.wallet_mut(&code).withdraw(amount)?;
        portfolio.wallet_mut(&self.base).deposit(proceeds)?;
        let receipt = self.receipt(portfolio, &code, amount, rate, proceeds);
        self.portfolios.save_all(&all).await?;

        info!(owner, currency = %code, amount = %amount, proceeds = %proceeds, rate, "Sell executed");
        Ok(receipt)
    }

    /// Value every wallet in the base currency. Wallets without a fresh rate
    /// are listed under `unpriced` and left out of the total.
    pub async fn portfolio_value(&self, owner: &str) -> Result<PortfolioValuation, WalletError> {
        let portfolio = self.portfolio(owner).await?;

        let mut total = Decimal::ZERO;
        let mut holdings = Vec::with_capacity(portfolio.wallets.len());
        let mut unpriced = Vec::new();

        for wallet in portfolio.wallets.values() {
            let priced = self
                .price(&wallet.currency)
                .ok()
                .and_then(|(rate, rate_dec)| {
                    wallet.balance.checked_mul(rate_dec).map(|value| (rate, value))
                });

            match priced {
                Some((rate, value)) => {
                    total += value;
                    holdings.push(Holding {
                        currency: wallet.currency.clone(),
                        balance: wallet.balance,
                        rate: Some(rate),
                        value: Some(value),
                    });
                }
                None => {
                    unpriced.push(wallet.currency.clone());
                    holdings.push(Holding {
                        currency: wallet.currency.clone(),
                        balance: wallet.balance,
                        rate: None,
                        value: None,
                    });
                }
            }
        }

        Ok(PortfolioValuation {
            owner: portfolio.owner,
            base_currency: self.base.clone(),
            total,
            holdings,
            unpriced,
        })
    }

    fn tradable(&self, currency: &str) -> Result<CurrencyCode, WalletError> {
        let code = self.known_currency(currency)?;
        if code == self.base {
            return Err(WalletError::SameCurrency(code.to_string()));
        }
        Ok(code)
    }

    fn receipt(
        &self,
        portfolio: &Portfolio,
        code: &CurrencyCode,
        amount: Decimal,
        rate: f64,
        base_amount: Decimal,
    ) -> TradeReceipt {
        TradeReceipt {
            owner: portfolio.owner.clone(),
            currency: code.clone(),
            amount,
            base_currency: self.base.clone(),
            rate,
            base_amount,
            currency_balance: portfolio.balance(code),
            base_balance: portfolio.balance(&self.base),
        }
    }
}
