//! Per-owner currency wallets and trading against the rate cache.

mod models;
mod service;

pub use models::{Holding, Portfolio, PortfolioValuation, TradeReceipt, Wallet};
pub use service::{PortfolioStore, TradeService, PORTFOLIOS_KEY};
