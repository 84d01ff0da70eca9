mod currency;
mod history;
mod pair;
mod quote;

pub use currency::{Currency, CurrencyCode, CurrencyCodeError, CurrencyKind, CurrencyRegistry};
pub use history::{HistoryFilter, HistoryRecord, PairStatistics};
pub use pair::{PairKey, PairKeyError};
pub use quote::{is_usable_rate, Quote};
