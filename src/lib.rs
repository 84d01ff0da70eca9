pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod models;
pub mod rates;
pub mod storage;
pub mod wallet;
