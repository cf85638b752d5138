pub mod error;
pub mod poloniex;
pub mod provider;
