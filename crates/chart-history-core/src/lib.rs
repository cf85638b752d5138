pub mod candle;
pub mod error;
pub mod key;
pub mod metrics;
pub mod series;
pub mod store;
