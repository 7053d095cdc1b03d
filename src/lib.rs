// Library exports for rust_signal_stock

pub mod batcher;
pub mod bollinger;
pub mod data_ingestion;
pub mod dataset;
pub mod error;
pub mod feature_normalization;
pub mod features;
pub mod indicators;
pub mod macd;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod trading;
pub mod training;
pub mod yahoo;
