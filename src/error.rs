/// Error types shared across the pipeline stages
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

/// Problems with the shape of a price series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("price series is empty")]
    Empty,

    #[error("dates must be strictly increasing: {current} at row {index} follows {previous}")]
    NotIncreasing {
        index: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("price on {date} is not a finite positive number: {value}")]
    InvalidPrice { date: NaiveDate, value: f64 },
}

/// Failures while obtaining price history. Callers can match on these to
/// decide whether to try another ticker or range.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid ticker symbol: {0:?}")]
    InvalidTicker(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("unsupported lookback {0:?} (expected one of 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max)")]
    InvalidLookback(String),

    #[error("provider request for {ticker} failed: {message}")]
    Provider { ticker: String, message: String },

    #[error("provider request for {ticker} timed out after {after:?}")]
    Timeout { ticker: String, after: Duration },

    #[error("no price history returned for {ticker} in the requested range")]
    EmptyHistory { ticker: String },

    #[error("failed to read price file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse price file: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed price history: {0}")]
    Series(#[from] SeriesError),
}

/// Problems turning a labeled feature table into train/test partitions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("test fraction must lie strictly between 0 and 1, got {0}")]
    InvalidTestFraction(f64),

    #[error("not enough complete rows: {available} available, {required} required ({excluded} excluded during indicator warm-up)")]
    InsufficientSamples {
        required: usize,
        available: usize,
        excluded: usize,
    },

    #[error("split left {train} training and {test} test rows")]
    EmptyPartition { train: usize, test: usize },

    #[error("labels ({labels}) and feature rows ({rows}) differ in length")]
    LengthMismatch { rows: usize, labels: usize },
}

/// Failures while fitting or querying the classifier.
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("cannot fit on {0} samples")]
    TooFewSamples(usize),

    #[error("{features} feature rows but {labels} labels")]
    LabelMismatch { features: usize, labels: usize },

    #[error("feature width mismatch: model expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("training diverged at epoch {epoch}: loss is {loss}")]
    Diverged { epoch: usize, loss: f64 },

    #[error("failed to read tensor data: {0}")]
    TensorData(String),
}
