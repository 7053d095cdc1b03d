/// Signal pipeline: fetch prices, build indicator features, label them with
/// the RSI + EMA/SMA rule, fit a softmax classifier and report test metrics.
///
/// Usage:
///   cargo run --release --bin signal_pipeline -- AAPL
///   cargo run --release --bin signal_pipeline -- AAPL --start 2022-01-01 --end 2024-01-01
///   cargo run --release --bin signal_pipeline -- MSFT --range 5y --interval 1wk --json
///   cargo run --release --bin signal_pipeline -- SPY --csv spy.csv --export-features spy_features.csv
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use rust_signal_stock::data_ingestion::{
    CsvQuoteSource, HistoryRequest, Interval, Lookback, PriceField, RangeSpec,
};
use rust_signal_stock::dataset::SplitStrategy;
use rust_signal_stock::features::FeatureConfig;
use rust_signal_stock::pipeline::{export_labeled_features, run_pipeline, PipelineConfig, PipelineOutput};
use rust_signal_stock::trading::LabelRule;
use rust_signal_stock::training::TrainingConfig;
use rust_signal_stock::yahoo::YahooQuoteSource;

#[derive(Parser)]
#[command(name = "signal-pipeline")]
#[command(about = "Label price history with RSI/EMA/SMA signals and evaluate a classifier on them")]
struct Cli {
    /// Ticker symbol, e.g. AAPL
    ticker: String,

    /// First date (YYYY-MM-DD); used together with --end
    #[arg(long, requires = "end", conflicts_with = "range")]
    start: Option<NaiveDate>,

    /// Last date (YYYY-MM-DD), inclusive
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Lookback period: 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max
    #[arg(long, default_value = "2y")]
    range: RangeSpec,

    /// Sampling interval: 1d, 1wk, 1mo
    #[arg(long, default_value = "1d")]
    interval: Interval,

    /// Price column the indicators read: close or adj-close
    #[arg(long, default_value = "adj-close")]
    field: PriceField,

    /// Read a Yahoo-format CSV export instead of calling the API
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Fetch timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Split strategy: chronological, shuffled or shuffled:<seed>
    #[arg(long, default_value = "chronological")]
    split: SplitStrategy,

    /// Share of complete rows held out for testing
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// RSI level below which a bullish row is labeled Buy
    #[arg(long, default_value_t = 30.0)]
    oversold: f64,

    /// RSI level above which a bearish row is labeled Sell
    #[arg(long, default_value_t = 70.0)]
    overbought: f64,

    /// SMA window
    #[arg(long, default_value_t = 20)]
    sma: usize,

    /// EMA window
    #[arg(long, default_value_t = 10)]
    ema: usize,

    /// RSI window
    #[arg(long, default_value_t = 14)]
    rsi: usize,

    /// Training epochs (full-batch Adam steps)
    #[arg(long, default_value_t = 300)]
    epochs: usize,

    /// Learning rate
    #[arg(long, default_value_t = 0.05)]
    learning_rate: f64,

    /// Weight the loss by inverse class frequency
    #[arg(long)]
    balance_classes: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Write the labeled feature table to this CSV file
    #[arg(long)]
    export_features: Option<PathBuf>,
}

impl Cli {
    fn request(&self) -> HistoryRequest {
        let lookback = match (self.start, self.end) {
            (Some(start), Some(end)) => Lookback::Dates { start, end },
            _ => Lookback::Range(self.range),
        };
        HistoryRequest::new(self.ticker.to_uppercase(), lookback)
            .with_interval(self.interval)
            .with_field(self.field)
    }

    fn pipeline_config(&self) -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            features: FeatureConfig {
                sma_window: self.sma,
                ema_window: self.ema,
                rsi_window: self.rsi,
                ..FeatureConfig::default()
            },
            label_rule: LabelRule::new(self.oversold, self.overbought)?,
            split: self.split,
            test_fraction: self.test_fraction,
            training: TrainingConfig::new()
                .with_epochs(self.epochs)
                .with_learning_rate(self.learning_rate)
                .with_balance_classes(self.balance_classes),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let request = cli.request();
    let config = cli.pipeline_config()?;

    if !cli.json {
        println!("=== Signal Pipeline ===");
        println!("Ticker: {}  ({}, {})", request.ticker, request.lookback, request.interval);
        println!("Run date: {}\n", Local::now().format("%Y-%m-%d"));
    }

    let output: PipelineOutput = match &cli.csv {
        Some(path) => run_pipeline(&CsvQuoteSource::new(path), &request, &config).await?,
        None => {
            let source = YahooQuoteSource::new(Duration::from_secs(cli.timeout_secs));
            run_pipeline(&source, &request, &config).await?
        }
    };

    if let Some(path) = &cli.export_features {
        export_labeled_features(&output.table, &output.labels, path)
            .with_context(|| format!("failed to export features to {}", path.display()))?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output.report)?);
    } else {
        println!("{}", output.report);
    }

    Ok(())
}
