/// Price history types and the sources that produce them.
///
/// A `PriceSeries` is indexed by trading session rather than by calendar day:
/// weekends and holidays are simply absent, and indicator windows count
/// sessions. The only invariant is that dates strictly increase.
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, SeriesError};

/// One OHLCV observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Bar whose every price equals `price`; handy for synthetic series.
    pub fn flat(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            adj_close: price,
            volume: 0.0,
        }
    }

    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Close => self.close,
            PriceField::AdjClose => self.adj_close,
        }
    }
}

/// Which column of a bar the indicators read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Close,
    #[default]
    AdjClose,
}

impl FromStr for PriceField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "close" => Ok(Self::Close),
            "adj_close" | "adjclose" | "adj-close" => Ok(Self::AdjClose),
            other => Err(format!("unknown price field {other:?} (expected close or adj_close)")),
        }
    }
}

/// A validated, strictly date-ordered price history for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    ticker: String,
    field: PriceField,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(
        ticker: impl Into<String>,
        bars: Vec<PriceBar>,
        field: PriceField,
    ) -> Result<Self, SeriesError> {
        if bars.is_empty() {
            return Err(SeriesError::Empty);
        }
        for (index, bar) in bars.iter().enumerate() {
            let value = bar.price(field);
            if !value.is_finite() || value <= 0.0 {
                return Err(SeriesError::InvalidPrice {
                    date: bar.date,
                    value,
                });
            }
            if index > 0 && bars[index - 1].date >= bar.date {
                return Err(SeriesError::NotIncreasing {
                    index,
                    previous: bars[index - 1].date,
                    current: bar.date,
                });
            }
        }

        Ok(Self {
            ticker: ticker.into(),
            field,
            bars,
        })
    }

    /// Build a series from bare (date, price) pairs.
    pub fn from_prices(
        ticker: impl Into<String>,
        points: &[(NaiveDate, f64)],
    ) -> Result<Self, SeriesError> {
        let bars = points
            .iter()
            .map(|&(date, price)| PriceBar::flat(date, price))
            .collect();
        Self::new(ticker, bars, PriceField::Close)
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn field(&self) -> PriceField {
        self.field
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    /// The analysed price of every bar, in date order.
    pub fn values(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.price(self.field)).collect()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.bars[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.bars[self.bars.len() - 1].date
    }
}

/// Sampling interval understood by the market-data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d" => Ok(Interval::Daily),
            "1wk" => Ok(Interval::Weekly),
            "1mo" => Ok(Interval::Monthly),
            other => Err(format!("unsupported interval {other:?} (expected 1d, 1wk or 1mo)")),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookback period ending at the most recent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeSpec {
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    TenYears,
    YearToDate,
    Max,
}

impl RangeSpec {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeSpec::FiveDays => "5d",
            RangeSpec::OneMonth => "1mo",
            RangeSpec::ThreeMonths => "3mo",
            RangeSpec::SixMonths => "6mo",
            RangeSpec::OneYear => "1y",
            RangeSpec::TwoYears => "2y",
            RangeSpec::FiveYears => "5y",
            RangeSpec::TenYears => "10y",
            RangeSpec::YearToDate => "ytd",
            RangeSpec::Max => "max",
        }
    }

    /// First calendar date covered when the range ends on `end`;
    /// `None` means unbounded.
    pub fn start_from(&self, end: NaiveDate) -> Option<NaiveDate> {
        let months = |n: u32| end.checked_sub_months(Months::new(n));
        match self {
            // a trading week
            RangeSpec::FiveDays => end.checked_sub_signed(Duration::days(6)),
            RangeSpec::OneMonth => months(1),
            RangeSpec::ThreeMonths => months(3),
            RangeSpec::SixMonths => months(6),
            RangeSpec::OneYear => months(12),
            RangeSpec::TwoYears => months(24),
            RangeSpec::FiveYears => months(60),
            RangeSpec::TenYears => months(120),
            RangeSpec::YearToDate => NaiveDate::from_ymd_opt(end.year(), 1, 1),
            RangeSpec::Max => None,
        }
    }
}

impl FromStr for RangeSpec {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = match s {
            "5d" => RangeSpec::FiveDays,
            "1mo" => RangeSpec::OneMonth,
            "3mo" => RangeSpec::ThreeMonths,
            "6mo" => RangeSpec::SixMonths,
            "1y" => RangeSpec::OneYear,
            "2y" => RangeSpec::TwoYears,
            "5y" => RangeSpec::FiveYears,
            "10y" => RangeSpec::TenYears,
            "ytd" => RangeSpec::YearToDate,
            "max" => RangeSpec::Max,
            other => return Err(FetchError::InvalidLookback(other.to_string())),
        };
        Ok(spec)
    }
}

/// Either an explicit date window (inclusive) or a lookback period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookback {
    Dates { start: NaiveDate, end: NaiveDate },
    Range(RangeSpec),
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Lookback::Dates { start, end } => write!(f, "{} to {}", start, end),
            Lookback::Range(spec) => write!(f, "last {}", spec.as_str()),
        }
    }
}

/// Everything a source needs to produce one price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub ticker: String,
    pub lookback: Lookback,
    pub interval: Interval,
    pub field: PriceField,
}

impl HistoryRequest {
    pub fn new(ticker: impl Into<String>, lookback: Lookback) -> Self {
        Self {
            ticker: ticker.into(),
            lookback,
            interval: Interval::Daily,
            field: PriceField::default(),
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_field(mut self, field: PriceField) -> Self {
        self.field = field;
        self
    }

    /// Reject requests no provider could satisfy before touching the network.
    pub fn validate(&self) -> Result<(), FetchError> {
        validate_ticker(&self.ticker)?;
        if let Lookback::Dates { start, end } = self.lookback {
            if start > end {
                return Err(FetchError::InvalidRange { start, end });
            }
        }
        Ok(())
    }

    /// Whether `date` falls inside the requested window, given the last date
    /// available from the source.
    pub fn covers(&self, date: NaiveDate, latest: NaiveDate) -> bool {
        match self.lookback {
            Lookback::Dates { start, end } => date >= start && date <= end,
            Lookback::Range(spec) => spec.start_from(latest).map_or(true, |start| date >= start),
        }
    }
}

/// Ticker symbols: letters, digits and the punctuation Yahoo uses for
/// indices (`^GSPC`), share classes (`BRK-B`), listings (`VOD.L`) and
/// currency pairs (`EURUSD=X`).
pub fn validate_ticker(ticker: &str) -> Result<(), FetchError> {
    let ok = !ticker.is_empty()
        && ticker.len() <= 16
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if ok {
        Ok(())
    } else {
        Err(FetchError::InvalidTicker(ticker.to_string()))
    }
}

/// Anything that can produce a price series for a request.
#[allow(async_fn_in_trait)]
pub trait QuoteSource {
    async fn fetch(&self, request: &HistoryRequest) -> Result<PriceSeries, FetchError>;
}

/// Row layout of Yahoo's CSV download.
#[derive(Debug, Deserialize)]
struct CsvQuote {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Open", deserialize_with = "csv::invalid_option", default)]
    open: Option<f64>,
    #[serde(rename = "High", deserialize_with = "csv::invalid_option", default)]
    high: Option<f64>,
    #[serde(rename = "Low", deserialize_with = "csv::invalid_option", default)]
    low: Option<f64>,
    #[serde(rename = "Close", deserialize_with = "csv::invalid_option", default)]
    close: Option<f64>,
    #[serde(rename = "Adj Close", deserialize_with = "csv::invalid_option", default)]
    adj_close: Option<f64>,
    #[serde(rename = "Volume", deserialize_with = "csv::invalid_option", default)]
    volume: Option<f64>,
}

impl CsvQuote {
    fn into_bar(self) -> Option<PriceBar> {
        let close = self.close?;
        Some(PriceBar {
            date: self.date,
            open: self.open.unwrap_or(close),
            high: self.high.unwrap_or(close),
            low: self.low.unwrap_or(close),
            close,
            adj_close: self.adj_close.unwrap_or(close),
            volume: self.volume.unwrap_or(0.0),
        })
    }
}

/// Reads a locally saved price export instead of calling the provider.
#[derive(Debug, Clone)]
pub struct CsvQuoteSource {
    path: PathBuf,
}

impl CsvQuoteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_bars(&self) -> Result<Vec<PriceBar>, FetchError> {
        let file = File::open(&self.path)?;
        let mut rdr = csv::Reader::from_reader(file);
        let mut bars = Vec::new();
        let mut skipped = 0usize;
        for result in rdr.deserialize() {
            let row: CsvQuote = result?;
            match row.into_bar() {
                Some(bar) => bars.push(bar),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                "Skipped {} rows without a close price in {}",
                skipped,
                self.path.display()
            );
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

impl QuoteSource for CsvQuoteSource {
    async fn fetch(&self, request: &HistoryRequest) -> Result<PriceSeries, FetchError> {
        request.validate()?;
        info!("Loading {} history from {}", request.ticker, self.path.display());
        debug!("CSV source ignores interval {}", request.interval);

        let bars = self.read_bars()?;
        let latest = match bars.last() {
            Some(bar) => bar.date,
            None => {
                return Err(FetchError::EmptyHistory {
                    ticker: request.ticker.clone(),
                })
            }
        };
        let bars: Vec<PriceBar> = bars
            .into_iter()
            .filter(|b| request.covers(b.date, latest))
            .collect();
        if bars.is_empty() {
            return Err(FetchError::EmptyHistory {
                ticker: request.ticker.clone(),
            });
        }

        Ok(PriceSeries::new(request.ticker.clone(), bars, request.field)?)
    }
}
