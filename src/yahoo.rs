/// Yahoo Finance price source
///
/// One request per run, bounded by a timeout. Provider failures surface as
/// `FetchError` so callers can tell a bad ticker or an empty window apart
/// from a broken pipeline.
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use log::{info, warn};
use time::{Month, OffsetDateTime};
use yahoo_finance_api::{Quote, YahooConnector, YahooError};

use crate::data_ingestion::{HistoryRequest, Lookback, PriceBar, PriceSeries, QuoteSource};
use crate::error::FetchError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct YahooQuoteSource {
    timeout: Duration,
}

impl Default for YahooQuoteSource {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl YahooQuoteSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn request_quotes(&self, request: &HistoryRequest) -> Result<Vec<Quote>, FetchError> {
        let ticker = request.ticker.as_str();
        let provider = YahooConnector::new().map_err(|e| provider_error(ticker, e))?;
        let interval = request.interval.as_str();

        let response = match request.lookback {
            Lookback::Dates { start, end } => {
                // end is inclusive for callers, exclusive for the API
                let end = end.succ_opt().unwrap_or(end);
                provider
                    .get_quote_history_interval(
                        ticker,
                        to_offset_datetime(start)?,
                        to_offset_datetime(end)?,
                        interval,
                    )
                    .await
            }
            Lookback::Range(spec) => provider.get_quote_range(ticker, interval, spec.as_str()).await,
        }
        .map_err(|e| provider_error(ticker, e))?;

        response.quotes().map_err(|e| provider_error(ticker, e))
    }
}

/// Yahoo answers a window without sessions with `EmptyDataSet`.
fn provider_error(ticker: &str, err: YahooError) -> FetchError {
    match err {
        YahooError::EmptyDataSet => FetchError::EmptyHistory {
            ticker: ticker.to_string(),
        },
        other => FetchError::Provider {
            ticker: ticker.to_string(),
            message: other.to_string(),
        },
    }
}

impl QuoteSource for YahooQuoteSource {
    async fn fetch(&self, request: &HistoryRequest) -> Result<PriceSeries, FetchError> {
        request.validate()?;
        info!(
            "Fetching {} {} quotes for {} from Yahoo Finance",
            request.interval, request.lookback, request.ticker
        );

        let quotes = tokio::time::timeout(self.timeout, self.request_quotes(request))
            .await
            .map_err(|_| FetchError::Timeout {
                ticker: request.ticker.clone(),
                after: self.timeout,
            })??;

        let bars = quotes_to_bars(&quotes);
        if bars.is_empty() {
            return Err(FetchError::EmptyHistory {
                ticker: request.ticker.clone(),
            });
        }
        info!("Fetched {} bars for {}", bars.len(), request.ticker);

        Ok(PriceSeries::new(request.ticker.clone(), bars, request.field)?)
    }
}

/// Convert provider quotes into date-keyed bars. Yahoo occasionally repeats
/// the current session; the later quote wins.
pub fn quotes_to_bars(quotes: &[Quote]) -> Vec<PriceBar> {
    let mut bars: Vec<PriceBar> = Vec::with_capacity(quotes.len());
    for quote in quotes {
        let date = match DateTime::from_timestamp(quote.timestamp as i64, 0) {
            Some(dt) => dt.date_naive(),
            None => {
                warn!("Dropping quote with invalid timestamp {}", quote.timestamp);
                continue;
            }
        };
        let bar = PriceBar {
            date,
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            // missing adjclose arrives as 0
            adj_close: if quote.adjclose > 0.0 { quote.adjclose } else { quote.close },
            volume: quote.volume as f64,
        };
        match bars.last_mut() {
            Some(last) if last.date == date => *last = bar,
            _ => bars.push(bar),
        }
    }
    bars.sort_by_key(|b| b.date);
    bars
}

fn to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime, FetchError> {
    use chrono::Datelike;

    let invalid = || FetchError::Provider {
        ticker: String::new(),
        message: format!("date {} cannot be represented for the provider", date),
    };
    let month = Month::try_from(date.month() as u8).map_err(|_| invalid())?;
    let day = time::Date::from_calendar_date(date.year(), month, date.day() as u8)
        .map_err(|_| invalid())?;
    Ok(day.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_ingestion::PriceField;

    fn quote(timestamp: u64, close: f64) -> Quote {
        Quote {
            timestamp: timestamp as _,
            open: close,
            high: close,
            low: close,
            volume: 1_000 as _,
            close,
            adjclose: close * 0.99,
        }
    }

    #[test]
    fn test_quotes_to_bars_dates_and_duplicates() {
        // 2024-01-05 14:30 UTC, then the same session again, then 2024-01-08
        let quotes = vec![
            quote(1_704_465_000, 100.0),
            quote(1_704_470_000, 101.0),
            quote(1_704_724_200, 102.0),
        ];
        let bars = quotes_to_bars(&quotes);

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(bars[0].close, 101.0);
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert!((bars[1].adj_close - 100.98).abs() < 1e-9);
    }

    #[test]
    fn test_to_offset_datetime() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let odt = to_offset_datetime(date).unwrap();
        assert_eq!(odt.year(), 2024);
        assert_eq!(odt.month(), Month::February);
        assert_eq!(odt.day(), 29);
    }

    #[test]
    fn test_missing_adjclose_falls_back_to_close() {
        let mut missing = quote(1_704_724_200, 102.0);
        missing.adjclose = 0.0;
        let bars = quotes_to_bars(&[quote(1_704_465_000, 100.0), missing]);
        assert_eq!(bars[1].adj_close, 102.0);

        let series = PriceSeries::new("AAPL", bars, PriceField::AdjClose).unwrap();
        assert_eq!(series.values()[1], 102.0);
    }

    #[test]
    fn test_empty_data_set_is_empty_history() {
        assert!(matches!(
            provider_error("AAPL", YahooError::EmptyDataSet),
            FetchError::EmptyHistory { ticker } if ticker == "AAPL"
        ));
        assert!(matches!(
            provider_error("AAPL", YahooError::DataInconsistency),
            FetchError::Provider { .. }
        ));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let source = YahooQuoteSource::new(Duration::from_nanos(1));
        let request = HistoryRequest::new(
            "AAPL",
            Lookback::Range(crate::data_ingestion::RangeSpec::OneYear),
        );
        let err = source.fetch(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_invalid_ticker_fails_before_network() {
        let source = YahooQuoteSource::new(Duration::from_millis(10));
        let request = HistoryRequest::new(
            "NOT A TICKER",
            Lookback::Range(crate::data_ingestion::RangeSpec::OneYear),
        );
        let err = source.fetch(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidTicker(_)));
    }
}
