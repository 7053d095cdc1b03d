/// Feature table assembly
///
/// Combines the indicator series into one row per session, aligned with the
/// price series. Every cell is optional: `None` marks a value that is still
/// inside its indicator's warm-up window. Derived columns (RSI change, band
/// width, EMA-above-SMA flag) only look at the current and previous rows.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ta::errors::Result;

use crate::data_ingestion::PriceSeries;
use crate::indicators;

pub const FEATURE_COUNT: usize = 15;

/// Indicator windows used to build the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub sma_window: usize,
    pub ema_window: usize,
    pub rsi_window: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_window: usize,
    pub bollinger_multiplier: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sma_window: 20,
            ema_window: 10,
            rsi_window: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_window: 20,
            bollinger_multiplier: 2.0,
        }
    }
}

impl FeatureConfig {
    /// Column names in the order produced by `FeatureRow::values`.
    pub fn column_names(&self) -> Vec<String> {
        vec![
            "price".to_string(),
            "daily_return".to_string(),
            format!("sma_{}", self.sma_window),
            format!("ema_{}", self.ema_window),
            "ema_above_sma".to_string(),
            format!("rsi_{}", self.rsi_window),
            "rsi_change".to_string(),
            "macd".to_string(),
            "macd_signal".to_string(),
            "macd_hist".to_string(),
            "bb_upper".to_string(),
            "bb_middle".to_string(),
            "bb_lower".to_string(),
            "bb_width".to_string(),
            "bb_percent_b".to_string(),
        ]
    }

    /// Number of leading rows that cannot be complete.
    pub fn warm_up(&self) -> usize {
        [
            1,
            self.sma_window.saturating_sub(1),
            self.ema_window.saturating_sub(1),
            // rsi_change needs two RSI values
            self.rsi_window + 1,
            (self.macd_slow + self.macd_signal).saturating_sub(2),
            self.bollinger_window.saturating_sub(1),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// One session's features. `None` means "not yet defined".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    /// The analysed price (close or adjusted close)
    pub price: f64,
    pub daily_return: Option<f64>,
    pub sma: Option<f64>,
    pub ema: Option<f64>,
    pub ema_above_sma: Option<bool>,
    pub rsi: Option<f64>,
    pub rsi_change: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_width: Option<f64>,
    pub bb_percent_b: Option<f64>,
}

impl FeatureRow {
    pub fn values(&self) -> [Option<f64>; FEATURE_COUNT] {
        [
            Some(self.price),
            self.daily_return,
            self.sma,
            self.ema,
            self.ema_above_sma.map(|up| if up { 1.0 } else { 0.0 }),
            self.rsi,
            self.rsi_change,
            self.macd,
            self.macd_signal,
            self.macd_hist,
            self.bb_upper,
            self.bb_middle,
            self.bb_lower,
            self.bb_width,
            self.bb_percent_b,
        ]
    }

    pub fn is_complete(&self) -> bool {
        self.values().iter().all(Option::is_some)
    }

    /// Dense feature vector, or `None` while any column is warming up.
    pub fn to_vector(&self) -> Option<Vec<f64>> {
        self.values().into_iter().collect()
    }
}

/// Feature rows aligned one-to-one with a price series.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn complete_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.is_complete()).count()
    }
}

/// Compute every indicator over the series and assemble the table.
pub fn build_feature_table(series: &PriceSeries, config: &FeatureConfig) -> Result<FeatureTable> {
    let prices = series.values();

    let returns = indicators::daily_returns(&prices);
    let sma = indicators::sma(&prices, config.sma_window)?;
    let ema = indicators::ema(&prices, config.ema_window)?;
    let rsi = indicators::rsi(&prices, config.rsi_window)?;
    let macd = indicators::macd(&prices, config.macd_fast, config.macd_slow, config.macd_signal)?;
    let bands = indicators::bollinger(&prices, config.bollinger_window, config.bollinger_multiplier)?;

    let rows = series
        .bars()
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let macd_i = macd[i].as_ref();
            let band = bands[i].as_ref();
            let prev_rsi = if i > 0 { rsi[i - 1] } else { None };

            FeatureRow {
                date: bar.date,
                price: prices[i],
                daily_return: returns[i],
                sma: sma[i],
                ema: ema[i],
                ema_above_sma: ema[i].zip(sma[i]).map(|(e, s)| e > s),
                rsi: rsi[i],
                rsi_change: rsi[i].zip(prev_rsi).map(|(now, prev)| now - prev),
                macd: macd_i.map(|m| m.macd),
                macd_signal: macd_i.and_then(|m| m.signal),
                macd_hist: macd_i.and_then(|m| m.histogram),
                bb_upper: band.map(|b| b.upper),
                bb_middle: band.map(|b| b.middle),
                bb_lower: band.map(|b| b.lower),
                bb_width: band.map(|b| b.width),
                bb_percent_b: band.map(|b| b.percent_b),
            }
        })
        .collect();

    Ok(FeatureTable {
        columns: config.column_names(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_ingestion::{PriceBar, PriceField, PriceSeries};
    use chrono::Duration;

    fn series_from(prices: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let points: Vec<_> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| (start + Duration::days(i as i64), p))
            .collect();
        PriceSeries::from_prices("TEST", &points).unwrap()
    }

    fn wavy(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn test_row_count_and_alignment() {
        let series = series_from(&wavy(80));
        let table = build_feature_table(&series, &FeatureConfig::default()).unwrap();

        assert_eq!(table.len(), series.len());
        assert_eq!(table.columns().len(), FEATURE_COUNT);
        for (row, bar) in table.rows().iter().zip(series.bars()) {
            assert_eq!(row.date, bar.date);
            assert_eq!(row.price, bar.close);
        }
        assert_eq!(table.columns()[0], "price");
    }

    #[test]
    fn test_price_column_follows_series_field() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let bars: Vec<PriceBar> = wavy(40)
            .into_iter()
            .enumerate()
            .map(|(i, p)| PriceBar {
                adj_close: p * 0.5,
                ..PriceBar::flat(start + Duration::days(i as i64), p)
            })
            .collect();
        let series = PriceSeries::new("TEST", bars, PriceField::AdjClose).unwrap();
        let table = build_feature_table(&series, &FeatureConfig::default()).unwrap();

        for (row, bar) in table.rows().iter().zip(series.bars()) {
            assert_eq!(row.price, bar.adj_close);
            assert_ne!(row.price, bar.close);
        }
    }

    #[test]
    fn test_warm_up_matches_complete_rows() {
        let config = FeatureConfig::default();
        let series = series_from(&wavy(80));
        let table = build_feature_table(&series, &config).unwrap();

        assert_eq!(config.warm_up(), 33);
        for (i, row) in table.rows().iter().enumerate() {
            assert_eq!(row.is_complete(), i >= config.warm_up(), "row {}", i);
        }
        assert_eq!(table.complete_rows(), 80 - 33);
    }

    #[test]
    fn test_derived_columns() {
        let series = series_from(&wavy(60));
        let table = build_feature_table(&series, &FeatureConfig::default()).unwrap();
        let rows = table.rows();

        for i in 1..rows.len() {
            let row = &rows[i];
            if let (Some(upper), Some(lower), Some(width)) = (row.bb_upper, row.bb_lower, row.bb_width) {
                assert!((width - (upper - lower)).abs() < 1e-12);
            }
            if let (Some(now), Some(prev), Some(change)) = (row.rsi, rows[i - 1].rsi, row.rsi_change) {
                assert!((change - (now - prev)).abs() < 1e-12);
            }
            if let (Some(e), Some(s)) = (row.ema, row.sma) {
                assert_eq!(row.ema_above_sma, Some(e > s));
            }
        }
    }

    #[test]
    fn test_causality() {
        // Changing the future must not change any earlier row
        let prices = wavy(70);
        let mut altered = prices.clone();
        for p in altered.iter_mut().skip(50) {
            *p *= 1.5;
        }
        let config = FeatureConfig::default();
        let a = build_feature_table(&series_from(&prices), &config).unwrap();
        let b = build_feature_table(&series_from(&altered), &config).unwrap();

        assert_eq!(a.rows()[..50], b.rows()[..50]);
        assert_ne!(a.rows()[50], b.rows()[50]);
    }

    #[test]
    fn test_constant_series() {
        let series = series_from(&[42.5; 50]);
        let table = build_feature_table(&series, &FeatureConfig::default()).unwrap();

        for row in table.rows().iter().filter(|r| r.is_complete()) {
            assert_eq!(row.sma, Some(42.5));
            assert_eq!(row.ema, Some(42.5));
            assert_eq!(row.bb_middle, Some(42.5));
            assert_eq!(row.bb_upper, Some(42.5));
            assert_eq!(row.bb_lower, Some(42.5));
            assert_eq!(row.rsi, Some(50.0));
            assert_eq!(row.macd, Some(0.0));
            assert_eq!(row.ema_above_sma, Some(false));
        }
    }

    #[test]
    fn test_to_vector() {
        let series = series_from(&wavy(40));
        let table = build_feature_table(&series, &FeatureConfig::default()).unwrap();
        assert!(table.rows()[0].to_vector().is_none());
        let last = table.rows().last().unwrap().to_vector().unwrap();
        assert_eq!(last.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_invalid_window() {
        let series = series_from(&wavy(10));
        let config = FeatureConfig {
            sma_window: 0,
            ..FeatureConfig::default()
        };
        assert!(build_feature_table(&series, &config).is_err());
    }
}
