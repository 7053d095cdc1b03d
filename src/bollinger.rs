use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use ta::errors::{Result, TaError};
use ta::{Close, Next, Period, Reset};

/// Bollinger Bands (BB)
///
/// Bollinger Bands consist of three lines:
/// - Middle Band: Simple Moving Average (SMA)
/// - Upper Band: SMA + (k * Standard Deviation)
/// - Lower Band: SMA - (k * Standard Deviation)
///
/// # Formula
///
/// Middle Band = SMA(price, period)
/// Upper Band = Middle Band + (k * σ)
/// Lower Band = Middle Band - (k * σ)
///
/// where:
/// - k is typically 2
/// - σ is the population standard deviation of the window
///
/// No output is produced until `period` prices have been seen.
///
/// # Links
///
/// * [Bollinger Bands, Wikipedia](https://en.wikipedia.org/wiki/Bollinger_Bands)
/// * [Bollinger Bands, Investopedia](https://www.investopedia.com/terms/b/bollingerbands.asp)
///
#[doc(alias = "BB")]
#[derive(Debug, Clone)]
pub struct BollingerBands {
    period: usize,
    multiplier: f64,
    prices: VecDeque<f64>,
}

impl BollingerBands {
    pub fn new(period: usize, multiplier: f64) -> Result<Self> {
        if period == 0 || !multiplier.is_finite() || multiplier < 0.0 {
            return Err(TaError::InvalidParameter);
        }
        Ok(Self {
            period,
            multiplier,
            prices: VecDeque::with_capacity(period),
        })
    }

    fn calculate_sma(&self) -> f64 {
        let sum: f64 = self.prices.iter().sum();
        sum / self.period as f64
    }

    fn calculate_std_dev(&self, sma: f64) -> f64 {
        let variance: f64 = self
            .prices
            .iter()
            .map(|&price| {
                let diff = price - sma;
                diff * diff
            })
            .sum::<f64>()
            / self.period as f64;

        variance.sqrt()
    }
}

impl Period for BollingerBands {
    fn period(&self) -> usize {
        self.period
    }
}

impl Next<f64> for BollingerBands {
    type Output = Option<BollingerBandsOutput>;

    fn next(&mut self, input: f64) -> Self::Output {
        if self.prices.len() == self.period {
            self.prices.pop_front();
        }
        self.prices.push_back(input);
        if self.prices.len() < self.period {
            return None;
        }

        let middle = self.calculate_sma();
        let std_dev = self.calculate_std_dev(middle);
        let upper = middle + (self.multiplier * std_dev);
        let lower = middle - (self.multiplier * std_dev);

        Some(BollingerBandsOutput {
            upper,
            middle,
            lower,
            width: upper - lower,
            percent_b: if upper != lower {
                (input - lower) / (upper - lower)
            } else {
                0.5
            },
        })
    }
}

impl<T: Close> Next<&T> for BollingerBands {
    type Output = Option<BollingerBandsOutput>;

    fn next(&mut self, input: &T) -> Self::Output {
        self.next(input.close())
    }
}

impl Reset for BollingerBands {
    fn reset(&mut self) {
        self.prices.clear();
    }
}

impl Default for BollingerBands {
    fn default() -> Self {
        Self::new(20, 2.0).unwrap()
    }
}

impl fmt::Display for BollingerBands {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BB({}, {})", self.period, self.multiplier)
    }
}

/// Output structure for Bollinger Bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerBandsOutput {
    /// Upper band value
    pub upper: f64,
    /// Middle band value (SMA)
    pub middle: f64,
    /// Lower band value
    pub lower: f64,
    /// Absolute band width: upper - lower
    pub width: f64,
    /// %B: (price - lower) / (upper - lower)
    pub percent_b: f64,
}

impl fmt::Display for BollingerBandsOutput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "BB(upper: {:.2}, middle: {:.2}, lower: {:.2}, width: {:.2}, %B: {:.3})",
            self.upper, self.middle, self.lower, self.width, self.percent_b
        )
    }
}
