/// Technical indicators calculator
///
/// Every indicator is a small state machine driven through `ta::Next`. Feeding
/// a price slice through a fresh indicator yields a series of the same length
/// whose leading entries are `None` until the window has filled.
use std::collections::VecDeque;
use std::fmt;

use ta::errors::{Result, TaError};
use ta::{Close, Next, Period, Reset};

use crate::bollinger::{BollingerBands, BollingerBandsOutput};
use crate::macd::{MACDIndicator, MacdOutput};

/// Run `prices` through `indicator` and collect one output per price.
pub fn series<I, O>(mut indicator: I, prices: &[f64]) -> Vec<O>
where
    I: Next<f64, Output = O>,
{
    prices.iter().map(|&price| indicator.next(price)).collect()
}

/// Simple Moving Average series
pub fn sma(prices: &[f64], window: usize) -> Result<Vec<Option<f64>>> {
    Ok(series(SmaIndicator::new(window)?, prices))
}

/// Exponential Moving Average series
pub fn ema(prices: &[f64], window: usize) -> Result<Vec<Option<f64>>> {
    Ok(series(EmaIndicator::new(window)?, prices))
}

/// Relative Strength Index series
pub fn rsi(prices: &[f64], window: usize) -> Result<Vec<Option<f64>>> {
    Ok(series(RsiIndicator::new(window)?, prices))
}

/// MACD series (line, signal and histogram)
pub fn macd(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<Vec<Option<MacdOutput>>> {
    Ok(series(MACDIndicator::new(fast, slow, signal)?, prices))
}

/// Bollinger Bands series
pub fn bollinger(
    prices: &[f64],
    window: usize,
    multiplier: f64,
) -> Result<Vec<Option<BollingerBandsOutput>>> {
    Ok(series(BollingerBands::new(window, multiplier)?, prices))
}

/// Day-over-day fractional change, undefined for the first observation
pub fn daily_returns(prices: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(prices.len());
    for i in 0..prices.len() {
        if i == 0 || prices[i - 1] == 0.0 {
            out.push(None);
        } else {
            out.push(Some((prices[i] - prices[i - 1]) / prices[i - 1]));
        }
    }
    out
}

/// Simple Moving Average (SMA)
///
/// Arithmetic mean of the last `period` inputs. Returns `None` until
/// `period` inputs have been seen.
#[doc(alias = "SMA")]
#[derive(Debug, Clone)]
pub struct SmaIndicator {
    period: usize,
    window: VecDeque<f64>,
}

impl SmaIndicator {
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(TaError::InvalidParameter);
        }
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
        })
    }
}

impl Period for SmaIndicator {
    fn period(&self) -> usize {
        self.period
    }
}

impl Next<f64> for SmaIndicator {
    type Output = Option<f64>;

    fn next(&mut self, input: f64) -> Self::Output {
        if self.window.len() == self.period {
            self.window.pop_front();
        }
        self.window.push_back(input);

        if self.window.len() < self.period {
            return None;
        }
        let sum: f64 = self.window.iter().sum();
        Some(sum / self.period as f64)
    }
}

impl<T: Close> Next<&T> for SmaIndicator {
    type Output = Option<f64>;

    fn next(&mut self, input: &T) -> Self::Output {
        self.next(input.close())
    }
}

impl Reset for SmaIndicator {
    fn reset(&mut self) {
        self.window.clear();
    }
}

impl fmt::Display for SmaIndicator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SMA({})", self.period)
    }
}

/// Exponential Moving Average (EMA)
///
/// # Formula
///
/// EMA = prev + α * (price - prev), α = 2 / (period + 1)
///
/// The recursion is seeded with the SMA of the first `period` inputs, so the
/// first defined value appears at the `period`-th input.
#[doc(alias = "EMA")]
#[derive(Debug, Clone)]
pub struct EmaIndicator {
    period: usize,
    multiplier: f64,
    seed_sum: f64,
    count: usize,
    current: Option<f64>,
}

impl EmaIndicator {
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(TaError::InvalidParameter);
        }
        Ok(Self {
            period,
            multiplier: 2.0 / ((period + 1) as f64),
            seed_sum: 0.0,
            count: 0,
            current: None,
        })
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

impl Period for EmaIndicator {
    fn period(&self) -> usize {
        self.period
    }
}

impl Next<f64> for EmaIndicator {
    type Output = Option<f64>;

    fn next(&mut self, input: f64) -> Self::Output {
        self.count += 1;

        self.current = match self.current {
            Some(prev) => Some((input - prev) * self.multiplier + prev),
            None => {
                self.seed_sum += input;
                if self.count == self.period {
                    Some(self.seed_sum / self.period as f64)
                } else {
                    None
                }
            }
        };

        self.current
    }
}

impl<T: Close> Next<&T> for EmaIndicator {
    type Output = Option<f64>;

    fn next(&mut self, input: &T) -> Self::Output {
        self.next(input.close())
    }
}

impl Reset for EmaIndicator {
    fn reset(&mut self) {
        self.seed_sum = 0.0;
        self.count = 0;
        self.current = None;
    }
}

impl fmt::Display for EmaIndicator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EMA({})", self.period)
    }
}

/// Relative Strength Index (RSI) with Wilder smoothing
///
/// # Formula
///
/// RS = average gain / average loss
/// RSI = 100 - 100 / (1 + RS)
///
/// The first averages are plain means over the first `period` price changes;
/// later ones use `(prev * (period - 1) + current) / period`. A window with no
/// losses reads 100, a window with no movement at all reads 50.
#[doc(alias = "RSI")]
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    period: usize,
    prev_price: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(TaError::InvalidParameter);
        }
        Ok(Self {
            period,
            prev_price: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        })
    }

    fn value(&self) -> f64 {
        if self.avg_loss == 0.0 {
            return if self.avg_gain == 0.0 { 50.0 } else { 100.0 };
        }
        let rs = self.avg_gain / self.avg_loss;
        (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
    }
}

impl Period for RsiIndicator {
    fn period(&self) -> usize {
        self.period
    }
}

impl Next<f64> for RsiIndicator {
    type Output = Option<f64>;

    fn next(&mut self, input: f64) -> Self::Output {
        let prev = match self.prev_price.replace(input) {
            Some(prev) => prev,
            None => return None,
        };

        let change = input - prev;
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        self.changes += 1;

        let period = self.period as f64;
        if self.changes <= self.period {
            // Accumulate plain sums until the first window is complete
            self.avg_gain += gain;
            self.avg_loss += loss;
            if self.changes < self.period {
                return None;
            }
            self.avg_gain /= period;
            self.avg_loss /= period;
        } else {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }

        Some(self.value())
    }
}

impl<T: Close> Next<&T> for RsiIndicator {
    type Output = Option<f64>;

    fn next(&mut self, input: &T) -> Self::Output {
        self.next(input.close())
    }
}

impl Reset for RsiIndicator {
    fn reset(&mut self) {
        self.prev_price = None;
        self.changes = 0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
    }
}

impl Default for RsiIndicator {
    fn default() -> Self {
        Self {
            period: 14,
            prev_price: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }
}

impl fmt::Display for RsiIndicator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RSI({})", self.period)
    }
}
