use std::fmt;

use serde::{Deserialize, Serialize};
use ta::errors::{Result, TaError};
use ta::{Close, Next, Reset};

use crate::indicators::EmaIndicator;

/// MACD (Moving Average Convergence Divergence)
///
/// # Formula
///
/// MACD Line = EMA(fast) - EMA(slow)
/// Signal Line = EMA(signal) of MACD Line
/// Histogram = MACD Line - Signal Line
///
/// Each EMA is seeded with the SMA of its first `period` inputs, so the MACD
/// line is undefined for the first `slow - 1` prices and the signal line for
/// a further `signal - 1` MACD values.
///
/// # Parameters
///
/// * _fast_period_ - period for fast EMA (typically 12)
/// * _slow_period_ - period for slow EMA (typically 26)
/// * _signal_period_ - period for signal line EMA (typically 9)
///
/// # Example
///
/// ```
/// use rust_signal_stock::macd::MACDIndicator;
/// use ta::Next;
///
/// let mut macd = MACDIndicator::new(3, 6, 2).unwrap();
/// let outputs: Vec<_> = (0..10).map(|i| macd.next(10.0 + i as f64)).collect();
/// assert!(outputs[4].is_none());
/// assert!(outputs[5].is_some());
/// ```
///
/// # Links
///
/// * [MACD, Investopedia](https://www.investopedia.com/terms/m/macd.asp)
/// * [MACD, Wikipedia](https://en.wikipedia.org/wiki/MACD)
///
#[doc(alias = "MACD")]
#[derive(Debug, Clone)]
pub struct MACDIndicator {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
    fast_ema: EmaIndicator,
    slow_ema: EmaIndicator,
    signal_ema: EmaIndicator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

impl MACDIndicator {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Result<Self> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            return Err(TaError::InvalidParameter);
        }
        if fast_period >= slow_period {
            return Err(TaError::InvalidParameter);
        }

        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
            fast_ema: EmaIndicator::new(fast_period)?,
            slow_ema: EmaIndicator::new(slow_period)?,
            signal_ema: EmaIndicator::new(signal_period)?,
        })
    }

    /// Number of leading inputs for which the signal line is undefined
    pub fn signal_warm_up(&self) -> usize {
        self.slow_period + self.signal_period - 2
    }
}

impl Next<f64> for MACDIndicator {
    type Output = Option<MacdOutput>;

    fn next(&mut self, input: f64) -> Self::Output {
        // Both EMAs must see every input, even while the slow one warms up
        let fast = self.fast_ema.next(input);
        let slow = self.slow_ema.next(input);

        let macd_line = fast? - slow?;
        let signal = self.signal_ema.next(macd_line);

        Some(MacdOutput {
            macd: macd_line,
            signal,
            histogram: signal.map(|s| macd_line - s),
        })
    }
}

impl<T: Close> Next<&T> for MACDIndicator {
    type Output = Option<MacdOutput>;

    fn next(&mut self, input: &T) -> Self::Output {
        self.next(input.close())
    }
}

impl Reset for MACDIndicator {
    fn reset(&mut self) {
        self.fast_ema.reset();
        self.slow_ema.reset();
        self.signal_ema.reset();
    }
}

impl Default for MACDIndicator {
    fn default() -> Self {
        Self::new(12, 26, 9).unwrap()
    }
}

impl fmt::Display for MACDIndicator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "MACD({}, {}, {})",
            self.fast_period, self.slow_period, self.signal_period
        )
    }
}

impl fmt::Display for MacdOutput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.signal, self.histogram) {
            (Some(signal), Some(histogram)) => write!(
                f,
                "MACD: {:.4}, Signal: {:.4}, Histogram: {:.4}",
                self.macd, signal, histogram
            ),
            _ => write!(f, "MACD: {:.4}, Signal: -, Histogram: -", self.macd),
        }
    }
}
