/// Trade labels and the threshold rule that assigns them
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TradeAction {
    Sell,
    Hold,
    Buy,
}

impl TradeAction {
    pub const ALL: [TradeAction; 3] = [TradeAction::Sell, TradeAction::Hold, TradeAction::Buy];
    pub const COUNT: usize = 3;

    /// Class index used by the classifier
    pub fn index(self) -> usize {
        match self {
            TradeAction::Sell => 0,
            TradeAction::Hold => 1,
            TradeAction::Buy => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TradeAction::Sell => "Sell",
            TradeAction::Hold => "Hold",
            TradeAction::Buy => "Buy",
        };
        f.write_str(name)
    }
}

/// Fixed RSI thresholds combined with the EMA/SMA trend flag.
///
/// Buy when RSI is below `oversold` while the EMA sits above the SMA, Sell
/// when RSI is above `overbought` while it does not, Hold otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelRule {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for LabelRule {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl LabelRule {
    pub fn new(oversold: f64, overbought: f64) -> anyhow::Result<Self> {
        if !(0.0..=100.0).contains(&oversold)
            || !(0.0..=100.0).contains(&overbought)
            || oversold >= overbought
        {
            anyhow::bail!(
                "label thresholds must satisfy 0 <= oversold < overbought <= 100 (got {} and {})",
                oversold,
                overbought
            );
        }
        Ok(Self {
            oversold,
            overbought,
        })
    }

    /// Label a single row. Rows whose RSI or trend flag is still warming up
    /// are Hold.
    pub fn label(&self, row: &FeatureRow) -> TradeAction {
        match (row.rsi, row.ema_above_sma) {
            (Some(rsi), Some(true)) if rsi < self.oversold => TradeAction::Buy,
            (Some(rsi), Some(false)) if rsi > self.overbought => TradeAction::Sell,
            _ => TradeAction::Hold,
        }
    }

    /// One label per row, in row order.
    pub fn label_rows(&self, rows: &[FeatureRow]) -> Vec<TradeAction> {
        rows.iter().map(|row| self.label(row)).collect()
    }
}

/// Count of each label, indexed by `TradeAction::index`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub sell: usize,
    pub hold: usize,
    pub buy: usize,
}

impl LabelCounts {
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a TradeAction>) -> Self {
        let mut counts = Self::default();
        for label in labels {
            match label {
                TradeAction::Sell => counts.sell += 1,
                TradeAction::Hold => counts.hold += 1,
                TradeAction::Buy => counts.buy += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.sell + self.hold + self.buy
    }

    pub fn get(&self, action: TradeAction) -> usize {
        match action {
            TradeAction::Sell => self.sell,
            TradeAction::Hold => self.hold,
            TradeAction::Buy => self.buy,
        }
    }

    /// Number of distinct labels present
    pub fn distinct(&self) -> usize {
        TradeAction::ALL.iter().filter(|a| self.get(**a) > 0).count()
    }
}

impl fmt::Display for LabelCounts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Buy {} / Hold {} / Sell {}", self.buy, self.hold, self.sell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(rsi: Option<f64>, ema_above_sma: Option<bool>) -> FeatureRow {
        FeatureRow {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            price: 100.0,
            daily_return: None,
            sma: None,
            ema: None,
            ema_above_sma,
            rsi,
            rsi_change: None,
            macd: None,
            macd_signal: None,
            macd_hist: None,
            bb_upper: None,
            bb_middle: None,
            bb_lower: None,
            bb_width: None,
            bb_percent_b: None,
        }
    }

    #[test]
    fn test_rule_branches() {
        let rule = LabelRule::default();
        assert_eq!(rule.label(&row(Some(25.0), Some(true))), TradeAction::Buy);
        assert_eq!(rule.label(&row(Some(25.0), Some(false))), TradeAction::Hold);
        assert_eq!(rule.label(&row(Some(75.0), Some(false))), TradeAction::Sell);
        assert_eq!(rule.label(&row(Some(75.0), Some(true))), TradeAction::Hold);
        assert_eq!(rule.label(&row(Some(50.0), Some(true))), TradeAction::Hold);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let rule = LabelRule::default();
        assert_eq!(rule.label(&row(Some(30.0), Some(true))), TradeAction::Hold);
        assert_eq!(rule.label(&row(Some(70.0), Some(false))), TradeAction::Hold);
    }

    #[test]
    fn test_warming_up_rows_hold() {
        let rule = LabelRule::default();
        assert_eq!(rule.label(&row(None, Some(true))), TradeAction::Hold);
        assert_eq!(rule.label(&row(Some(10.0), None)), TradeAction::Hold);
        assert_eq!(rule.label(&row(Some(90.0), None)), TradeAction::Hold);
    }

    #[test]
    fn test_every_row_labeled() {
        let rule = LabelRule::default();
        let rows = vec![
            row(Some(25.0), Some(true)),
            row(Some(50.0), Some(true)),
            row(Some(75.0), Some(false)),
            row(None, None),
        ];
        let labels = rule.label_rows(&rows);
        assert_eq!(
            labels,
            vec![
                TradeAction::Buy,
                TradeAction::Hold,
                TradeAction::Sell,
                TradeAction::Hold
            ]
        );
    }

    #[test]
    fn test_label_is_pure() {
        let rule = LabelRule::default();
        let r = row(Some(22.0), Some(true));
        let first = rule.label(&r);
        for _ in 0..10 {
            assert_eq!(rule.label(&r.clone()), first);
        }
    }

    #[test]
    fn test_rule_validation() {
        assert!(LabelRule::new(30.0, 70.0).is_ok());
        assert!(LabelRule::new(70.0, 30.0).is_err());
        assert!(LabelRule::new(-1.0, 70.0).is_err());
        assert!(LabelRule::new(30.0, 101.0).is_err());
    }

    #[test]
    fn test_index_round_trip() {
        for action in TradeAction::ALL {
            assert_eq!(TradeAction::from_index(action.index()), Some(action));
        }
        assert_eq!(TradeAction::from_index(3), None);
    }

    #[test]
    fn test_label_counts() {
        let labels = vec![TradeAction::Buy, TradeAction::Hold, TradeAction::Hold];
        let counts = LabelCounts::from_labels(&labels);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.get(TradeAction::Hold), 2);
        assert_eq!(counts.distinct(), 2);
        assert_eq!(format!("{}", counts), "Buy 1 / Hold 2 / Sell 0");
    }
}
