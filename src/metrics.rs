//! Classification metrics for the three-way trade signal
//!
//! Accuracy, support-weighted F1 and one-vs-rest AUC-ROC. Degenerate inputs
//! (a class never predicted, a test set holding a single class) produce 0 or
//! NaN values instead of errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::trading::TradeAction;

/// Counts indexed `[actual][predicted]` by `TradeAction::index`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 3]; 3],
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[TradeAction], y_pred: &[TradeAction]) -> Self {
        let mut counts = [[0; 3]; 3];
        for (t, p) in y_true.iter().zip(y_pred) {
            counts[t.index()][p.index()] += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..3).map(|i| self.counts[i][i]).sum()
    }

    pub fn true_positives(&self, class: TradeAction) -> usize {
        let i = class.index();
        self.counts[i][i]
    }

    /// Rows whose true label is `class`
    pub fn support(&self, class: TradeAction) -> usize {
        self.counts[class.index()].iter().sum()
    }

    /// Rows predicted as `class`
    pub fn predicted(&self, class: TradeAction) -> usize {
        self.counts.iter().map(|row| row[class.index()]).sum()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{:>14} {:>6} {:>6} {:>6}", "actual \\ pred", "Sell", "Hold", "Buy")?;
        for action in TradeAction::ALL {
            let row = &self.counts[action.index()];
            writeln!(f, "{:>14} {:>6} {:>6} {:>6}", action.to_string(), row[0], row[1], row[2])?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: TradeAction,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
    /// One-vs-rest AUC; `None` if the class is absent or is the only one present
    pub auc: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub weighted_f1: f64,
    /// Macro average of the defined per-class AUCs, NaN when none is defined
    pub auc_roc: f64,
    pub per_class: Vec<ClassMetrics>,
    pub confusion_matrix: ConfusionMatrix,
}

impl EvaluationMetrics {
    /// `y_proba` rows are class probabilities indexed by `TradeAction::index`.
    pub fn calculate(y_true: &[TradeAction], y_pred: &[TradeAction], y_proba: &[[f64; 3]]) -> Self {
        let cm = ConfusionMatrix::from_predictions(y_true, y_pred);
        let (auc_roc, aucs) = roc_auc_ovr(y_true, y_proba);

        let per_class = TradeAction::ALL
            .iter()
            .map(|&class| {
                let (precision, recall, f1) = precision_recall_f1(&cm, class);
                ClassMetrics {
                    class,
                    precision,
                    recall,
                    f1,
                    support: cm.support(class),
                    auc: aucs[class.index()],
                }
            })
            .collect();

        Self {
            accuracy: accuracy_from_cm(&cm),
            weighted_f1: weighted_f1_from_cm(&cm),
            auc_roc,
            per_class,
            confusion_matrix: cm,
        }
    }
}

pub fn accuracy(y_true: &[TradeAction], y_pred: &[TradeAction]) -> f64 {
    accuracy_from_cm(&ConfusionMatrix::from_predictions(y_true, y_pred))
}

/// Per-class F1 averaged with weights equal to each class's true support.
pub fn weighted_f1(y_true: &[TradeAction], y_pred: &[TradeAction]) -> f64 {
    weighted_f1_from_cm(&ConfusionMatrix::from_predictions(y_true, y_pred))
}

fn accuracy_from_cm(cm: &ConfusionMatrix) -> f64 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    cm.correct() as f64 / total as f64
}

fn precision_recall_f1(cm: &ConfusionMatrix, class: TradeAction) -> (f64, f64, f64) {
    let tp = cm.true_positives(class) as f64;
    let ratio = |denom: usize| if denom == 0 { 0.0 } else { tp / denom as f64 };
    let precision = ratio(cm.predicted(class));
    let recall = ratio(cm.support(class));
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

fn weighted_f1_from_cm(cm: &ConfusionMatrix) -> f64 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    TradeAction::ALL
        .iter()
        .map(|&class| precision_recall_f1(cm, class).2 * cm.support(class) as f64)
        .sum::<f64>()
        / total as f64
}

/// One-vs-rest AUC-ROC for each class plus their macro average.
///
/// Classes with no positive or no negative row get `None` and are left out of
/// the average. If that leaves nothing the average is NaN.
pub fn roc_auc_ovr(y_true: &[TradeAction], y_proba: &[[f64; 3]]) -> (f64, [Option<f64>; 3]) {
    let mut aucs = [None; 3];
    for class in TradeAction::ALL {
        let positives: Vec<bool> = y_true.iter().map(|&t| t == class).collect();
        let scores: Vec<f64> = y_proba.iter().map(|p| p[class.index()]).collect();
        aucs[class.index()] = binary_auc(&positives, &scores);
    }

    let defined: Vec<f64> = aucs.iter().flatten().copied().collect();
    let macro_auc = if defined.is_empty() {
        f64::NAN
    } else {
        defined.iter().sum::<f64>() / defined.len() as f64
    };
    (macro_auc, aucs)
}

/// Mann-Whitney form of the ROC area; tied scores count half.
pub fn binary_auc(positives: &[bool], scores: &[f64]) -> Option<f64> {
    let n = positives.len().min(scores.len());
    let n_pos = positives[..n].iter().filter(|&&p| p).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // average ranks (1-based) over runs of equal scores
    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let mid_rank = (start + end + 1) as f64 / 2.0;
        let pos_in_run = order[start..end].iter().filter(|&&i| positives[i]).count();
        rank_sum_pos += mid_rank * pos_in_run as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg as f64))
}

/// Hard predictions as degenerate probability rows.
pub fn one_hot(y_pred: &[TradeAction]) -> Vec<[f64; 3]> {
    y_pred
        .iter()
        .map(|p| {
            let mut row = [0.0; 3];
            row[p.index()] = 1.0;
            row
        })
        .collect()
}
