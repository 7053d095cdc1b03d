use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// Column-wise standardisation: `(x - mean) / std`, population std.
///
/// Fit on training rows only, then apply the same statistics to the test
/// rows. Columns with zero variance are centred but left unscaled so a flat
/// feature (e.g. the EMA/SMA flag on a quiet window) maps to 0 instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, TrainError> {
        let first = rows.first().ok_or(TrainError::TooFewSamples(0))?;
        let dim = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; dim];
        for row in rows {
            check_width(dim, row)?;
            for (m, x) in means.iter_mut().zip(row) {
                *m += x;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut stds = vec![0.0; dim];
        for row in rows {
            for ((s, x), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (x - m) * (x - m);
            }
        }
        stds.iter_mut().for_each(|s| *s = (*s / n).sqrt());

        Ok(Self { means, stds })
    }

    pub fn dim(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, TrainError> {
        check_width(self.dim(), row)?;
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(x, (m, s))| if *s > f64::EPSILON { (x - m) / s } else { x - m })
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, TrainError> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}

fn check_width(expected: usize, row: &[f64]) -> Result<(), TrainError> {
    if row.len() != expected {
        return Err(TrainError::DimensionMismatch {
            expected,
            got: row.len(),
        });
    }
    Ok(())
}
