/// Labeled samples and train/test partitioning
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::features::FeatureTable;
use crate::trading::{LabelCounts, TradeAction};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// A complete feature row with its label.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub date: NaiveDate,
    pub features: Vec<f64>,
    pub label: TradeAction,
}

/// Complete rows of a feature table, in date order. Rows dropped because
/// some indicator was still warming up are counted in `excluded`.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    columns: Vec<String>,
    samples: Vec<Sample>,
    excluded: usize,
}

impl LabeledDataset {
    pub fn from_table(table: &FeatureTable, labels: &[TradeAction]) -> Result<Self, DatasetError> {
        if table.len() != labels.len() {
            return Err(DatasetError::LengthMismatch {
                rows: table.len(),
                labels: labels.len(),
            });
        }

        let samples: Vec<Sample> = table
            .rows()
            .iter()
            .zip(labels)
            .filter_map(|(row, &label)| {
                row.to_vector().map(|features| Sample {
                    date: row.date,
                    features,
                    label,
                })
            })
            .collect();
        let excluded = table.len() - samples.len();

        info!(
            "Dataset: {} complete rows, {} excluded during indicator warm-up",
            samples.len(),
            excluded
        );

        Ok(Self {
            columns: table.columns().to_vec(),
            samples,
            excluded,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn excluded(&self) -> usize {
        self.excluded
    }

    pub fn label_counts(&self) -> LabelCounts {
        LabelCounts::from_labels(self.samples.iter().map(|s| &s.label))
    }

    pub fn split(&self, strategy: SplitStrategy, test_fraction: f64) -> Result<TrainTestSplit, DatasetError> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(DatasetError::InvalidTestFraction(test_fraction));
        }

        let n = self.samples.len();
        if n < MIN_SAMPLES {
            return Err(DatasetError::InsufficientSamples {
                required: MIN_SAMPLES,
                available: n,
                excluded: self.excluded,
            });
        }

        let n_test = (n as f64 * test_fraction).round() as usize;
        let n_train = n.saturating_sub(n_test);
        if n_test == 0 || n_train < 2 {
            return Err(DatasetError::EmptyPartition {
                train: n_train,
                test: n_test,
            });
        }

        let (mut train_idx, mut test_idx): (Vec<usize>, Vec<usize>) = match strategy {
            SplitStrategy::Chronological => ((0..n_train).collect(), (n_train..n).collect()),
            SplitStrategy::Shuffled { seed } => {
                let mut indices: Vec<usize> = (0..n).collect();
                let mut rng = StdRng::seed_from_u64(seed);
                indices.shuffle(&mut rng);
                let test = indices.split_off(n_train);
                (indices, test)
            }
        };
        // both partitions stay in date order
        train_idx.sort_unstable();
        test_idx.sort_unstable();

        let pick = |idx: &[usize]| -> Vec<Sample> {
            idx.iter().map(|&i| self.samples[i].clone()).collect()
        };
        let split = TrainTestSplit {
            train: pick(&train_idx),
            test: pick(&test_idx),
        };
        info!(
            "Split ({}): {} train / {} test",
            strategy,
            split.train.len(),
            split.test.len()
        );
        Ok(split)
    }
}

const MIN_SAMPLES: usize = 3;

/// How rows are assigned to the test partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Earliest rows train, latest rows test
    #[default]
    Chronological,
    /// Seeded random assignment
    Shuffled { seed: u64 },
}

impl fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SplitStrategy::Chronological => write!(f, "chronological"),
            SplitStrategy::Shuffled { seed } => write!(f, "shuffled, seed {}", seed),
        }
    }
}

impl FromStr for SplitStrategy {
    type Err = anyhow::Error;

    /// Accepts `chronological`, `shuffled` (seed 42) or `shuffled:<seed>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.split_once(':') {
            None if lower == "chronological" => Ok(SplitStrategy::Chronological),
            None if lower == "shuffled" => Ok(SplitStrategy::Shuffled { seed: 42 }),
            Some(("shuffled", seed)) => Ok(SplitStrategy::Shuffled {
                seed: seed.parse()?,
            }),
            _ => anyhow::bail!("unknown split strategy {:?} (expected chronological or shuffled[:seed])", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: Vec<Sample>,
    pub test: Vec<Sample>,
}

impl TrainTestSplit {
    pub fn train_features(&self) -> Vec<Vec<f64>> {
        self.train.iter().map(|s| s.features.clone()).collect()
    }

    pub fn test_features(&self) -> Vec<Vec<f64>> {
        self.test.iter().map(|s| s.features.clone()).collect()
    }

    pub fn train_labels(&self) -> Vec<TradeAction> {
        self.train.iter().map(|s| s.label).collect()
    }

    pub fn test_labels(&self) -> Vec<TradeAction> {
        self.test.iter().map(|s| s.label).collect()
    }
}
