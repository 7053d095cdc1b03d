/// End-to-end signal pipeline
///
/// fetch -> indicators -> feature table -> labels -> split -> fit -> evaluate.
/// Every parameter travels in `PipelineConfig`; nothing is read from globals.
use std::fmt;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;

use crate::data_ingestion::{HistoryRequest, PriceField, PriceSeries, QuoteSource};
use crate::dataset::{LabeledDataset, SplitStrategy, DEFAULT_TEST_FRACTION};
use crate::features::{build_feature_table, FeatureConfig, FeatureTable};
use crate::metrics::EvaluationMetrics;
use crate::trading::{LabelCounts, LabelRule, TradeAction};
use crate::training::{self, TrainingConfig};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub label_rule: LabelRule,
    pub split: SplitStrategy,
    pub test_fraction: f64,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            label_rule: LabelRule::default(),
            split: SplitStrategy::default(),
            test_fraction: DEFAULT_TEST_FRACTION,
            training: TrainingConfig::new(),
        }
    }
}

/// Row accounting, label distribution and test-set metrics for one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub ticker: String,
    pub price_field: PriceField,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub total_rows: usize,
    pub excluded_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub split: SplitStrategy,
    pub test_fraction: f64,
    pub labels_all: LabelCounts,
    pub labels_train: LabelCounts,
    pub labels_test: LabelCounts,
    pub epochs: usize,
    pub final_loss: f64,
    pub metrics: EvaluationMetrics,
}

/// The labeled feature table alongside the report, for export.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: FeatureTable,
    pub labels: Vec<TradeAction>,
    pub report: PipelineReport,
}

/// Fetch the requested history from `source`, then evaluate it.
pub async fn run_pipeline<S: QuoteSource>(
    source: &S,
    request: &HistoryRequest,
    config: &PipelineConfig,
) -> Result<PipelineOutput> {
    let series = source
        .fetch(request)
        .await
        .with_context(|| format!("failed to load price history for {}", request.ticker))?;
    evaluate_series(&series, config)
}

/// Run every stage after the fetch on an in-memory series.
pub fn evaluate_series(series: &PriceSeries, config: &PipelineConfig) -> Result<PipelineOutput> {
    info!(
        "Evaluating {} sessions of {} ({} to {})",
        series.len(),
        series.ticker(),
        series.first_date(),
        series.last_date()
    );

    let table = build_feature_table(series, &config.features)
        .map_err(|e| anyhow::anyhow!("invalid indicator parameters {:?}: {:?}", config.features, e))?;
    let labels = config.label_rule.label_rows(table.rows());
    let labels_all = LabelCounts::from_labels(&labels);
    info!("Labels: {}", labels_all);

    let dataset = LabeledDataset::from_table(&table, &labels)?;
    let split = dataset
        .split(config.split, config.test_fraction)
        .context("failed to split labeled rows")?;

    let labels_train = LabelCounts::from_labels(&split.train_labels());
    if labels_train.distinct() < 2 {
        warn!("Training rows hold a single class ({}); the model can only predict it", labels_train);
    }

    let model = training::fit(&config.training, &split.train_features(), &split.train_labels())
        .context("failed to fit classifier")?;

    let test_features = split.test_features();
    let y_true = split.test_labels();
    let y_proba = model.predict_proba(&test_features)?;
    let y_pred = model.predict(&test_features)?;
    let metrics = EvaluationMetrics::calculate(&y_true, &y_pred, &y_proba);
    if metrics.auc_roc.is_nan() {
        warn!("AUC-ROC undefined: test rows hold fewer than two classes");
    }

    let report = PipelineReport {
        ticker: series.ticker().to_string(),
        price_field: series.field(),
        first_date: series.first_date(),
        last_date: series.last_date(),
        total_rows: table.len(),
        excluded_rows: dataset.excluded(),
        train_rows: split.train.len(),
        test_rows: split.test.len(),
        split: config.split,
        test_fraction: config.test_fraction,
        labels_all,
        labels_train,
        labels_test: LabelCounts::from_labels(&y_true),
        epochs: model.epochs(),
        final_loss: model.final_loss(),
        metrics,
    };

    Ok(PipelineOutput {
        table,
        labels,
        report,
    })
}

/// Write every row of the table with its label. Missing values are empty cells.
pub fn write_labeled_features<W: io::Write>(
    table: &FeatureTable,
    labels: &[TradeAction],
    writer: W,
) -> Result<()> {
    if table.len() != labels.len() {
        anyhow::bail!("{} rows but {} labels", table.len(), labels.len());
    }

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["date".to_string()];
    header.extend(table.columns().iter().cloned());
    header.push("label".to_string());
    wtr.write_record(&header)?;

    for (row, label) in table.rows().iter().zip(labels) {
        let mut record = vec![row.date.to_string()];
        record.extend(
            row.values()
                .iter()
                .map(|v| v.map(|x| x.to_string()).unwrap_or_default()),
        );
        record.push(label.to_string());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_labeled_features(table: &FeatureTable, labels: &[TradeAction], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_labeled_features(table, labels, file)?;
    info!("Wrote {} labeled rows to {}", table.len(), path.display());
    Ok(())
}

fn fmt_metric(value: f64) -> String {
    if value.is_nan() {
        "undefined".to_string()
    } else {
        format!("{:.4}", value)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "=== Signal Model Report: {} ===", self.ticker)?;
        writeln!(
            f,
            "Sessions: {} ({} to {}, {:?})",
            self.total_rows, self.first_date, self.last_date, self.price_field
        )?;
        writeln!(f, "Excluded (indicator warm-up): {}", self.excluded_rows)?;
        writeln!(
            f,
            "Train / test: {} / {} ({}, test fraction {})",
            self.train_rows, self.test_rows, self.split, self.test_fraction
        )?;

        writeln!(f, "\n=== Labels ===")?;
        writeln!(f, "All rows:  {}", self.labels_all)?;
        writeln!(f, "Train:     {}", self.labels_train)?;
        writeln!(f, "Test:      {}", self.labels_test)?;

        writeln!(f, "\n=== Test Metrics ===")?;
        writeln!(f, "Epochs: {}, final training loss {:.6}", self.epochs, self.final_loss)?;
        writeln!(f, "Accuracy:     {}", fmt_metric(self.metrics.accuracy))?;
        writeln!(f, "Weighted F1:  {}", fmt_metric(self.metrics.weighted_f1))?;
        writeln!(f, "AUC-ROC (OvR): {}", fmt_metric(self.metrics.auc_roc))?;
        for class in &self.metrics.per_class {
            writeln!(
                f,
                "  {:<5} precision {:.3} recall {:.3} f1 {:.3} support {:>4} auc {}",
                class.class.to_string(),
                class.precision,
                class.recall,
                class.f1,
                class.support,
                class.auc.map(|a| format!("{:.3}", a)).unwrap_or_else(|| "n/a".to_string())
            )?;
        }

        writeln!(f, "\n=== Confusion Matrix ===")?;
        write!(f, "{}", self.metrics.confusion_matrix)
    }
}
