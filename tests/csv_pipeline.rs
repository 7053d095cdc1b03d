use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_signal_stock::data_ingestion::{
    CsvQuoteSource, HistoryRequest, Lookback, PriceField, QuoteSource, RangeSpec,
};
use rust_signal_stock::error::FetchError;
use rust_signal_stock::pipeline::{export_labeled_features, run_pipeline, PipelineConfig};
use rust_signal_stock::training::TrainingConfig;
use tempfile::TempDir;

const SESSIONS: usize = 140;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Yahoo-style export of `SESSIONS` weekday sessions starting 2023-01-02,
/// plus one row with null prices that the reader has to skip.
fn write_export(dir: &Path) -> PathBuf {
    let path = dir.join("quotes.csv");
    let mut file = File::create(&path).unwrap();
    writeln!(file, "Date,Open,High,Low,Close,Adj Close,Volume").unwrap();

    let mut day = d(2023, 1, 2);
    let mut written = 0;
    while written < SESSIONS {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            let t = written as f64;
            let close = 80.0 + (t * 0.21).sin() * 9.0 + (t * 0.7).cos() * 1.5 + t * 0.02;
            writeln!(
                file,
                "{},{:.4},{:.4},{:.4},{:.4},{:.4},{}",
                day,
                close - 0.3,
                close + 0.8,
                close - 0.9,
                close,
                close * 0.98,
                1_000_000 + written * 10
            )
            .unwrap();
            written += 1;
            if written == 70 {
                // holiday row as Yahoo exports it
                writeln!(file, "{},null,null,null,null,null,null", day + Duration::days(1)).unwrap();
            }
        }
        day += Duration::days(1);
    }
    path
}

fn quick_config() -> PipelineConfig {
    PipelineConfig {
        training: TrainingConfig::new().with_epochs(60),
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn csv_source_reads_and_skips_null_rows() {
    let dir = TempDir::new().unwrap();
    let source = CsvQuoteSource::new(write_export(dir.path()));

    let request = HistoryRequest::new("CSVT", Lookback::Range(RangeSpec::Max));
    let series = source.fetch(&request).await.unwrap();
    assert_eq!(series.len(), SESSIONS);
    assert_eq!(series.first_date(), d(2023, 1, 2));
    assert_eq!(series.field(), PriceField::AdjClose);
    assert!(series.bars().windows(2).all(|w| w[0].date < w[1].date));

    let raw = source
        .fetch(&request.clone().with_field(PriceField::Close))
        .await
        .unwrap();
    assert!(raw.values()[0] > series.values()[0]);
}

#[tokio::test]
async fn csv_source_honours_date_window() {
    let dir = TempDir::new().unwrap();
    let source = CsvQuoteSource::new(write_export(dir.path()));

    let request = HistoryRequest::new(
        "CSVT",
        Lookback::Dates {
            start: d(2023, 2, 1),
            end: d(2023, 2, 28),
        },
    );
    let series = source.fetch(&request).await.unwrap();
    // February 2023 has 20 weekdays
    assert_eq!(series.len(), 20);
    assert_eq!(series.first_date(), d(2023, 2, 1));
    assert_eq!(series.last_date(), d(2023, 2, 28));
}

#[tokio::test]
async fn csv_source_errors() {
    let dir = TempDir::new().unwrap();
    let source = CsvQuoteSource::new(write_export(dir.path()));

    let outside = HistoryRequest::new(
        "CSVT",
        Lookback::Dates {
            start: d(2030, 1, 1),
            end: d(2030, 6, 1),
        },
    );
    assert!(matches!(
        source.fetch(&outside).await,
        Err(FetchError::EmptyHistory { .. })
    ));

    let reversed = HistoryRequest::new(
        "CSVT",
        Lookback::Dates {
            start: d(2023, 6, 1),
            end: d(2023, 1, 1),
        },
    );
    assert!(matches!(
        source.fetch(&reversed).await,
        Err(FetchError::InvalidRange { .. })
    ));

    let missing = CsvQuoteSource::new(dir.path().join("missing.csv"));
    let request = HistoryRequest::new("CSVT", Lookback::Range(RangeSpec::OneYear));
    assert!(matches!(
        missing.fetch(&request).await,
        Err(FetchError::Io(_))
    ));
}

#[tokio::test]
async fn csv_source_fetches_a_single_session() {
    let dir = TempDir::new().unwrap();
    let source = CsvQuoteSource::new(write_export(dir.path()));

    let day = d(2023, 2, 1);
    let request = HistoryRequest::new("CSVT", Lookback::Dates { start: day, end: day });
    let series = source.fetch(&request).await.unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series.first_date(), day);
}

#[tokio::test]
async fn pipeline_runs_end_to_end_from_csv() {
    let dir = TempDir::new().unwrap();
    let source = CsvQuoteSource::new(write_export(dir.path()));
    let request = HistoryRequest::new("CSVT", Lookback::Range(RangeSpec::Max));
    let config = quick_config();

    let output = run_pipeline(&source, &request, &config).await.unwrap();
    let report = &output.report;

    assert_eq!(report.ticker, "CSVT");
    assert_eq!(report.total_rows, SESSIONS);
    assert_eq!(report.excluded_rows, config.features.warm_up());
    assert_eq!(
        report.train_rows + report.test_rows + report.excluded_rows,
        report.total_rows
    );
    assert_eq!(report.labels_all.total(), SESSIONS);
    assert!((0.0..=1.0).contains(&report.metrics.accuracy));
    assert!((0.0..=1.0).contains(&report.metrics.weighted_f1));
    assert!(report.metrics.auc_roc.is_nan() || (0.0..=1.0).contains(&report.metrics.auc_roc));

    // same inputs, same fit up to float noise
    let again = run_pipeline(&source, &request, &config).await.unwrap();
    assert_eq!(again.report.train_rows, report.train_rows);
    assert_eq!(again.report.labels_test, report.labels_test);
    assert!(
        (again.report.final_loss - report.final_loss).abs() < 1e-3,
        "{} vs {}",
        again.report.final_loss,
        report.final_loss
    );

    let export = dir.path().join("features.csv");
    export_labeled_features(&output.table, &output.labels, &export).unwrap();
    let mut rdr = csv::Reader::from_path(&export).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(headers.get(0), Some("date"));
    assert_eq!(headers.get(headers.len() - 1), Some("label"));
    let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), SESSIONS);
    for (record, label) in records.iter().zip(&output.labels) {
        assert_eq!(record.get(record.len() - 1), Some(label.to_string().as_str()));
    }
}

#[tokio::test]
async fn pipeline_reports_fetch_failures_with_context() {
    let dir = TempDir::new().unwrap();
    let source = CsvQuoteSource::new(write_export(dir.path()));
    let request = HistoryRequest::new("BAD TICKER", Lookback::Range(RangeSpec::Max));

    let err = run_pipeline(&source, &request, &quick_config()).await.unwrap_err();
    assert!(err.to_string().contains("BAD TICKER"));
    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::InvalidTicker(_))
    ));
}
