use rust_signal_stock::error::TrainError;
use rust_signal_stock::feature_normalization::StandardScaler;

#[test]
fn scaler_standardises_training_columns() {
    let train = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0], vec![4.0, 40.0]];
    let scaler = StandardScaler::fit(&train).unwrap();

    assert_eq!(scaler.means(), &[2.5, 25.0]);
    // population std of 1..4 is sqrt(1.25)
    assert!((scaler.stds()[0] - 1.25f64.sqrt()).abs() < 1e-12);

    let scaled = scaler.transform(&train).unwrap();
    for col in 0..2 {
        let mean: f64 = scaled.iter().map(|r| r[col]).sum::<f64>() / 4.0;
        let var: f64 = scaled.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12, "column {} mean {}", col, mean);
        assert!((var - 1.0).abs() < 1e-12, "column {} variance {}", col, var);
    }
}

#[test]
fn scaler_uses_training_statistics_for_test_rows() {
    let train = vec![vec![0.0], vec![2.0]];
    let scaler = StandardScaler::fit(&train).unwrap();
    // mean 1, std 1
    let test = scaler.transform(&[vec![5.0], vec![-1.0]]).unwrap();
    assert_eq!(test, vec![vec![4.0], vec![-2.0]]);
}

#[test]
fn zero_variance_column_is_centred_not_scaled() {
    let train = vec![vec![7.0, 1.0], vec![7.0, 3.0]];
    let scaler = StandardScaler::fit(&train).unwrap();
    let scaled = scaler.transform(&[vec![7.0, 2.0], vec![9.0, 2.0]]).unwrap();

    assert_eq!(scaled[0][0], 0.0);
    assert_eq!(scaled[1][0], 2.0);
    assert!(scaled.iter().flatten().all(|v| v.is_finite()));
}

#[test]
fn scaler_rejects_bad_shapes() {
    assert!(matches!(
        StandardScaler::fit(&[]),
        Err(TrainError::TooFewSamples(0))
    ));
    assert!(matches!(
        StandardScaler::fit(&[vec![1.0, 2.0], vec![1.0]]),
        Err(TrainError::DimensionMismatch { expected: 2, got: 1 })
    ));

    let scaler = StandardScaler::fit(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    assert!(matches!(
        scaler.transform_row(&[1.0]),
        Err(TrainError::DimensionMismatch { expected: 2, got: 1 })
    ));
}
