/// Fitting and querying the softmax-regression classifier
///
/// Training is full-batch: the whole (scaled) training set is one batch and
/// every epoch is one Adam step. Runs on the ndarray backend.
use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use burn::config::Config;
use burn::data::dataloader::batcher::Batcher;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, Optimizer};
use burn::tensor::activation::softmax;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use burn::train::TrainStep;
use log::{debug, info};

use crate::batcher::{SignalBatch, SignalBatcher, SignalItem};
use crate::error::TrainError;
use crate::feature_normalization::StandardScaler;
use crate::model::{ModelConfig, SignalClassifier};
use crate::trading::{LabelCounts, TradeAction};

pub type TrainBackend = Autodiff<NdArray>;
pub type InferBackend = NdArray;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 0.05)]
    pub learning_rate: f64,
    #[config(default = 300)]
    pub epochs: usize,
    /// Weight the loss by inverse class frequency
    #[config(default = false)]
    pub balance_classes: bool,
}

/// A fitted model together with the scaler it was trained behind.
#[derive(Debug)]
pub struct TrainedClassifier {
    model: SignalClassifier<InferBackend>,
    scaler: StandardScaler,
    device: NdArrayDevice,
    final_loss: f64,
    epochs: usize,
}

pub fn fit(
    config: &TrainingConfig,
    features: &[Vec<f64>],
    labels: &[TradeAction],
) -> Result<TrainedClassifier, TrainError> {
    if features.len() != labels.len() {
        return Err(TrainError::LabelMismatch {
            features: features.len(),
            labels: labels.len(),
        });
    }
    if features.len() < 2 {
        return Err(TrainError::TooFewSamples(features.len()));
    }

    let scaler = StandardScaler::fit(features)?;
    let scaled = scaler.transform(features)?;
    let device = NdArrayDevice::default();

    let class_weights = config
        .balance_classes
        .then(|| inverse_frequency_weights(&LabelCounts::from_labels(labels)));
    let items: Vec<SignalItem> = scaled
        .into_iter()
        .zip(labels)
        .map(|(features, &label)| SignalItem { features, label })
        .collect();
    let batch: SignalBatch<TrainBackend> = SignalBatcher::new(class_weights).batch(items, &device);

    let mut model = ModelConfig::new(scaler.dim()).init::<TrainBackend>(&device);
    let mut optim = AdamConfig::new().init::<TrainBackend, SignalClassifier<TrainBackend>>();

    info!(
        "Training softmax regression on {} rows x {} features ({} epochs, lr {})",
        features.len(),
        scaler.dim(),
        config.epochs,
        config.learning_rate
    );

    let mut final_loss = f64::NAN;
    for epoch in 1..=config.epochs {
        let output = TrainStep::step(&model, batch.clone());
        let loss = output.item.loss.clone().into_scalar().elem::<f64>();
        if !loss.is_finite() {
            return Err(TrainError::Diverged { epoch, loss });
        }
        if epoch == 1 || epoch % 50 == 0 {
            debug!("epoch {:>4}: loss {:.6}", epoch, loss);
        }
        model = optim.step(config.learning_rate, model, output.grads);
        final_loss = loss;
    }
    info!("Training finished, final loss {:.6}", final_loss);

    Ok(TrainedClassifier {
        model: model.valid(),
        scaler,
        device,
        final_loss,
        epochs: config.epochs,
    })
}

impl TrainedClassifier {
    /// Class probabilities per row, indexed by `TradeAction::index`.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<[f64; 3]>, TrainError> {
        if features.is_empty() {
            return Ok(Vec::new());
        }
        let scaled = self.scaler.transform(features)?;
        let n = scaled.len();
        let dim = self.scaler.dim();
        let flat: Vec<f32> = scaled.iter().flatten().map(|&x| x as f32).collect();

        let inputs = Tensor::<InferBackend, 2>::from_floats(TensorData::new(flat, [n, dim]), &self.device);
        let probs = softmax(self.model.forward(inputs), 1);
        let values = probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| TrainError::TensorData(format!("{:?}", e)))?;

        Ok(values
            .chunks_exact(TradeAction::COUNT)
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
            .collect())
    }

    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<TradeAction>, TrainError> {
        Ok(self
            .predict_proba(features)?
            .iter()
            .map(|p| argmax(p))
            .collect())
    }

    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }
}

fn argmax(probs: &[f64; 3]) -> TradeAction {
    let mut best = 0;
    for i in 1..probs.len() {
        if probs[i] > probs[best] {
            best = i;
        }
    }
    TradeAction::from_index(best).unwrap_or(TradeAction::Hold)
}

/// `n / (classes * count)` for present classes, zero for absent ones.
fn inverse_frequency_weights(counts: &LabelCounts) -> Vec<f32> {
    let total = counts.total() as f64;
    let present = counts.distinct().max(1) as f64;
    TradeAction::ALL
        .iter()
        .map(|&action| match counts.get(action) {
            0 => 0.0,
            c => (total / (present * c as f64)) as f32,
        })
        .collect()
}
