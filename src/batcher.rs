use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use crate::trading::TradeAction;

/// One scaled feature vector and its class.
#[derive(Clone, Debug)]
pub struct SignalItem {
    pub features: Vec<f64>,
    pub label: TradeAction,
}

#[derive(Clone, Debug)]
pub struct SignalBatch<B: Backend> {
    pub inputs: Tensor<B, 2>,
    pub targets: Tensor<B, 1, Int>,
    pub class_weights: Option<Vec<f32>>,
}

/// Stacks items into a `[batch, features]` input and a class-index target.
#[derive(Clone, Debug, Default)]
pub struct SignalBatcher {
    class_weights: Option<Vec<f32>>,
}

impl SignalBatcher {
    pub fn new(class_weights: Option<Vec<f32>>) -> Self {
        Self { class_weights }
    }
}

impl<B: Backend> Batcher<B, SignalItem, SignalBatch<B>> for SignalBatcher {
    fn batch(&self, items: Vec<SignalItem>, device: &B::Device) -> SignalBatch<B> {
        let batch_size = items.len();
        let feature_dim = items.first().map(|i| i.features.len()).unwrap_or(0);

        let mut inputs_data: Vec<f32> = Vec::with_capacity(batch_size * feature_dim);
        let mut targets_data: Vec<i64> = Vec::with_capacity(batch_size);
        for item in &items {
            inputs_data.extend(item.features.iter().map(|&x| x as f32));
            targets_data.push(item.label.index() as i64);
        }

        let inputs = Tensor::<B, 2>::from_floats(
            TensorData::new(inputs_data, [batch_size, feature_dim]),
            device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        SignalBatch {
            inputs,
            targets,
            class_weights: self.class_weights.clone(),
        }
    }
}
