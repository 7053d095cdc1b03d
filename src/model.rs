use crate::batcher::SignalBatch;
use burn::{
    config::Config,
    module::Module,
    nn::{loss::CrossEntropyLossConfig, Initializer, Linear, LinearConfig},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
    train::{ClassificationOutput, TrainOutput, TrainStep},
};

#[derive(Config, Debug)]
pub struct ModelConfig {
    pub num_features: usize,
    #[config(default = 3)]
    pub num_classes: usize,
}

/// Softmax regression: a single linear layer producing one logit per
/// `TradeAction`.
#[derive(Module, Debug)]
pub struct SignalClassifier<B: Backend> {
    linear: Linear<B>,
}

impl ModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SignalClassifier<B> {
        // No random draw at init
        let linear = LinearConfig::new(self.num_features, self.num_classes)
            .with_initializer(Initializer::Zeros)
            .init(device);

        SignalClassifier { linear }
    }
}

impl<B: Backend> SignalClassifier<B> {
    /// Logits, `[batch, num_classes]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(input)
    }

    pub fn forward_classification(
        &self,
        inputs: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
        class_weights: Option<Vec<f32>>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(inputs);
        let loss = CrossEntropyLossConfig::new()
            .with_weights(class_weights)
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<SignalBatch<B>, ClassificationOutput<B>> for SignalClassifier<B> {
    fn step(&self, batch: SignalBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.inputs, batch.targets, batch.class_weights);
        let grads = item.loss.backward();

        TrainOutput::new(self, grads, item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type B = NdArray;

    #[test]
    fn test_zero_init_gives_uniform_loss() {
        let device = Default::default();
        let model = ModelConfig::new(4).init::<B>(&device);
        let inputs = Tensor::<B, 2>::from_floats(TensorData::new(vec![1.0f32; 8], [2, 4]), &device);
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(vec![0i64, 2], [2]), &device);

        let output = model.forward_classification(inputs, targets, None);
        assert_eq!(output.output.dims(), [2, 3]);
        let loss = output.loss.into_scalar().elem::<f64>();
        assert!((loss - 3f64.ln()).abs() < 1e-5, "loss {}", loss);
    }
}
