//! Training loop for the window classifier

use burn::data::dataloader::DataLoaderBuilder;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};

use crate::data::dataset::{WindowBatch, WindowBatcher, WindowDataset};
use crate::model::mlp::{WindowClassifier, WindowClassifierSpec};
use crate::training::metrics::{Metrics, TrainingHistory};
use crate::{ClassifierConfig, Result, TrylineError};

/// Binary cross-entropy on logits, probabilities clamped away from 0 and 1
pub fn binary_cross_entropy<B: AutodiffBackend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let probs = sigmoid(logits);
    let eps = 1e-7;
    let probs_clamped = probs.clamp(eps, 1.0 - eps);
    let loss = targets.clone().neg() * probs_clamped.clone().log()
        - (targets.neg() + 1.0) * (probs_clamped.neg() + 1.0).log();
    loss.mean()
}

/// Trainer for the window classifier
pub struct ClassifierTrainer<B: AutodiffBackend> {
    model: WindowClassifier<B>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, WindowClassifier<B>, B>,
    config: ClassifierConfig,
    seed: u64,
    device: B::Device,
}

impl<B: AutodiffBackend> ClassifierTrainer<B> {
    pub fn new(device: B::Device, spec: &WindowClassifierSpec, config: ClassifierConfig, seed: u64) -> Self {
        ClassifierTrainer {
            model: WindowClassifier::new(&device, spec),
            optimizer: AdamConfig::new().init(),
            config,
            seed,
            device,
        }
    }

    /// Fit on every window of `train_dataset`
    pub fn train(mut self, train_dataset: WindowDataset) -> Result<(WindowClassifier<B>, TrainingHistory)> {
        if train_dataset.is_empty() {
            return Err(TrylineError::InsufficientData(
                "no windows to train the classifier on".into(),
            ));
        }

        let batcher = WindowBatcher::<B>::new(
            self.device.clone(),
            train_dataset.maxlen(),
            train_dataset.num_codes(),
        );
        let train_loader = DataLoaderBuilder::new(batcher)
            .batch_size(self.config.batch_size.min(train_dataset.len()))
            .shuffle(self.seed)
            .build(train_dataset);

        let mut history = TrainingHistory::new();
        let epochs = self.config.epochs;
        log::info!("Starting classifier training for {} epochs", epochs);

        for epoch in 0..epochs {
            let train_metrics = self.train_epoch(train_loader.iter());
            history.record_epoch(&train_metrics, None);

            if epoch % 10 == 0 || epoch + 1 == epochs {
                log::info!("Epoch {}/{}: {}", epoch + 1, epochs, train_metrics);
            }
        }

        Ok((self.model, history))
    }

    fn train_epoch(&mut self, loader: impl Iterator<Item = WindowBatch<B>>) -> Metrics {
        let mut metrics = Metrics::new();

        for batch in loader {
            let batch_size = batch.labels.dims()[0];
            let targets = batch.labels.clone().unsqueeze_dim(1);

            let logits = self.model.forward(batch.one_hot);
            let loss = binary_cross_entropy(logits.clone(), targets.clone());
            let loss_val: f32 = loss.clone().into_scalar().elem();
            let correct = count_correct(logits, targets);

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            metrics.update(loss_val, correct, batch_size);
        }

        metrics
    }
}

fn count_correct<B: AutodiffBackend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> usize {
    let probs = sigmoid(logits).into_data();
    let targets = targets.into_data();
    probs
        .iter::<f32>()
        .zip(targets.iter::<f32>())
        .filter(|(p, t)| (*p >= 0.5) == (*t >= 0.5))
        .count()
}
