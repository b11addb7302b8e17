//! Training loop for the LSTM sequence model

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor};

use crate::data::dataset::{WindowBatch, WindowBatcher, WindowDataset};
use crate::model::lstm::{SequenceModel, SequenceModelSpec};
use crate::training::metrics::{Metrics, TrainingHistory};
use crate::{Result, SequenceModelConfig, TrylineError};

/// Trainer for the sequence model
pub struct SequenceTrainer<B: AutodiffBackend> {
    model: SequenceModel<B>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, SequenceModel<B>, B>,
    config: SequenceModelConfig,
    seed: u64,
    device: B::Device,
}

impl<B: AutodiffBackend> SequenceTrainer<B> {
    pub fn new(device: B::Device, spec: &SequenceModelSpec, config: SequenceModelConfig, seed: u64) -> Self {
        SequenceTrainer {
            model: SequenceModel::new(&device, spec),
            optimizer: AdamConfig::new().init(),
            config,
            seed,
            device,
        }
    }

    /// Fit on `dataset`, holding back its last `validation_split` fraction
    /// for per-epoch validation
    pub fn train(mut self, dataset: WindowDataset) -> Result<(SequenceModel<B>, TrainingHistory)> {
        let (train_dataset, val_dataset) = dataset.split_tail(self.config.validation_split);
        if train_dataset.is_empty() {
            return Err(TrylineError::InsufficientData(
                "no windows to train the sequence model on".into(),
            ));
        }
        log::info!(
            "Sequence model: {} training windows, {} validation windows",
            train_dataset.len(),
            val_dataset.len()
        );

        let maxlen = train_dataset.maxlen();
        let num_codes = train_dataset.num_codes();

        let train_loader = DataLoaderBuilder::new(WindowBatcher::<B>::new(self.device.clone(), maxlen, num_codes))
            .batch_size(self.config.batch_size.min(train_dataset.len()))
            .shuffle(self.seed)
            .build(train_dataset);

        let val_loader = (!val_dataset.is_empty()).then(|| {
            DataLoaderBuilder::new(WindowBatcher::<B::InnerBackend>::new(self.device.clone(), maxlen, num_codes))
                .batch_size(self.config.batch_size.min(val_dataset.len()))
                .build(val_dataset)
        });

        let mut history = TrainingHistory::new();
        let epochs = self.config.epochs;
        log::info!("Starting sequence model training for {} epochs", epochs);

        for epoch in 0..epochs {
            let train_metrics = self.train_epoch(train_loader.iter());
            let val_metrics = val_loader
                .as_ref()
                .map(|loader| validate_epoch(&self.model.valid(), loader.iter()));
            history.record_epoch(&train_metrics, val_metrics.as_ref());

            match &val_metrics {
                Some(val) => log::info!(
                    "Epoch {}/{}: Train: {} | Val: {}",
                    epoch + 1,
                    epochs,
                    train_metrics,
                    val
                ),
                None => log::info!("Epoch {}/{}: Train: {}", epoch + 1, epochs, train_metrics),
            }
        }

        Ok((self.model, history))
    }

    fn train_epoch(&mut self, loader: impl Iterator<Item = WindowBatch<B>>) -> Metrics {
        let mut metrics = Metrics::new();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);

        for batch in loader {
            let batch_size = batch.targets.dims()[0];

            let logits = self.model.forward(batch.codes);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
            let loss_val: f32 = loss.clone().into_scalar().elem();
            let correct = count_correct(logits, batch.targets);

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            metrics.update(loss_val, correct, batch_size);
        }

        metrics
    }
}

fn validate_epoch<B: Backend>(model: &SequenceModel<B>, loader: impl Iterator<Item = WindowBatch<B>>) -> Metrics {
    let mut metrics = Metrics::new();

    for batch in loader {
        let batch_size = batch.targets.dims()[0];
        let loss_fn = CrossEntropyLossConfig::new().init(&batch.codes.device());

        let logits = model.forward(batch.codes);
        let loss_val: f32 = loss_fn
            .forward(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        metrics.update(loss_val, count_correct(logits, batch.targets), batch_size);
    }

    metrics
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).into_data();
    let targets = targets.into_data();
    predicted
        .iter::<i64>()
        .zip(targets.iter::<i64>())
        .filter(|(p, t)| p == t)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::windows::ExtractedWindows;
    use crate::MatchId;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn dataset(n: usize) -> WindowDataset {
        let mut extracted = ExtractedWindows::default();
        for i in 0..n {
            let positive = i % 3 == 0;
            extracted
                .windows
                .push(if positive { vec![0, 4, 5, 6] } else { vec![1, 2, 3, 1] });
            extracted.labels.push(u8::from(positive));
            extracted.match_ids.push(MatchId(1));
        }
        WindowDataset::from_windows(extracted, 4, 8).unwrap()
    }

    fn config(epochs: usize) -> SequenceModelConfig {
        SequenceModelConfig {
            embedding_dim: 8,
            hidden_size: 8,
            dense_size: 4,
            learning_rate: 1e-2,
            epochs,
            batch_size: 16,
            validation_split: 0.2,
        }
    }

    #[test]
    fn test_records_train_and_validation() {
        let device = Default::default();
        let spec = SequenceModelSpec::new(&config(3), 4, 9);
        let trainer = SequenceTrainer::<TestBackend>::new(device, &spec, config(3), 42);

        let (_, history) = trainer.train(dataset(30)).unwrap();
        assert_eq!(history.epochs(), 3);
        assert_eq!(history.val_losses.len(), 3);
    }

    #[test]
    fn test_loss_decreases() {
        let device = Default::default();
        let spec = SequenceModelSpec::new(&config(30), 4, 9);
        let trainer = SequenceTrainer::<TestBackend>::new(device, &spec, config(30), 42);

        let (model, history) = trainer.train(dataset(60)).unwrap();
        assert!(history.train_losses[29] < history.train_losses[0]);

        let preds = model
            .valid()
            .predict_windows(&[vec![0, 4, 5, 6], vec![1, 2, 3, 1]], &Default::default())
            .unwrap();
        assert_eq!(preds[0].label, 1);
        assert_eq!(preds[1].label, 0);
    }

    #[test]
    fn test_single_window_has_no_validation() {
        let device = Default::default();
        let spec = SequenceModelSpec::new(&config(1), 4, 9);
        let trainer = SequenceTrainer::<TestBackend>::new(device, &spec, config(1), 42);

        let (_, history) = trainer.train(dataset(1)).unwrap();
        assert_eq!(history.epochs(), 1);
        assert!(history.val_losses.is_empty());
    }
}
