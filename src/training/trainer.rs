//! End-to-end training run: extract windows, split, fit both models, evaluate

use std::fmt;

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};

use crate::data::dataset::WindowDataset;
use crate::features::encoding::EventVocabulary;
use crate::features::windows::SequenceExtractor;
use crate::model::lstm::{SequenceModel, SequenceModelSpec};
use crate::model::mlp::{WindowClassifier, WindowClassifierSpec};
use crate::training::lstm_trainer::SequenceTrainer;
use crate::training::metrics::{ClassificationReport, TrainingHistory};
use crate::training::mlp_trainer::ClassifierTrainer;
use crate::{Config, Event, Result, SplitStrategy, TrylineError};

/// Both fitted models, ready for inference or publishing
#[derive(Debug)]
pub struct TrainedModels<B: Backend> {
    pub classifier: WindowClassifier<B>,
    pub classifier_spec: WindowClassifierSpec,
    pub sequence_model: SequenceModel<B>,
    pub sequence_spec: SequenceModelSpec,
}

/// What a training run saw and how the models scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub windows: usize,
    pub positives: usize,
    pub train_windows: usize,
    pub test_windows: usize,
    /// Windows handed to the sequence model trainer, its validation tail included
    pub sequence_windows: usize,
    pub split: SplitStrategy,
    /// Classifier scored on the held-out windows
    pub classifier: ClassificationReport,
    /// Sequence model scored on every extracted window, training ones included
    pub sequence_model: ClassificationReport,
    pub classifier_history: TrainingHistory,
    pub sequence_history: TrainingHistory,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Windows: {} ({} followed by a try), train={}, test={}, split={:?}",
            self.windows, self.positives, self.train_windows, self.test_windows, self.split
        )?;
        writeln!(f)?;
        writeln!(f, "Classifier (held-out windows):")?;
        write!(f, "{}", self.classifier)?;
        writeln!(f)?;
        writeln!(
            f,
            "Sequence model accuracy (all windows): {:.2}%",
            self.sequence_model.accuracy * 100.0
        )?;
        writeln!(f, "Sequence model fitted on {} windows", self.sequence_windows)
    }
}

/// Runs a full training pass against one vocabulary and config
pub struct TrainingPipeline<'a> {
    config: &'a Config,
    vocabulary: &'a EventVocabulary,
}

impl<'a> TrainingPipeline<'a> {
    pub fn new(config: &'a Config, vocabulary: &'a EventVocabulary) -> Self {
        TrainingPipeline { config, vocabulary }
    }

    /// Train both models on `events`.
    ///
    /// Fails with `InsufficientData` when no window can be formed, so callers
    /// can tell "nothing to learn from" apart from a poor model.
    pub fn run<B: AutodiffBackend>(
        &self,
        events: &[Event],
        device: &B::Device,
    ) -> Result<(TrainedModels<B::InnerBackend>, TrainingReport)> {
        let maxlen = self.config.sequence.maxlen;
        let extractor = SequenceExtractor::new(maxlen)?;
        let extracted = extractor.extract(events, self.vocabulary);
        if extracted.is_empty() {
            return Err(TrylineError::InsufficientData(format!(
                "{} events produced no windows of length {} with a following event",
                events.len(),
                maxlen
            )));
        }

        let dataset = WindowDataset::from_windows(extracted, maxlen, self.vocabulary.num_codes())?;
        log::info!(
            "Extracted {} windows ({} positive) with maxlen={}",
            dataset.len(),
            dataset.positives(),
            maxlen
        );

        let split = &self.config.split;
        let (train, test) = dataset.split(split.test_fraction, split.strategy, split.seed);
        // a single window cannot be split; score on what was trained
        let test = if test.is_empty() { train.clone() } else { test };

        let classifier_spec =
            WindowClassifierSpec::new(&self.config.classifier, maxlen, self.vocabulary.num_codes());
        let (classifier, classifier_history) = ClassifierTrainer::<B>::new(
            device.clone(),
            &classifier_spec,
            self.config.classifier.clone(),
            split.seed,
        )
        .train(train.clone())?;
        let classifier = classifier.valid();

        let sequence_spec = SequenceModelSpec::new(
            &self.config.sequence_model,
            maxlen,
            self.vocabulary.embedding_size(),
        );
        let (sequence_model, sequence_history) = SequenceTrainer::<B>::new(
            device.clone(),
            &sequence_spec,
            self.config.sequence_model.clone(),
            split.seed,
        )
        .train(dataset.clone())?;
        let sequence_model = sequence_model.valid();

        let classifier_report = ClassificationReport::from_predictions(
            &labels_of(classifier.predict_windows(&test.windows(), device)?),
            &test.labels(),
        );
        let sequence_report = ClassificationReport::from_predictions(
            &labels_of(sequence_model.predict_windows(&dataset.windows(), device)?),
            &dataset.labels(),
        );
        log::info!(
            "Classifier held-out accuracy: {:.2}%, sequence model accuracy: {:.2}%",
            classifier_report.accuracy * 100.0,
            sequence_report.accuracy * 100.0
        );

        let report = TrainingReport {
            windows: dataset.len(),
            positives: dataset.positives(),
            train_windows: train.len(),
            test_windows: test.len(),
            sequence_windows: dataset.len(),
            split: split.strategy,
            classifier: classifier_report,
            sequence_model: sequence_report,
            classifier_history,
            sequence_history,
        };

        Ok((
            TrainedModels {
                classifier,
                classifier_spec,
                sequence_model,
                sequence_spec,
            },
            report,
        ))
    }
}

fn labels_of(predictions: Vec<crate::ModelPrediction>) -> Vec<u8> {
    predictions.into_iter().map(|p| p.label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use chrono::NaiveTime;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn t(sec: u32) -> NaiveTime {
        NaiveTime::from_num_seconds_from_midnight_opt(sec, 0).unwrap()
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.sequence.maxlen = 3;
        config.classifier.hidden_dims = vec![8];
        config.classifier.epochs = 2;
        config.sequence_model.embedding_dim = 4;
        config.sequence_model.hidden_size = 4;
        config.sequence_model.dense_size = 4;
        config.sequence_model.epochs = 1;
        config
    }

    fn log() -> Vec<Event> {
        let cycle = ["kickoff", "carry", "ruck", "pass", "line_break", "try"];
        let mut events = Vec::new();
        for m in 1..=3 {
            for (i, ty) in cycle.iter().cycle().take(24).enumerate() {
                events.push(Event::new(m, "Reds", ty, t(i as u32 * 10)));
            }
        }
        events
    }

    #[test]
    fn test_run_produces_models_and_report() {
        let config = small_config();
        let vocab = EventVocabulary::rugby();
        let device = Default::default();

        let (models, report) = TrainingPipeline::new(&config, &vocab)
            .run::<TestBackend>(&log(), &device)
            .unwrap();

        assert_eq!(report.windows, 3 * (24 - 3));
        assert_eq!(report.train_windows + report.test_windows, report.windows);
        assert_eq!(report.sequence_model.support(), report.windows);
        assert_eq!(report.classifier.support(), report.test_windows);
        assert_eq!(report.classifier_history.epochs(), 2);
        assert_eq!(report.sequence_history.epochs(), 1);
        assert_eq!(models.classifier.maxlen(), 3);
        assert_eq!(models.sequence_model.maxlen(), 3);
    }

    #[test]
    fn test_sequence_model_sees_every_window() {
        let mut config = small_config();
        config.split.strategy = SplitStrategy::Grouped;
        let vocab = EventVocabulary::rugby();

        let (_, report) = TrainingPipeline::new(&config, &vocab)
            .run::<TestBackend>(&log(), &Default::default())
            .unwrap();

        // the classifier's held-out match is still fed to the sequence model
        assert!(report.test_windows > 0);
        assert!(report.train_windows < report.windows);
        assert_eq!(report.sequence_windows, report.windows);
    }

    #[test]
    fn test_too_few_events_is_insufficient_data() {
        let config = small_config();
        let vocab = EventVocabulary::rugby();
        let events = vec![
            Event::new(1, "Reds", "pass", t(1)),
            Event::new(1, "Reds", "try", t(2)),
        ];
        let result = TrainingPipeline::new(&config, &vocab).run::<TestBackend>(&events, &Default::default());
        assert!(matches!(result, Err(TrylineError::InsufficientData(_))));
    }
}
