//! Model training
//!
//! Training loops for both models, metrics tracking, and the end-to-end pipeline.

pub mod lstm_trainer;
pub mod metrics;
pub mod mlp_trainer;
pub mod trainer;

pub use lstm_trainer::SequenceTrainer;
pub use metrics::{ClassificationReport, Metrics, TrainingHistory};
pub use mlp_trainer::ClassifierTrainer;
pub use trainer::{TrainedModels, TrainingPipeline, TrainingReport};
