//! Rugby match event analytics
//!
//! Turns a chronological log of match events into fixed-length symbolic
//! windows, mines the event patterns that precede tries, and trains two
//! classifiers (a per-position MLP and an LSTM sequence model) that predict
//! whether a run of events is about to end in a try.

pub mod data;
pub mod features;
pub mod model;
pub mod predict;
pub mod training;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Unique identifier for a match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(pub i64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Match({})", self.0)
    }
}

/// The event type that counts as a score for sequence labelling and mining
pub const SCORING_EVENT: &str = "try";

/// A single recorded match action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Store-assigned id; ignored on import
    #[serde(default)]
    pub id: i64,
    pub match_id: MatchId,
    pub team_name: String,
    #[serde(default)]
    pub player_id: Option<i64>,
    pub event_type: String,
    pub timestamp: NaiveTime,
    #[serde(default)]
    pub phase: Option<i32>,
    #[serde(default)]
    pub x_coord: Option<f32>,
    #[serde(default)]
    pub y_coord: Option<f32>,
    #[serde(default)]
    pub location_zone: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl Event {
    /// Minimal event with only the fields the sequence pipeline reads
    pub fn new(match_id: i64, team_name: &str, event_type: &str, timestamp: NaiveTime) -> Self {
        Event {
            id: 0,
            match_id: MatchId(match_id),
            team_name: team_name.to_string(),
            player_id: None,
            event_type: event_type.to_string(),
            timestamp,
            phase: None,
            x_coord: None,
            y_coord: None,
            location_zone: None,
            description: String::new(),
        }
    }

    pub fn is_try(&self) -> bool {
        self.event_type == SCORING_EVENT
    }
}

/// Output of one model for one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    /// Predicted class: 1 = a try follows, 0 = it does not
    pub label: u8,
    /// Confidence reported by the model for its answer
    pub probability: f32,
    /// Probability assigned to class 1
    pub probability_of_try: f32,
}

/// Both models' answers for one event sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomePrediction {
    pub classic: ModelPrediction,
    pub sequence_model: ModelPrediction,
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum TrylineError {
    #[error("Artifact '{name}' not found at {path}")]
    ArtifactNotFound { name: String, path: String },

    #[error("Failed to load artifact '{name}': {message}")]
    ArtifactLoad { name: String, message: String },

    #[error("Vocabulary mismatch: artifacts were trained with {expected}, running with {found}")]
    VocabularyMismatch { expected: String, found: String },

    #[error("Window length mismatch: model expects {expected} events, got {found}")]
    WindowLength { expected: usize, found: usize },

    #[error("Not enough data: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrylineError {
    /// Stable tag callers can branch on
    pub fn kind(&self) -> &'static str {
        match self {
            TrylineError::ArtifactNotFound { .. } => "artifact_not_found",
            TrylineError::ArtifactLoad { .. } => "artifact_load",
            TrylineError::VocabularyMismatch { .. } => "vocabulary_mismatch",
            TrylineError::WindowLength { .. } => "shape_mismatch",
            TrylineError::InsufficientData(_) => "insufficient_data",
            TrylineError::InvalidInput(_) => "invalid_input",
            TrylineError::Config(_) => "config",
            TrylineError::Database(_) => "database",
            TrylineError::Io(_) => "io",
            TrylineError::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, TrylineError>;

/// Error body returned across the service boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}

impl From<&TrylineError> for ErrorPayload {
    fn from(err: &TrylineError) -> Self {
        ErrorPayload {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// How windows are divided between training and held-out evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Shuffle individual windows (adjacent windows leak across the split)
    #[default]
    Random,
    /// Keep every window of a match on the same side of the split
    Grouped,
}

impl std::str::FromStr for SplitStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(SplitStrategy::Random),
            "grouped" => Ok(SplitStrategy::Grouped),
            _ => Err(format!("Unknown split: {}. Use random or grouped.", s)),
        }
    }
}

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sequence: SequenceConfig,
    pub classifier: ClassifierConfig,
    pub sequence_model: SequenceModelConfig,
    pub split: SplitConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Window length fed to both models
    pub maxlen: usize,
    /// Events looked back from each try when mining
    pub n_events: usize,
    /// Patterns shown by `analyze`
    pub top_patterns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub hidden_dims: Vec<usize>,
    pub dropout: f64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceModelConfig {
    pub embedding_dim: usize,
    pub hidden_size: usize,
    pub dense_size: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Tail fraction of the training windows held back for per-epoch validation
    pub validation_split: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    pub test_fraction: f32,
    pub seed: u64,
    #[serde(default)]
    pub strategy: SplitStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    pub artifact_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sequence: SequenceConfig {
                maxlen: 10,
                n_events: 5,
                top_patterns: 10,
            },
            classifier: ClassifierConfig {
                hidden_dims: vec![64, 32],
                dropout: 0.1,
                learning_rate: 1e-3,
                epochs: 30,
                batch_size: 64,
            },
            sequence_model: SequenceModelConfig {
                embedding_dim: 32,
                hidden_size: 32,
                dense_size: 16,
                learning_rate: 1e-3,
                epochs: 3,
                batch_size: 64,
                validation_split: 0.2,
            },
            split: SplitConfig {
                test_fraction: 0.2,
                seed: 42,
                strategy: SplitStrategy::Random,
            },
            data: DataConfig {
                database_path: "data/tryline.db".to_string(),
                artifact_dir: "model/artifacts".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrylineError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| TrylineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TrylineError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sequence.maxlen == 0 {
            return Err(TrylineError::Config("sequence.maxlen must be at least 1".into()));
        }
        if self.sequence.n_events == 0 {
            return Err(TrylineError::Config("sequence.n_events must be at least 1".into()));
        }
        if !(self.split.test_fraction > 0.0 && self.split.test_fraction < 1.0) {
            return Err(TrylineError::Config(format!(
                "split.test_fraction must be in (0, 1), got {}",
                self.split.test_fraction
            )));
        }
        if !(0.0..1.0).contains(&self.sequence_model.validation_split) {
            return Err(TrylineError::Config(format!(
                "sequence_model.validation_split must be in [0, 1), got {}",
                self.sequence_model.validation_split
            )));
        }
        if self.classifier.hidden_dims.is_empty() || self.classifier.hidden_dims.contains(&0) {
            return Err(TrylineError::Config(
                "classifier.hidden_dims needs at least one non-zero layer".into(),
            ));
        }
        if self.classifier.batch_size == 0 || self.sequence_model.batch_size == 0 {
            return Err(TrylineError::Config("batch sizes must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sequence.maxlen, 10);
        assert_eq!(parsed.split.strategy, SplitStrategy::Random);
        assert_eq!(parsed.classifier.hidden_dims, vec![64, 32]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.sequence.maxlen = 0;
        assert!(matches!(config.validate(), Err(TrylineError::Config(_))));

        let mut config = Config::default();
        config.split.test_fraction = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_error_payload_carries_kind() {
        let err = TrylineError::ArtifactNotFound {
            name: "sequence_model".into(),
            path: "model/x".into(),
        };
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.kind, "artifact_not_found");
        assert!(payload.message.contains("sequence_model"));
    }

    #[test]
    fn test_split_strategy_parse() {
        assert_eq!("grouped".parse::<SplitStrategy>().unwrap(), SplitStrategy::Grouped);
        assert!("nope".parse::<SplitStrategy>().is_err());
    }
}
