//! Versioned on-disk artifact sets
//!
//! Layout under the artifact root:
//!
//! ```text
//! CURRENT                      name of the active generation
//! <generation>/manifest.json
//! <generation>/classifier.mpk
//! <generation>/sequence_model.mpk
//! ```
//!
//! A generation directory is written completely before `CURRENT` is swapped
//! to it by rename, so a reader resolving `CURRENT` never sees a half-written set.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::encoding::EventVocabulary;
use crate::features::windows::encode_window;
use crate::model::lstm::{SequenceModel, SequenceModelSpec};
use crate::model::mlp::{WindowClassifier, WindowClassifierSpec};
use crate::training::trainer::{TrainedModels, TrainingReport};
use crate::{ModelPrediction, OutcomePrediction, Result, TrylineError};

pub const CURRENT_FILE: &str = "CURRENT";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const CLASSIFIER_ARTIFACT: &str = "classifier";
pub const SEQUENCE_MODEL_ARTIFACT: &str = "sequence_model";

/// Everything needed to rebuild and validate an artifact set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub generation: String,
    pub vocabulary_version: String,
    pub vocabulary_fingerprint: String,
    pub symbols: Vec<String>,
    pub maxlen: usize,
    pub classifier: WindowClassifierSpec,
    pub sequence_model: SequenceModelSpec,
    pub created_at: DateTime<Utc>,
    pub windows: usize,
    pub positives: usize,
    pub classifier_accuracy: f64,
    pub sequence_model_accuracy: f64,
}

impl ArtifactManifest {
    fn vocabulary_label(&self) -> String {
        let prefix_len = self.vocabulary_fingerprint.len().min(12);
        format!(
            "{}@{}",
            self.vocabulary_version,
            &self.vocabulary_fingerprint[..prefix_len]
        )
    }
}

/// A complete, validated artifact set held in memory
#[derive(Debug)]
pub struct LoadedArtifacts<B: Backend> {
    pub manifest: ArtifactManifest,
    pub vocabulary: EventVocabulary,
    pub classifier: WindowClassifier<B>,
    pub sequence_model: SequenceModel<B>,
}

impl<B: Backend> LoadedArtifacts<B> {
    pub fn maxlen(&self) -> usize {
        self.manifest.maxlen
    }

    /// Encode, pad or truncate, and run both models on one raw symbol sequence
    pub fn predict<S: AsRef<str>>(&self, symbols: &[S], device: &B::Device) -> Result<OutcomePrediction> {
        let window = vec![encode_window(symbols, &self.vocabulary, self.maxlen())];

        let classic = single(self.classifier.predict_windows(&window, device)?, CLASSIFIER_ARTIFACT)?;
        let sequence_model = single(
            self.sequence_model.predict_windows(&window, device)?,
            SEQUENCE_MODEL_ARTIFACT,
        )?;

        Ok(OutcomePrediction {
            classic,
            sequence_model,
        })
    }
}

fn single(predictions: Vec<ModelPrediction>, name: &str) -> Result<ModelPrediction> {
    predictions.into_iter().next().ok_or_else(|| TrylineError::ArtifactLoad {
        name: name.to_string(),
        message: "model returned no prediction".to_string(),
    })
}

/// Directory of artifact generations with an atomically swapped `CURRENT` pointer
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        ArtifactStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a new generation and make it current. Returns the generation name.
    pub fn publish<B: Backend>(
        &self,
        models: &TrainedModels<B>,
        vocabulary: &EventVocabulary,
        report: &TrainingReport,
    ) -> Result<String>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let created_at = Utc::now();
        let (generation, dir) = self.create_generation_dir(&created_at)?;

        models.classifier.save(&dir.join(CLASSIFIER_ARTIFACT))?;
        models.sequence_model.save(&dir.join(SEQUENCE_MODEL_ARTIFACT))?;

        let manifest = ArtifactManifest {
            generation: generation.clone(),
            vocabulary_version: vocabulary.version().to_string(),
            vocabulary_fingerprint: vocabulary.fingerprint(),
            symbols: vocabulary.symbols().to_vec(),
            maxlen: models.classifier_spec.maxlen,
            classifier: models.classifier_spec.clone(),
            sequence_model: models.sequence_spec.clone(),
            created_at,
            windows: report.windows,
            positives: report.positives,
            classifier_accuracy: report.classifier.accuracy,
            sequence_model_accuracy: report.sequence_model.accuracy,
        };
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

        self.set_current(&generation)?;
        log::info!("Published artifact generation {} to {}", generation, dir.display());
        Ok(generation)
    }

    fn create_generation_dir(&self, created_at: &DateTime<Utc>) -> Result<(String, PathBuf)> {
        fs::create_dir_all(&self.root)?;
        let base = created_at.format("%Y%m%dT%H%M%S%3fZ").to_string();

        let mut attempt = 0;
        loop {
            let generation = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };
            let dir = self.root.join(&generation);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((generation, dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Point `CURRENT` at `generation` via write-then-rename
    pub fn set_current(&self, generation: &str) -> Result<()> {
        if !self.root.join(generation).join(MANIFEST_FILE).is_file() {
            return Err(TrylineError::ArtifactNotFound {
                name: MANIFEST_FILE.to_string(),
                path: self.root.join(generation).display().to_string(),
            });
        }
        let tmp = self.root.join(format!("{}.tmp", CURRENT_FILE));
        fs::write(&tmp, generation)?;
        fs::rename(&tmp, self.root.join(CURRENT_FILE))?;
        Ok(())
    }

    /// Name of the active generation
    pub fn current_generation(&self) -> Result<String> {
        let path = self.root.join(CURRENT_FILE);
        match fs::read_to_string(&path) {
            Ok(name) if !name.trim().is_empty() => Ok(name.trim().to_string()),
            Ok(_) => Err(TrylineError::ArtifactLoad {
                name: CURRENT_FILE.to_string(),
                message: format!("{} is empty", path.display()),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TrylineError::ArtifactNotFound {
                name: CURRENT_FILE.to_string(),
                path: path.display().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Generations on disk, oldest first
    pub fn generations(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join(MANIFEST_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn read_manifest(&self, generation: &str) -> Result<ArtifactManifest> {
        let path = self.root.join(generation).join(MANIFEST_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TrylineError::ArtifactNotFound {
                    name: MANIFEST_FILE.to_string(),
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| TrylineError::ArtifactLoad {
            name: MANIFEST_FILE.to_string(),
            message: e.to_string(),
        })
    }

    /// Load the current generation, checking it against the running vocabulary.
    ///
    /// Either both models load or the call fails; there is no partial result.
    pub fn load<B: Backend>(&self, device: &B::Device, vocabulary: &EventVocabulary) -> Result<LoadedArtifacts<B>>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let generation = self.current_generation()?;
        let dir = self.root.join(&generation);
        let manifest = self.read_manifest(&generation)?;

        if manifest.vocabulary_fingerprint != vocabulary.fingerprint() {
            return Err(TrylineError::VocabularyMismatch {
                expected: manifest.vocabulary_label(),
                found: vocabulary.describe(),
            });
        }
        if manifest.classifier.maxlen != manifest.maxlen || manifest.sequence_model.maxlen != manifest.maxlen {
            return Err(TrylineError::ArtifactLoad {
                name: MANIFEST_FILE.to_string(),
                message: format!(
                    "window length disagrees: manifest {}, classifier {}, sequence model {}",
                    manifest.maxlen, manifest.classifier.maxlen, manifest.sequence_model.maxlen
                ),
            });
        }

        let classifier_path = model_path(&dir, CLASSIFIER_ARTIFACT)?;
        let sequence_path = model_path(&dir, SEQUENCE_MODEL_ARTIFACT)?;

        let classifier = WindowClassifier::load(device, &classifier_path, &manifest.classifier)?;
        let sequence_model = SequenceModel::load(device, &sequence_path, &manifest.sequence_model)?;

        log::info!(
            "Loaded artifact generation {} (vocabulary {}, maxlen {})",
            generation,
            vocabulary.describe(),
            manifest.maxlen
        );

        Ok(LoadedArtifacts {
            manifest,
            vocabulary: vocabulary.clone(),
            classifier,
            sequence_model,
        })
    }
}

/// Recorder path for a model, failing with `ArtifactNotFound` if its file is missing
fn model_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let stem = dir.join(name);
    let file = stem.with_extension("mpk");
    if file.is_file() {
        Ok(stem)
    } else {
        Err(TrylineError::ArtifactNotFound {
            name: name.to_string(),
            path: file.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::metrics::{ClassificationReport, TrainingHistory};
    use crate::{SequenceModelConfig, SplitStrategy};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn models(maxlen: usize, vocab: &EventVocabulary) -> TrainedModels<TestBackend> {
        let device = Default::default();
        let classifier_spec = WindowClassifierSpec {
            maxlen,
            num_codes: vocab.num_codes(),
            hidden_dims: vec![4],
            dropout: 0.0,
        };
        let seq_config = SequenceModelConfig {
            embedding_dim: 4,
            hidden_size: 4,
            dense_size: 4,
            ..crate::Config::default().sequence_model
        };
        let sequence_spec = SequenceModelSpec::new(&seq_config, maxlen, vocab.embedding_size());
        TrainedModels {
            classifier: WindowClassifier::new(&device, &classifier_spec),
            classifier_spec,
            sequence_model: SequenceModel::new(&device, &sequence_spec),
            sequence_spec,
        }
    }

    fn report() -> TrainingReport {
        TrainingReport {
            windows: 10,
            positives: 2,
            train_windows: 8,
            test_windows: 2,
            sequence_windows: 10,
            split: SplitStrategy::Random,
            classifier: ClassificationReport::default(),
            sequence_model: ClassificationReport::default(),
            classifier_history: TrainingHistory::new(),
            sequence_history: TrainingHistory::new(),
        }
    }

    #[test]
    fn test_publish_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let vocab = EventVocabulary::rugby();

        let generation = store.publish(&models(4, &vocab), &vocab, &report()).unwrap();
        assert_eq!(store.current_generation().unwrap(), generation);
        assert!(dir.path().join(&generation).join("classifier.mpk").is_file());
        assert!(!dir.path().join("CURRENT.tmp").exists());

        let loaded = store.load::<TestBackend>(&Default::default(), &vocab).unwrap();
        assert_eq!(loaded.maxlen(), 4);
        assert_eq!(loaded.manifest.symbols.len(), 50);

        let prediction = loaded.predict(&["kick", "pass"], &Default::default()).unwrap();
        assert!((0.0..=1.0).contains(&prediction.classic.probability));
        assert!((0.0..=1.0).contains(&prediction.sequence_model.probability));
    }

    #[test]
    fn test_second_publish_swaps_current() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let vocab = EventVocabulary::rugby();

        let first = store.publish(&models(4, &vocab), &vocab, &report()).unwrap();
        let second = store.publish(&models(6, &vocab), &vocab, &report()).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.current_generation().unwrap(), second);
        assert_eq!(store.generations().unwrap().len(), 2);

        let loaded = store.load::<TestBackend>(&Default::default(), &vocab).unwrap();
        assert_eq!(loaded.maxlen(), 6);

        store.set_current(&first).unwrap();
        let loaded = store.load::<TestBackend>(&Default::default(), &vocab).unwrap();
        assert_eq!(loaded.maxlen(), 4);
    }

    #[test]
    fn test_missing_current_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let err = store
            .load::<TestBackend>(&Default::default(), &EventVocabulary::rugby())
            .unwrap_err();
        assert_eq!(err.kind(), "artifact_not_found");
    }

    #[test]
    fn test_missing_model_file_fails_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let vocab = EventVocabulary::rugby();
        let generation = store.publish(&models(4, &vocab), &vocab, &report()).unwrap();

        fs::remove_file(dir.path().join(&generation).join("sequence_model.mpk")).unwrap();
        match store.load::<TestBackend>(&Default::default(), &vocab) {
            Err(TrylineError::ArtifactNotFound { name, .. }) => assert_eq!(name, "sequence_model"),
            other => panic!("expected ArtifactNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_vocabulary_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let vocab = EventVocabulary::rugby();
        store.publish(&models(4, &vocab), &vocab, &report()).unwrap();

        let reordered = EventVocabulary::new("rugby-events-v1", &["kick", "try", "pass"]).unwrap();
        let err = store.load::<TestBackend>(&Default::default(), &reordered).unwrap_err();
        assert!(matches!(err, TrylineError::VocabularyMismatch { .. }));
    }

    #[test]
    fn test_corrupt_manifest_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let vocab = EventVocabulary::rugby();
        let generation = store.publish(&models(4, &vocab), &vocab, &report()).unwrap();

        fs::write(dir.path().join(&generation).join(MANIFEST_FILE), "{not json").unwrap();
        let err = store.load::<TestBackend>(&Default::default(), &vocab).unwrap_err();
        assert_eq!(err.kind(), "artifact_load");
    }

    fn rewrite_manifest(dir: &Path, generation: &str, edit: impl FnOnce(&mut ArtifactManifest)) {
        let path = dir.join(generation).join(MANIFEST_FILE);
        let mut manifest: ArtifactManifest =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        edit(&mut manifest);
        fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
    }

    #[test]
    fn test_manifest_maxlen_disagreement() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let vocab = EventVocabulary::rugby();
        let generation = store.publish(&models(4, &vocab), &vocab, &report()).unwrap();

        rewrite_manifest(dir.path(), &generation, |m| m.sequence_model.maxlen = 5);
        match store.load::<TestBackend>(&Default::default(), &vocab) {
            Err(TrylineError::ArtifactLoad { name, message }) => {
                assert_eq!(name, MANIFEST_FILE);
                assert!(message.contains("window length"));
            }
            other => panic!("expected ArtifactLoad, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_manifest_shape_disagreeing_with_weights() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let vocab = EventVocabulary::rugby();
        let generation = store.publish(&models(4, &vocab), &vocab, &report()).unwrap();

        rewrite_manifest(dir.path(), &generation, |m| m.classifier.hidden_dims = vec![8]);
        match store.load::<TestBackend>(&Default::default(), &vocab) {
            Err(TrylineError::ArtifactLoad { name, .. }) => assert_eq!(name, "classifier"),
            other => panic!("expected ArtifactLoad, got {:?}", other.map(|_| ())),
        }

        rewrite_manifest(dir.path(), &generation, |m| {
            m.classifier.hidden_dims = vec![4];
            m.sequence_model.embedding_dim = 6;
        });
        match store.load::<TestBackend>(&Default::default(), &vocab) {
            Err(TrylineError::ArtifactLoad { name, .. }) => assert_eq!(name, "sequence_model"),
            other => panic!("expected ArtifactLoad, got {:?}", other.map(|_| ())),
        }
    }
}
