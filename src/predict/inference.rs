//! Long-lived inference service
//!
//! Holds one loaded artifact set behind a lock. Readers take a clone of the
//! `Arc` and work on it without holding the lock, so a concurrent `reload`
//! swaps in a whole new set without disturbing in-flight calls.

use std::sync::{Arc, RwLock};

use burn::tensor::backend::Backend;

use crate::features::encoding::EventVocabulary;
use crate::predict::artifacts::{ArtifactStore, LoadedArtifacts};
use crate::{ErrorPayload, OutcomePrediction, Result};

/// Serves both models from the current artifact generation
pub struct InferenceService<B: Backend> {
    store: ArtifactStore,
    vocabulary: EventVocabulary,
    device: B::Device,
    loaded: RwLock<Option<Arc<LoadedArtifacts<B>>>>,
}

impl<B: Backend> InferenceService<B>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a service; nothing is read from disk until first use or `load`
    pub fn new(store: ArtifactStore, vocabulary: EventVocabulary, device: B::Device) -> Self {
        InferenceService {
            store,
            vocabulary,
            device,
            loaded: RwLock::new(None),
        }
    }

    /// Load the current generation and install it, replacing any previous set.
    ///
    /// On failure the previously loaded set (if any) stays in place.
    pub fn load(&self) -> Result<Arc<LoadedArtifacts<B>>> {
        let artifacts = Arc::new(self.store.load::<B>(&self.device, &self.vocabulary)?);
        let mut slot = self.loaded.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(artifacts.clone());
        Ok(artifacts)
    }

    /// Re-resolve `CURRENT` and swap to whatever it names now
    pub fn reload(&self) -> Result<Arc<LoadedArtifacts<B>>> {
        log::info!("Reloading artifacts from {}", self.store.root().display());
        self.load()
    }

    /// Drop the loaded set; the next call loads again
    pub fn unload(&self) {
        let mut slot = self.loaded.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The loaded set, loading it on first use
    pub fn artifacts(&self) -> Result<Arc<LoadedArtifacts<B>>> {
        if let Some(artifacts) = self
            .loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return Ok(artifacts.clone());
        }
        self.load()
    }

    /// Predict with both models. Fails as a whole if either model is unavailable.
    pub fn predict_outcome<S: AsRef<str>>(&self, symbols: &[S]) -> Result<OutcomePrediction> {
        let artifacts = self.artifacts()?;
        artifacts.predict(symbols, &self.device)
    }

    /// Service-boundary form: errors become a structured payload
    pub fn respond<S: AsRef<str>>(&self, symbols: &[S]) -> std::result::Result<OutcomePrediction, ErrorPayload> {
        self.predict_outcome(symbols).map_err(|e| {
            log::warn!("Prediction failed: {}", e);
            ErrorPayload::from(&e)
        })
    }
}
