//! Prediction and inference
//!
//! Versioned artifact storage and the service that serves both models from it.

pub mod artifacts;
pub mod inference;

pub use artifacts::{ArtifactManifest, ArtifactStore, LoadedArtifacts};
pub use inference::InferenceService;
