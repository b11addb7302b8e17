//! Neural network architectures
//!
//! Two binary classifiers over fixed-length windows of event codes:
//! - MLP: per-position one-hot features, order is only implicit in the layout
//! - LSTM: embedded codes read in order

pub mod lstm;
pub mod mlp;

pub use lstm::{SequenceModel, SequenceModelSpec};
pub use mlp::{WindowClassifier, WindowClassifierSpec};

use crate::{Result, TrylineError};

/// Windows scored per forward pass at inference time
pub(crate) const PREDICT_CHUNK: usize = 256;

/// Check windows against the shape a model was built for
pub(crate) fn check_windows(windows: &[Vec<u32>], maxlen: usize, num_codes: usize) -> Result<()> {
    for window in windows {
        if window.len() != maxlen {
            return Err(TrylineError::WindowLength {
                expected: maxlen,
                found: window.len(),
            });
        }
        if let Some(code) = window.iter().find(|&&c| c as usize >= num_codes) {
            return Err(TrylineError::InvalidInput(format!(
                "event code {} outside vocabulary of {} codes",
                code, num_codes
            )));
        }
    }
    Ok(())
}

fn recorder_error(name: &str, err: impl std::fmt::Display) -> TrylineError {
    TrylineError::ArtifactLoad {
        name: name.to_string(),
        message: err.to_string(),
    }
}

/// Fail with `ArtifactLoad` when a stored weight does not have the shape the spec implies
fn check_shape(name: &str, layer: &str, expected: [usize; 2], found: [usize; 2]) -> Result<()> {
    if expected == found {
        return Ok(());
    }
    Err(TrylineError::ArtifactLoad {
        name: name.to_string(),
        message: format!(
            "{} weights are {:?}, manifest implies {:?}",
            layer, found, expected
        ),
    })
}
