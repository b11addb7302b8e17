//! Feed-forward window classifier
//!
//! Architecture: one-hot window [maxlen * num_codes] → Hidden(64) → ReLU → Dropout
//!                                                  → Hidden(32) → ReLU → Dropout
//!                                                  → logit(1)

use std::path::Path;

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::record::{FullPrecisionSettings, Recorder};
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::data::dataset::one_hot_tensor;
use crate::{ClassifierConfig, ModelPrediction, Result};

/// Shape of a window classifier, stored alongside its weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowClassifierSpec {
    pub maxlen: usize,
    /// Distinct codes per position, padding and unknown included
    pub num_codes: usize,
    pub hidden_dims: Vec<usize>,
    pub dropout: f64,
}

impl WindowClassifierSpec {
    pub fn new(config: &ClassifierConfig, maxlen: usize, num_codes: usize) -> Self {
        WindowClassifierSpec {
            maxlen,
            num_codes,
            hidden_dims: config.hidden_dims.clone(),
            dropout: config.dropout,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.maxlen * self.num_codes
    }
}

/// A single hidden layer block: Linear → ReLU → Dropout
#[derive(Module, Debug)]
pub struct HiddenBlock<B: Backend> {
    linear: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> HiddenBlock<B> {
    pub fn new(device: &B::Device, in_dim: usize, out_dim: usize, dropout: f64) -> Self {
        HiddenBlock {
            linear: LinearConfig::new(in_dim, out_dim).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.linear.forward(x);
        let x = relu(x);
        self.dropout.forward(x)
    }
}

/// Binary classifier over one-hot encoded windows
#[derive(Module, Debug)]
pub struct WindowClassifier<B: Backend> {
    hidden: Vec<HiddenBlock<B>>,
    output: Linear<B>,
    maxlen: usize,
    num_codes: usize,
}

impl<B: Backend> WindowClassifier<B> {
    pub fn new(device: &B::Device, spec: &WindowClassifierSpec) -> Self {
        let mut hidden = Vec::with_capacity(spec.hidden_dims.len());
        let mut in_dim = spec.input_dim();
        for &out_dim in &spec.hidden_dims {
            hidden.push(HiddenBlock::new(device, in_dim, out_dim, spec.dropout));
            in_dim = out_dim;
        }

        WindowClassifier {
            hidden,
            output: LinearConfig::new(in_dim, 1).init(device),
            maxlen: spec.maxlen,
            num_codes: spec.num_codes,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `one_hot` - Window features [batch, maxlen * num_codes]
    ///
    /// # Returns
    /// Try logit [batch, 1]; apply sigmoid for P(try follows)
    pub fn forward(&self, one_hot: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .hidden
            .iter()
            .fold(one_hot, |x, block| block.forward(x));
        self.output.forward(x)
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    /// Score encoded windows. Label is 1 when P(try) >= 0.5.
    pub fn predict_windows(&self, windows: &[Vec<u32>], device: &B::Device) -> Result<Vec<ModelPrediction>> {
        super::check_windows(windows, self.maxlen, self.num_codes)?;

        let mut predictions = Vec::with_capacity(windows.len());
        for chunk in windows.chunks(super::PREDICT_CHUNK) {
            let features = one_hot_tensor::<B>(chunk, self.maxlen, self.num_codes, device);
            let probs = sigmoid(self.forward(features)).into_data();
            predictions.extend(probs.iter::<f32>().map(|p| ModelPrediction {
                label: u8::from(p >= 0.5),
                probability: p,
                probability_of_try: p,
            }));
        }
        Ok(predictions)
    }

    /// Save weights; the recorder appends `.mpk`
    pub fn save(&self, path: &Path) -> Result<()>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), path.to_path_buf())
            .map_err(|e| crate::TrylineError::Io(std::io::Error::other(e.to_string())))
    }

    /// Load weights saved by [`WindowClassifier::save`]
    pub fn load(device: &B::Device, path: &Path, spec: &WindowClassifierSpec) -> Result<Self>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record: WindowClassifierRecord<B> = recorder
            .load(path.to_path_buf(), device)
            .map_err(|e| super::recorder_error("classifier", e))?;

        if record.hidden.len() != spec.hidden_dims.len() {
            return Err(crate::TrylineError::ArtifactLoad {
                name: "classifier".to_string(),
                message: format!(
                    "{} hidden layers stored, manifest lists {}",
                    record.hidden.len(),
                    spec.hidden_dims.len()
                ),
            });
        }

        let model = Self::new(device, spec).load_record(record);
        let mut in_dim = spec.input_dim();
        for (block, &out_dim) in model.hidden.iter().zip(&spec.hidden_dims) {
            super::check_shape("classifier", "hidden layer", [in_dim, out_dim], block.linear.weight.dims())?;
            in_dim = out_dim;
        }
        super::check_shape("classifier", "output layer", [in_dim, 1], model.output.weight.dims())?;

        Ok(model)
    }
}
