//! LSTM sequence model
//!
//! Reads a window of event codes in order and classifies whether a try follows.

use std::path::Path;

use burn::module::Module;
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig, Lstm, LstmConfig, LstmState};
use burn::record::{FullPrecisionSettings, Recorder};
use burn::tensor::activation::{relu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};

use crate::data::dataset::codes_tensor;
use crate::{ModelPrediction, Result, SequenceModelConfig};

/// Shape of a sequence model, stored alongside its weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceModelSpec {
    pub maxlen: usize,
    /// Rows in the embedding table (vocabulary size + 2)
    pub embedding_size: usize,
    pub embedding_dim: usize,
    pub hidden_size: usize,
    pub dense_size: usize,
}

impl SequenceModelSpec {
    pub fn new(config: &SequenceModelConfig, maxlen: usize, embedding_size: usize) -> Self {
        SequenceModelSpec {
            maxlen,
            embedding_size,
            embedding_dim: config.embedding_dim,
            hidden_size: config.hidden_size,
            dense_size: config.dense_size,
        }
    }
}

/// Embedding → LSTM → Dense(ReLU) → 2-way output
///
/// The final LSTM hidden state summarises the window. Timesteps holding code 0
/// (padding or an unknown event) are masked: the state is carried over them
/// unchanged, so they never influence the output.
#[derive(Module, Debug)]
pub struct SequenceModel<B: Backend> {
    embedding: Embedding<B>,
    lstm: Lstm<B>,
    dense: Linear<B>,
    output: Linear<B>,
    hidden_size: usize,
    maxlen: usize,
    embedding_size: usize,
}

impl<B: Backend> SequenceModel<B> {
    pub fn new(device: &B::Device, spec: &SequenceModelSpec) -> Self {
        SequenceModel {
            embedding: EmbeddingConfig::new(spec.embedding_size, spec.embedding_dim).init(device),
            lstm: LstmConfig::new(spec.embedding_dim, spec.hidden_size, true).init(device),
            dense: LinearConfig::new(spec.hidden_size, spec.dense_size).init(device),
            output: LinearConfig::new(spec.dense_size, 2).init(device),
            hidden_size: spec.hidden_size,
            maxlen: spec.maxlen,
            embedding_size: spec.embedding_size,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `codes` - Event codes [batch, maxlen]
    ///
    /// # Returns
    /// Class logits [batch, 2]; index 1 is "try follows"
    pub fn forward(&self, codes: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch_size, seq_len] = codes.dims();
        let device = codes.device();
        // 1.0 for a real event, 0.0 for code 0
        let mask = codes.clone().not_equal_elem(0).float();
        let x = self.embedding.forward(codes);

        let mut cell = Tensor::<B, 2>::zeros([batch_size, self.hidden_size], &device);
        let mut hidden = Tensor::<B, 2>::zeros([batch_size, self.hidden_size], &device);
        for t in 0..seq_len {
            let step = x.clone().slice([0..batch_size, t..t + 1]);
            let (_, next) = self
                .lstm
                .forward(step, Some(LstmState::new(cell.clone(), hidden.clone())));

            // state = keep * new + (1 - keep) * old, broadcast over the hidden units
            let keep = mask.clone().slice([0..batch_size, t..t + 1]);
            let skip = keep.clone().neg().add_scalar(1.0);
            cell = next.cell * keep.clone() + cell * skip.clone();
            hidden = next.hidden * keep + hidden * skip;
        }

        let x = relu(self.dense.forward(hidden));
        self.output.forward(x)
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    /// Score encoded windows. Label is the argmax class and `probability` its softmax value.
    pub fn predict_windows(&self, windows: &[Vec<u32>], device: &B::Device) -> Result<Vec<ModelPrediction>> {
        // the last embedding row is never produced by the encoder
        super::check_windows(windows, self.maxlen, self.embedding_size)?;

        let mut predictions = Vec::with_capacity(windows.len());
        for chunk in windows.chunks(super::PREDICT_CHUNK) {
            let codes = codes_tensor::<B>(chunk, self.maxlen, device);
            let probs: Vec<f32> = softmax(self.forward(codes), 1).into_data().iter::<f32>().collect();

            predictions.extend(probs.chunks_exact(2).map(|pair| {
                let (no_try, try_) = (pair[0], pair[1]);
                if try_ > no_try {
                    ModelPrediction {
                        label: 1,
                        probability: try_,
                        probability_of_try: try_,
                    }
                } else {
                    ModelPrediction {
                        label: 0,
                        probability: no_try,
                        probability_of_try: try_,
                    }
                }
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

    /// Load weights saved by [`SequenceModel::save`]
    pub fn load(device: &B::Device, path: &Path, spec: &SequenceModelSpec) -> Result<Self>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.to_path_buf(), device)
            .map_err(|e| super::recorder_error("sequence_model", e))?;

        let model: Self = Self::new(device, spec).load_record(record);
        let name = "sequence_model";
        super::check_shape(
            name,
            "embedding",
            [spec.embedding_size, spec.embedding_dim],
            model.embedding.weight.dims(),
        )?;
        for gate in [
            &model.lstm.input_gate,
            &model.lstm.forget_gate,
            &model.lstm.output_gate,
            &model.lstm.cell_gate,
        ] {
            super::check_shape(
                name,
                "lstm input",
                [spec.embedding_dim, spec.hidden_size],
                gate.input_transform.weight.dims(),
            )?;
            super::check_shape(
                name,
                "lstm hidden",
                [spec.hidden_size, spec.hidden_size],
                gate.hidden_transform.weight.dims(),
            )?;
        }
        super::check_shape(name, "dense", [spec.hidden_size, spec.dense_size], model.dense.weight.dims())?;
        super::check_shape(name, "output", [spec.dense_size, 2], model.output.weight.dims())?;

        Ok(model)
    }
}
