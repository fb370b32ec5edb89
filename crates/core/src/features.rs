//! Model input/output tensor types

use ndarray::Array3;

/// Assembled model input: query-prefix rows followed by padded speech
/// features, shaped `[1, input_len, dim]`.
#[derive(Clone, Debug)]
pub struct FeatureTensor {
    pub data: Array3<f32>,
    /// Language id row used for the leading query (see `Labels::language_id`).
    pub lang_id: u32,
    pub use_itn: bool,
}

impl FeatureTensor {
    /// Number of time steps (second axis).
    pub fn time_steps(&self) -> usize {
        self.data.shape()[1]
    }

    /// Feature dimension (third axis).
    pub fn dim(&self) -> usize {
        self.data.shape()[2]
    }
}

/// Raw logits from the inference engine, shaped `[1, vocab, frames]`.
#[derive(Clone, Debug)]
pub struct NpuOutput {
    pub logits: Array3<f32>,
}

impl NpuOutput {
    pub fn vocab_size(&self) -> usize {
        self.logits.shape()[1]
    }

    pub fn frames(&self) -> usize {
        self.logits.shape()[2]
    }
}
