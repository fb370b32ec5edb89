//! Feature extraction frontend
//!
//! fbank → LFR stacking → CMVN → query-prefix tensor assembly. The output is
//! the fixed-shape `[1, RKNN_INPUT_LEN, dim]` tensor the inference engine
//! consumes: a language query row, the event+emotion query pair, the
//! text-normalization query, then scaled speech features padded with zeros.

mod cmvn;
mod fbank;

pub use cmvn::Cmvn;
pub use fbank::FbankComputer;

use ndarray::Array3;

use crate::PipelineError;
use sensestream_config::constants::audio::{FRAME_LENGTH_MS, FRAME_SHIFT_MS, MODEL_SAMPLE_RATE};
use sensestream_config::constants::model::{RKNN_INPUT_LEN, SPEECH_SCALE};
use sensestream_config::FrontendConfig;
use sensestream_core::labels::{EVENT_EMO_QUERY_IDS, ITN_QUERY_ID, NO_ITN_QUERY_ID};
use sensestream_core::{EmbeddingTable, FeatureTensor};

pub struct WavFrontend {
    fbank: FbankComputer,
    cmvn: Option<Cmvn>,
    lfr_m: usize,
    lfr_n: usize,
    max_frames: usize,
}

impl WavFrontend {
    pub fn new(config: &FrontendConfig, cmvn: Option<Cmvn>) -> Self {
        let fbank = FbankComputer::new(
            MODEL_SAMPLE_RATE,
            config.mel_bins,
            FRAME_LENGTH_MS,
            FRAME_SHIFT_MS,
        );

        Self {
            fbank,
            cmvn,
            lfr_m: config.lfr_m,
            lfr_n: config.lfr_n,
            max_frames: config.max_frames,
        }
    }

    /// Stacked feature width after LFR.
    pub fn feature_dim(&self) -> usize {
        self.lfr_m * self.fbank.n_mels()
    }

    /// Full feature pipeline: fbank → LFR → CMVN → max_frames truncation.
    pub fn features(&self, samples_16k: &[f32]) -> Vec<Vec<f32>> {
        let fbank = self.fbank.compute(samples_16k);
        if fbank.is_empty() {
            return Vec::new();
        }

        let mut feats = apply_lfr(&fbank, self.lfr_m, self.lfr_n);

        if let Some(cmvn) = &self.cmvn {
            cmvn.apply(&mut feats);
        }

        feats.truncate(self.max_frames);
        feats
    }

    /// Assemble the model input tensor for one window.
    pub fn assemble(
        &self,
        samples_16k: &[f32],
        lang_id: u32,
        use_itn: bool,
        embedding: &dyn EmbeddingTable,
    ) -> Result<FeatureTensor, PipelineError> {
        let speech = self.features(samples_16k);
        let dim = self.feature_dim();

        if embedding.dim() != dim {
            return Err(PipelineError::Frontend(format!(
                "embedding dim {} does not match feature dim {}",
                embedding.dim(),
                dim
            )));
        }

        let text_norm_id = if use_itn { ITN_QUERY_ID } else { NO_ITN_QUERY_ID };
        let query_ids = [
            lang_id,
            EVENT_EMO_QUERY_IDS[0],
            EVENT_EMO_QUERY_IDS[1],
            text_norm_id,
        ];

        let mut data = Array3::<f32>::zeros((1, RKNN_INPUT_LEN, dim));

        let mut row = 0;
        for &id in &query_ids {
            let values = embedding
                .row(id as usize)
                .map_err(|e| PipelineError::Frontend(e.to_string()))?;
            for (d, &v) in values.iter().enumerate().take(dim) {
                data[[0, row, d]] = v;
            }
            row += 1;
        }

        for frame in speech.iter() {
            if row >= RKNN_INPUT_LEN {
                break;
            }
            for (d, &v) in frame.iter().enumerate().take(dim) {
                data[[0, row, d]] = v * SPEECH_SCALE;
            }
            row += 1;
        }
        // Remaining rows stay zero (right padding)

        Ok(FeatureTensor {
            data,
            lang_id,
            use_itn,
        })
    }
}

/// Low-frame-rate stacking: prepend ⌊(m−1)/2⌋ copies of the first frame,
/// emit ⌈T/n⌉ frames of width `m × bins`, repeating the final input frame to
/// right-pad the last stack.
pub fn apply_lfr(inputs: &[Vec<f32>], lfr_m: usize, lfr_n: usize) -> Vec<Vec<f32>> {
    if inputs.is_empty() {
        return Vec::new();
    }

    let t = inputs.len();
    let t_lfr = (t + lfr_n - 1) / lfr_n;
    let left_pad = (lfr_m - 1) / 2;

    // Padded view: left_pad copies of frame 0, then the input frames
    let padded_len = t + left_pad;
    let frame_at = |i: usize| -> &Vec<f32> {
        if i < left_pad {
            &inputs[0]
        } else {
            &inputs[i - left_pad]
        }
    };

    let mut out = Vec::with_capacity(t_lfr);
    for i in 0..t_lfr {
        let start = i * lfr_n;
        let mut stacked = Vec::with_capacity(lfr_m * inputs[0].len());

        if lfr_m <= padded_len - start {
            for j in 0..lfr_m {
                stacked.extend_from_slice(frame_at(start + j));
            }
        } else {
            // Last stack: take what remains, then repeat the final frame
            let available = padded_len - start;
            for j in 0..available {
                stacked.extend_from_slice(frame_at(start + j));
            }
            for _ in available..lfr_m {
                stacked.extend_from_slice(&inputs[t - 1]);
            }
        }

        out.push(stacked);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensestream_core::CoreError;

    struct FlatEmbedding {
        dim: usize,
        rows: Vec<Vec<f32>>,
    }

    impl FlatEmbedding {
        fn new(dim: usize) -> Self {
            // Row i is filled with the value i+1 so tests can identify rows
            let rows = (0..16).map(|i| vec![(i + 1) as f32; dim]).collect();
            Self { dim, rows }
        }
    }

    impl EmbeddingTable for FlatEmbedding {
        fn dim(&self) -> usize {
            self.dim
        }

        fn row(&self, id: usize) -> Result<&[f32], CoreError> {
            self.rows
                .get(id)
                .map(|r| r.as_slice())
                .ok_or_else(|| CoreError::Embedding(format!("row {id} out of range")))
        }
    }

    fn frontend() -> WavFrontend {
        WavFrontend::new(&FrontendConfig::default(), None)
    }

    #[test]
    fn test_lfr_shapes() {
        // 10 frames of width 2, m=7, n=6 → ceil(10/6) = 2 stacked frames
        let inputs: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, i as f32]).collect();
        let out = apply_lfr(&inputs, 7, 6);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|f| f.len() == 14));
    }

    #[test]
    fn test_lfr_left_padding_repeats_first_frame() {
        let inputs: Vec<Vec<f32>> = (0..8).map(|i| vec![i as f32]).collect();
        let out = apply_lfr(&inputs, 7, 6);
        // left_pad = 3: first stack is [0 0 0 0 1 2 3]
        assert_eq!(out[0], vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_lfr_tail_repeats_last_frame() {
        let inputs: Vec<Vec<f32>> = (0..8).map(|i| vec![i as f32]).collect();
        let out = apply_lfr(&inputs, 7, 6);
        // Second stack starts at padded index 6 → frames [3 4 5 6 7],
        // then the last frame (7) repeated twice
        assert_eq!(out[1], vec![3.0, 4.0, 5.0, 6.0, 7.0, 7.0, 7.0]);
    }

    #[test]
    fn test_feature_dim() {
        let fe = frontend();
        assert_eq!(fe.feature_dim(), 560);
    }

    #[test]
    fn test_features_shape_for_three_seconds() {
        let fe = frontend();
        let audio = vec![0.01f32; 48000];
        let feats = fe.features(&audio);
        // 298 fbank frames → ceil(298/6) = 50 LFR frames
        assert_eq!(feats.len(), 50);
        assert!(feats.iter().all(|f| f.len() == 560));
    }

    #[test]
    fn test_assemble_layout() {
        let fe = frontend();
        let embedding = FlatEmbedding::new(560);
        let audio = vec![0.01f32; 48000];

        let tensor = fe.assemble(&audio, 4, true, &embedding).unwrap();
        assert_eq!(tensor.data.shape(), &[1, RKNN_INPUT_LEN, 560]);
        assert_eq!(tensor.lang_id, 4);
        assert!(tensor.use_itn);

        // Prefix rows: lang id 4 → value 5.0; event/emo rows 1, 2 → 2.0, 3.0;
        // ITN row 14 → 15.0
        assert_eq!(tensor.data[[0, 0, 0]], 5.0);
        assert_eq!(tensor.data[[0, 1, 0]], 2.0);
        assert_eq!(tensor.data[[0, 2, 0]], 3.0);
        assert_eq!(tensor.data[[0, 3, 0]], 15.0);

        // Speech rows follow; 4 + 50 = 54 rows populated, rest zero padding
        assert_ne!(tensor.data[[0, 4, 0]], 0.0);
        assert_eq!(tensor.data[[0, 54, 0]], 0.0);
        assert_eq!(tensor.data[[0, RKNN_INPUT_LEN - 1, 559]], 0.0);
    }

    #[test]
    fn test_assemble_without_itn_uses_row_15() {
        let fe = frontend();
        let embedding = FlatEmbedding::new(560);
        let audio = vec![0.01f32; 16000];
        let tensor = fe.assemble(&audio, 0, false, &embedding).unwrap();
        assert_eq!(tensor.data[[0, 3, 0]], 16.0);
    }

    #[test]
    fn test_assemble_rejects_dim_mismatch() {
        let fe = frontend();
        let embedding = FlatEmbedding::new(128);
        let audio = vec![0.01f32; 16000];
        assert!(fe.assemble(&audio, 0, true, &embedding).is_err());
    }

    #[test]
    fn test_cmvn_applied_after_lfr() {
        let cmvn = Cmvn {
            means: vec![1.0; 560],
            vars: vec![2.0; 560],
        };
        let with = WavFrontend::new(&FrontendConfig::default(), Some(cmvn));
        let without = frontend();

        let audio = vec![0.01f32; 48000];
        let a = with.features(&audio);
        let b = without.features(&audio);
        assert_eq!(a.len(), b.len());
        // (x + 1) * 2
        assert!((a[0][0] - (b[0][0] + 1.0) * 2.0).abs() < 1e-4);
    }
}
