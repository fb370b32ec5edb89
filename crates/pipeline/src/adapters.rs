//! Collaborator adapters
//!
//! Concrete implementations of the external seams: an ONNX Runtime engine
//! (behind the `onnx` feature), a JSON piece-list tokenizer, an NPY
//! embedding table and a WAV-file audio source for offline runs and tests.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::PipelineError;
use sensestream_core::{
    AudioFrame, AudioSource, CoreError, EmbeddingTable, FeatureTensor, NpuOutput, Tokenizer,
};

#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};

/// ONNX Runtime inference engine.
#[cfg(feature = "onnx")]
pub struct OnnxNpuEngine {
    session: Session,
}

#[cfg(feature = "onnx")]
impl OnnxNpuEngine {
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .map_err(|e| PipelineError::Init(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PipelineError::Init(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| PipelineError::Init(e.to_string()))?
            .commit_from_file(model_path.as_ref())
            .map_err(|e| {
                PipelineError::Init(format!(
                    "cannot load model {}: {e}",
                    model_path.as_ref().display()
                ))
            })?;

        tracing::info!(model = %model_path.as_ref().display(), "ONNX engine loaded");
        Ok(Self { session })
    }
}

#[cfg(feature = "onnx")]
impl sensestream_core::NpuInfer for OnnxNpuEngine {
    fn run(&mut self, input: &FeatureTensor) -> Result<Option<NpuOutput>, CoreError> {
        let speech_tensor = Tensor::from_array(input.data.clone())
            .map_err(|e| CoreError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![
                "speech" => speech_tensor,
            ])
            .map_err(|e| CoreError::Inference(e.to_string()))?;

        // Output naming varies between exports
        let logits = if let Some(output) = outputs.get("logits") {
            output
        } else if let Some(output) = outputs.get("ctc_logits") {
            output
        } else {
            return Ok(None);
        };

        let array = logits
            .try_extract_array::<f32>()
            .map_err(|e| CoreError::Inference(e.to_string()))?;

        let shaped = array
            .to_owned()
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|e| CoreError::Inference(format!("unexpected output rank: {e}")))?;

        Ok(Some(NpuOutput { logits: shaped }))
    }
}

/// Tokenizer backed by a JSON array of piece strings (`id → piece`).
/// Pieces retain the `▁` word-boundary marker.
pub struct JsonVocabTokenizer {
    pieces: Vec<String>,
}

impl JsonVocabTokenizer {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| {
            PipelineError::Init(format!(
                "cannot read vocab {}: {e}",
                path.as_ref().display()
            ))
        })?;

        let pieces: Vec<String> = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Init(format!("invalid vocab json: {e}")))?;

        if pieces.is_empty() {
            return Err(PipelineError::Init("vocab is empty".to_string()));
        }

        tracing::info!(vocab_size = pieces.len(), "tokenizer loaded");
        Ok(Self { pieces })
    }

    pub fn from_pieces(pieces: Vec<String>) -> Self {
        Self { pieces }
    }
}

impl Tokenizer for JsonVocabTokenizer {
    fn vocab_size(&self) -> usize {
        self.pieces.len()
    }

    fn decode_ids(&self, ids: &[u32]) -> Result<String, CoreError> {
        let mut out = String::new();
        for &id in ids {
            let piece = self
                .pieces
                .get(id as usize)
                .ok_or_else(|| CoreError::Tokenizer(format!("id {id} out of range")))?;
            out.push_str(piece);
        }
        Ok(out.replace('▁', " ").trim().to_string())
    }

    fn piece(&self, id: u32) -> Result<String, CoreError> {
        self.pieces
            .get(id as usize)
            .cloned()
            .ok_or_else(|| CoreError::Tokenizer(format!("id {id} out of range")))
    }
}

/// f32 embedding table loaded from a NumPy `.npy` file (v1/v2, C order).
pub struct NpyEmbeddingTable {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

impl NpyEmbeddingTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let bytes = fs::read(path.as_ref()).map_err(|e| {
            PipelineError::Init(format!(
                "cannot read embedding {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, PipelineError> {
        let bad = |msg: &str| PipelineError::Init(format!("invalid npy: {msg}"));

        if bytes.len() < 10 || &bytes[..6] != b"\x93NUMPY" {
            return Err(bad("missing magic"));
        }

        let major = bytes[6];
        let (header_len, header_start) = match major {
            1 => {
                let len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
                (len, 10)
            },
            2 => {
                if bytes.len() < 12 {
                    return Err(bad("truncated header length"));
                }
                let len =
                    u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
                (len, 12)
            },
            v => return Err(bad(&format!("unsupported version {v}"))),
        };

        let header_end = header_start + header_len;
        if bytes.len() < header_end {
            return Err(bad("truncated header"));
        }
        let header = std::str::from_utf8(&bytes[header_start..header_end])
            .map_err(|_| bad("header not utf-8"))?;

        if !header.contains("'descr': '<f4'") {
            return Err(bad("dtype must be little-endian f32"));
        }
        if header.contains("'fortran_order': True") {
            return Err(bad("fortran order unsupported"));
        }

        let shape_inner = header
            .split("'shape':")
            .nth(1)
            .and_then(|s| s.split('(').nth(1))
            .and_then(|s| s.split(')').next())
            .ok_or_else(|| bad("missing shape"))?;
        let dims: Vec<usize> = shape_inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<usize>().map_err(|_| bad("bad shape value")))
            .collect::<Result<_, _>>()?;
        if dims.len() != 2 {
            return Err(bad("expected a 2-D table"));
        }
        let (rows, dim) = (dims[0], dims[1]);

        let payload = &bytes[header_end..];
        let expected = rows * dim * 4;
        if payload.len() < expected {
            return Err(bad("payload shorter than shape implies"));
        }

        let data: Vec<f32> = payload[..expected]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        tracing::info!(rows, dim, "embedding table loaded");
        Ok(Self { rows, dim, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl EmbeddingTable for NpyEmbeddingTable {
    fn dim(&self) -> usize {
        self.dim
    }

    fn row(&self, id: usize) -> Result<&[f32], CoreError> {
        if id >= self.rows {
            return Err(CoreError::Embedding(format!(
                "row {id} out of range ({} rows)",
                self.rows
            )));
        }
        let start = id * self.dim;
        Ok(&self.data[start..start + self.dim])
    }
}

/// Audio source replaying a mono/stereo int16 WAV file in fixed frames.
/// Reports end-of-stream when the file runs out.
pub struct WavFileSource {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
    frame_len: usize,
    pos: usize,
}

impl WavFileSource {
    pub fn open(path: impl AsRef<Path>, frame_len: usize) -> Result<Self, PipelineError> {
        let mut reader = hound::WavReader::open(path.as_ref()).map_err(|e| {
            PipelineError::Init(format!(
                "cannot open wav {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let spec = reader.spec();

        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(PipelineError::Init(format!(
                "unsupported wav format: {} bit {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        let samples: Vec<i16> = reader
            .samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| PipelineError::Init(format!("wav read failed: {e}")))?;

        tracing::info!(
            path = %path.as_ref().display(),
            rate = spec.sample_rate,
            channels = spec.channels,
            samples = samples.len(),
            "wav source opened"
        );

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            frame_len,
            pos: 0,
        })
    }
}

impl AudioSource for WavFileSource {
    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<AudioFrame>, CoreError> {
        if self.pos >= self.samples.len() {
            return Err(CoreError::SourceClosed);
        }

        let end = (self.pos + self.frame_len * self.channels as usize).min(self.samples.len());
        let frame = AudioFrame::new(
            self.samples[self.pos..end].to_vec(),
            self.sample_rate,
            self.channels,
        );
        self.pos = end;
        Ok(Some(frame))
    }

    fn device_rate_hz(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn supports(&self, rate: u32, channels: u16) -> bool {
        rate == self.sample_rate && channels == self.channels
    }
}
