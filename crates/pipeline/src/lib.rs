//! Streaming transcription pipeline
//!
//! Turns an unbounded device audio stream into a monotonically growing
//! timeline of word-timestamped text. Three worker stages (preprocess →
//! inference → postprocess) run on their own OS threads connected by bounded
//! queues, with an ingress loop framing device audio on one side and a
//! non-blocking emitter fanning results out on the other. The inference
//! engine is the throughput ceiling; the surrounding stages exist to keep it
//! saturated.

pub mod adapters;
pub mod decoder;
pub mod emitter;
pub mod formatter;
pub mod frontend;
pub mod ingress;
pub mod language_lock;
pub mod noise_floor;
pub mod orchestrator;
pub mod resampler;
pub mod stage;
pub mod stages;
pub mod stats;
pub mod timeline;
pub mod vad;

pub use adapters::{JsonVocabTokenizer, NpyEmbeddingTable, WavFileSource};
#[cfg(feature = "onnx")]
pub use adapters::OnnxNpuEngine;
pub use decoder::TranscriptionDecoder;
pub use emitter::{AsyncEmitter, EmitterHandle};
pub use formatter::TranscriptionFormatter;
pub use frontend::WavFrontend;
pub use ingress::IngressLoop;
pub use language_lock::{LanguageLock, LockOutcome, LockState};
pub use noise_floor::NoiseFloorEstimator;
pub use orchestrator::{Collaborators, PipelineOrchestrator, PipelineSnapshot};
pub use resampler::Resampler;
pub use stage::{PipelineStage, StageMsg, StageProcessor, StageStats};
pub use stats::StatisticsTracker;
pub use timeline::TimelineMerger;
pub use vad::{VadMetrics, VoiceActivityDetector};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Frontend error: {0}")]
    Frontend(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Initialization error: {0}")]
    Init(String),

    /// The audio source reported end-of-stream.
    #[error("Audio ingress closed")]
    IngressClosed,
}

impl From<sensestream_core::CoreError> for PipelineError {
    fn from(err: sensestream_core::CoreError) -> Self {
        use sensestream_core::CoreError;
        match err {
            CoreError::SourceClosed => PipelineError::IngressClosed,
            CoreError::Source(msg) => PipelineError::Audio(msg),
            CoreError::Inference(msg) => PipelineError::Model(msg),
            CoreError::Tokenizer(msg) => PipelineError::Decode(msg),
            CoreError::Embedding(msg) => PipelineError::Frontend(msg),
            CoreError::Sink(msg) => PipelineError::Queue(msg),
        }
    }
}
