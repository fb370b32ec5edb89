//! Core types and collaborator traits for the sensestream pipeline
//!
//! This crate provides the foundational pieces used across all other crates:
//! - Audio frame and window types moving through the pipeline queues
//! - Transcription domain types (tokens, words, chunk results, wire records)
//! - The shared metadata tag tables (`Labels`)
//! - Collaborator traits for the external seams (audio source, inference
//!   engine, tokenizer, embedding table, broadcast sink)
//! - Error types

pub mod audio;
pub mod error;
pub mod features;
pub mod labels;
pub mod traits;
pub mod transcript;

pub use audio::{rms, rms_i16, AudioFrame, AudioWindow, RawChunk, PCM16_NORMALIZE};
pub use error::{CoreError, Result};
pub use features::{FeatureTensor, NpuOutput};
pub use labels::Labels;
pub use traits::{
    AudioSource, BroadcastSink, EmbeddingTable, NpuInfer, NullBroadcastSink,
    PassthroughPostProcessor, TextPostProcessor, Tokenizer, RATE_PREFERENCES,
};
pub use transcript::{
    ChunkResult, StatusRecord, TimelineEntry, Token, TranscriptionRecord, WireWord, Word,
};
