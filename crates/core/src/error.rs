//! Error types for collaborator boundaries

use thiserror::Error;

/// Errors surfaced by the external collaborators (audio source, inference
/// engine, tokenizer, embedding table, broadcast sink).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Audio source error: {0}")]
    Source(String),

    /// The audio source reported end-of-stream. Terminal for the ingress loop.
    #[error("Audio source closed")]
    SourceClosed,

    #[error("Inference engine error: {0}")]
    Inference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Embedding table error: {0}")]
    Embedding(String),

    #[error("Broadcast sink error: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
