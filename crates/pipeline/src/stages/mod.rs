//! The three concrete pipeline stage processors

mod infer;
mod postprocess;
mod preprocess;

pub use infer::{InferStage, InferenceJob};
pub use postprocess::PostprocessStage;
pub use preprocess::{FeatureJob, PreprocessStage};
