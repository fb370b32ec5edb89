//! Inference stage: the NPU forward pass
//!
//! The throughput ceiling of the pipeline. The engine handle is
//! thread-confined here; latency is recorded per window.

use std::sync::Arc;
use std::time::Instant;

use crate::stage::StageProcessor;
use crate::stages::preprocess::FeatureJob;
use crate::stats::StatisticsTracker;
use crate::PipelineError;
use sensestream_core::{NpuInfer, NpuOutput};

/// Output of inference, carried to postprocessing.
pub struct InferenceJob {
    pub output: NpuOutput,
    pub audio_hash: u64,
    pub chunk_index: u64,
    pub language: String,
    pub use_itn: bool,
    pub inference_ms: f64,
}

pub struct InferStage {
    engine: Box<dyn NpuInfer>,
    stats: Arc<StatisticsTracker>,
}

impl InferStage {
    pub fn new(engine: Box<dyn NpuInfer>, stats: Arc<StatisticsTracker>) -> Self {
        Self { engine, stats }
    }
}

impl StageProcessor for InferStage {
    type In = FeatureJob;
    type Out = InferenceJob;

    fn process(&mut self, job: FeatureJob) -> Result<Option<InferenceJob>, PipelineError> {
        let start = Instant::now();
        let output = self
            .engine
            .run(&job.features)
            .map_err(|e| PipelineError::Model(e.to_string()))?;
        let elapsed = start.elapsed();

        let Some(output) = output else {
            tracing::warn!(
                chunk = job.chunk_index,
                hash = format!("{:016x}", job.audio_hash),
                "inference returned no output"
            );
            return Ok(None);
        };

        self.stats.record_inference(elapsed);

        tracing::debug!(
            chunk = job.chunk_index,
            inference_ms = format!("{:.1}", elapsed.as_secs_f64() * 1000.0),
            "inference complete"
        );

        Ok(Some(InferenceJob {
            output,
            audio_hash: job.audio_hash,
            chunk_index: job.chunk_index,
            language: job.language,
            use_itn: job.use_itn,
            inference_ms: elapsed.as_secs_f64() * 1000.0,
        }))
    }
}
