//! Postprocessing stage: decode → lock → filter → merge → emit
//!
//! Owns the decoder state, the language lock writes, the timeline merger
//! and the text post-processor. Emission is handed to the async emitter and
//! never blocks this stage.

use std::sync::Arc;

use crate::decoder::TranscriptionDecoder;
use crate::emitter::EmitterHandle;
use crate::formatter::TranscriptionFormatter;
use crate::language_lock::{LanguageLock, LockOutcome};
use crate::stage::StageProcessor;
use crate::stages::infer::InferenceJob;
use crate::timeline::TimelineMerger;
use crate::PipelineError;
use sensestream_core::TextPostProcessor;

pub struct PostprocessStage {
    decoder: TranscriptionDecoder,
    language_lock: Arc<LanguageLock>,
    merger: Option<TimelineMerger>,
    formatter: TranscriptionFormatter,
    post_processor: Box<dyn TextPostProcessor>,
    emitter: EmitterHandle,
    chunk_duration_ms: f64,
    last_emitted_text: Option<String>,
}

impl PostprocessStage {
    pub fn new(
        decoder: TranscriptionDecoder,
        language_lock: Arc<LanguageLock>,
        merger: Option<TimelineMerger>,
        formatter: TranscriptionFormatter,
        post_processor: Box<dyn TextPostProcessor>,
        emitter: EmitterHandle,
        chunk_duration_ms: f64,
    ) -> Self {
        Self {
            decoder,
            language_lock,
            merger,
            formatter,
            post_processor,
            emitter,
            chunk_duration_ms,
            last_emitted_text: None,
        }
    }

    /// Timeline high-water mark, if merging is enabled.
    pub fn last_emit_ms(&self) -> Option<f64> {
        self.merger.as_ref().map(|m| m.last_emit_ms())
    }
}

impl StageProcessor for PostprocessStage {
    type In = InferenceJob;
    type Out = ();

    fn process(&mut self, job: InferenceJob) -> Result<Option<()>, PipelineError> {
        let Some(result) = self.decoder.decode(&job.output, job.audio_hash) else {
            tracing::debug!(chunk = job.chunk_index, "decoder rejected window");
            return Ok(None);
        };
        self.decoder.register_result(job.audio_hash, &result);

        if let Some(language) = &result.language {
            match self.language_lock.record_detection(language) {
                Some(LockOutcome::Locked(code)) => {
                    self.emitter
                        .emit_status(format!("language locked to {code}"));
                },
                Some(LockOutcome::Abandoned) => {
                    self.emitter
                        .emit_status("language detection inconclusive, staying in auto mode");
                },
                None => {},
            }
        }

        if let Some(reason) = self.formatter.check_filter(&result) {
            tracing::debug!(reason = %reason, text = %result.text, "filtered by metadata");
            return Ok(None);
        }

        if let Some(merger) = &mut self.merger {
            if !result.words.is_empty() {
                let chunk_offset_ms = job.chunk_index as f64 * self.chunk_duration_ms;
                let new_words = merger.merge_chunk(&result.words, chunk_offset_ms);

                if new_words.is_empty() {
                    return Ok(None);
                }

                let new_text = new_words
                    .iter()
                    .map(|w| w.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let cleaned = self
                    .post_processor
                    .process(&new_text, self.last_emitted_text.as_deref());
                self.last_emitted_text = Some(cleaned.clone());

                self.emitter.emit(cleaned, result, Some(new_words));
                return Ok(Some(()));
            }
        }

        // Legacy path: full chunk text, no timeline narrowing
        let text = result.text.clone();
        self.emitter.emit(text, result, None);
        Ok(Some(()))
    }
}
