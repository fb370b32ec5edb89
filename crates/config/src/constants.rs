//! Centralized constants for the transcription pipeline
//!
//! Single source of truth for model-architecture and stage-plumbing values
//! that are not runtime-tunable. Tunable options live in `settings`.

/// Audio and frontend framing constants.
pub mod audio {
    /// Sample rate the acoustic model expects.
    pub const MODEL_SAMPLE_RATE: u32 = 16_000;

    /// Fbank analysis window length (ms).
    pub const FRAME_LENGTH_MS: f32 = 25.0;

    /// Fbank frame shift (ms).
    pub const FRAME_SHIFT_MS: f32 = 10.0;

    /// Duration of one CTC output frame in milliseconds.
    pub const CTC_FRAME_DURATION_MS: f64 = 31.25;
}

/// Acoustic model input/output constants.
pub mod model {
    /// Fixed time-step count of the model input tensor.
    pub const RKNN_INPUT_LEN: usize = 171;

    /// Speech features are halved before inference for fp16 headroom.
    pub const SPEECH_SCALE: f32 = 0.5;

    /// CTC blank token id.
    pub const BLANK_ID: u32 = 0;

    /// Windows whose mean blank posterior exceeds this are dropped.
    pub const BLANK_GATE_THRESHOLD: f32 = 0.97;

    /// Softmax exponent domain clip, applied after max-subtraction.
    pub const LOGIT_CLIP: f32 = 100.0;
}

/// Noise-floor estimator tuning.
pub mod noise {
    /// Recompute the adaptive floor every this many non-speech updates.
    pub const UPDATE_INTERVAL: u32 = 50;

    /// Minimum history length before the adaptive floor may move.
    pub const MIN_HISTORY: usize = 20;

    /// The adaptive floor is the median of this many trailing samples.
    pub const ADAPTIVE_WINDOW: usize = 50;

    /// History is truncated to this many entries after a recompute.
    pub const HISTORY_CAP: usize = 100;

    /// Hard clamp on the ratio between adjacent floor values.
    pub const MAX_STEP_RATIO: f32 = 50.0;
}

/// Decoder dedup/stitching ring sizes.
pub mod decoder {
    /// Audio fingerprints remembered for exact-duplicate suppression.
    pub const RECENT_HASH_COUNT: usize = 10;

    /// Fingerprint → result map is evicted down to this size.
    pub const HASH_RESULT_CAP: usize = 15;

    /// Recently emitted texts remembered for fuzzy dedup.
    pub const RECENT_TEXT_COUNT: usize = 6;

    /// Word-overlap similarity needed to trigger a boundary stitch decision.
    pub const STITCH_SIMILARITY: f32 = 0.7;
}

/// Stage-worker plumbing timeouts.
pub mod stage {
    /// Queue pop timeout; also bounds shutdown-observation latency.
    pub const POP_TIMEOUT_MS: u64 = 500;

    /// Queue push timeout before a produced item is dropped.
    pub const PUSH_TIMEOUT_MS: u64 = 1_000;

    /// Per-stage join timeout at shutdown.
    pub const JOIN_TIMEOUT_MS: u64 = 5_000;

    /// Emitter join timeout at shutdown.
    pub const EMITTER_JOIN_TIMEOUT_MS: u64 = 2_000;

    /// A single `process` call slower than this logs a warning.
    pub const SLOW_PROCESS_WARN_MS: u64 = 100;

    /// Ingress frame-pull timeout.
    pub const INGRESS_POLL_TIMEOUT_MS: u64 = 100;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration_consistency() {
        // 171 output frames cover ~5.3s of input
        let span_s = model::RKNN_INPUT_LEN as f64 * audio::CTC_FRAME_DURATION_MS / 1000.0;
        assert!(span_s > 5.0 && span_s < 5.5);
    }
}
