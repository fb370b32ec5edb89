//! Preprocessing stage: resample → VAD → fingerprint → features
//!
//! CPU-bound; runs in parallel with inference. Non-speech windows feed the
//! adaptive noise floor and are skipped before any feature work happens.

use parking_lot::Mutex;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

use crate::frontend::WavFrontend;
use crate::language_lock::LanguageLock;
use crate::noise_floor::NoiseFloorEstimator;
use crate::resampler::Resampler;
use crate::stage::StageProcessor;
use crate::vad::{VadMetrics, VoiceActivityDetector};
use crate::PipelineError;
use sensestream_core::{AudioWindow, EmbeddingTable, FeatureTensor, Labels, RawChunk};

/// Output of preprocessing: everything inference and postprocessing need.
pub struct FeatureJob {
    pub features: FeatureTensor,
    pub audio_hash: u64,
    pub chunk_index: u64,
    pub language: String,
    pub use_itn: bool,
    pub vad: VadMetrics,
}

pub struct PreprocessStage {
    resampler: Resampler,
    vad: VoiceActivityDetector,
    enable_vad: bool,
    adaptive_noise_floor: bool,
    noise_floor: Arc<Mutex<NoiseFloorEstimator>>,
    language_lock: Arc<LanguageLock>,
    frontend: WavFrontend,
    embedding: Arc<dyn EmbeddingTable>,
    labels: Labels,
    use_itn: bool,
}

impl PreprocessStage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resampler: Resampler,
        vad: VoiceActivityDetector,
        enable_vad: bool,
        adaptive_noise_floor: bool,
        noise_floor: Arc<Mutex<NoiseFloorEstimator>>,
        language_lock: Arc<LanguageLock>,
        frontend: WavFrontend,
        embedding: Arc<dyn EmbeddingTable>,
        labels: Labels,
        use_itn: bool,
    ) -> Self {
        Self {
            resampler,
            vad,
            enable_vad,
            adaptive_noise_floor,
            noise_floor,
            language_lock,
            frontend,
            embedding,
            labels,
            use_itn,
        }
    }
}

impl StageProcessor for PreprocessStage {
    type In = RawChunk;
    type Out = FeatureJob;

    fn process(&mut self, chunk: RawChunk) -> Result<Option<FeatureJob>, PipelineError> {
        let floor = self.noise_floor.lock().get();
        let window = AudioWindow {
            samples_16k: self.resampler.resample(&chunk.samples),
            chunk_index: chunk.chunk_index,
            noise_floor: floor,
        };

        let metrics = if self.enable_vad {
            self.vad.assess(&window.samples_16k, window.noise_floor)
        } else {
            VadMetrics::bypass(sensestream_core::rms(&window.samples_16k))
        };

        if !metrics.is_speech {
            tracing::debug!(
                chunk = window.chunk_index,
                rms = format!("{:.4}", metrics.rms),
                zcr = format!("{:.3}", metrics.zcr),
                entropy = format!("{:.3}", metrics.entropy),
                "skip non-speech window"
            );
            if self.adaptive_noise_floor {
                self.noise_floor.lock().update(metrics.rms);
            }
            return Ok(None);
        }

        tracing::debug!(
            chunk = window.chunk_index,
            rms = format!("{:.4}", metrics.rms),
            zcr = format!("{:.3}", metrics.zcr),
            entropy = format!("{:.3}", metrics.entropy),
            "speech detected"
        );

        // Stable fingerprint of the 16 kHz samples, for dedup downstream
        let mut bytes = Vec::with_capacity(window.samples_16k.len() * 4);
        for sample in &window.samples_16k {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        let audio_hash = xxh3_64(&bytes);

        if self.language_lock.is_enabled() && !self.language_lock.is_locked() {
            self.language_lock.start_warmup();
        }
        let language = self.language_lock.current_language();
        let lang_id = self.labels.language_id(&language);

        let features = self.frontend.assemble(
            &window.samples_16k,
            lang_id,
            self.use_itn,
            self.embedding.as_ref(),
        )?;

        Ok(Some(FeatureJob {
            features,
            audio_hash,
            chunk_index: window.chunk_index,
            language,
            use_itn: self.use_itn,
            vad: metrics,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensestream_config::{FrontendConfig, LanguageLockConfig, VadConfig};
    use sensestream_core::CoreError;

    struct ZeroEmbedding {
        dim: usize,
    }

    impl EmbeddingTable for ZeroEmbedding {
        fn dim(&self) -> usize {
            self.dim
        }

        fn row(&self, _id: usize) -> Result<&[f32], CoreError> {
            // All query rows zero; fine for shape-level tests
            Ok(&[])
        }
    }

    fn stage(enable_vad: bool) -> PreprocessStage {
        let noise_floor = Arc::new(Mutex::new(NoiseFloorEstimator::new(0.0, true)));
        noise_floor.lock().absorb_bootstrap(0.001, 0.1);

        PreprocessStage::new(
            Resampler::new(16000),
            VoiceActivityDetector::new(VadConfig::default(), 0.004),
            enable_vad,
            true,
            noise_floor,
            Arc::new(LanguageLock::new(
                LanguageLockConfig::default(),
                Labels::new(),
                "auto",
            )),
            WavFrontend::new(&FrontendConfig::default(), None),
            Arc::new(ZeroEmbedding { dim: 560 }),
            Labels::new(),
            true,
        )
    }

    fn silence_chunk() -> RawChunk {
        RawChunk {
            samples: vec![0i16; 48000],
            device_rate_hz: 16000,
            chunk_index: 0,
        }
    }

    fn tone_chunk(index: u64) -> RawChunk {
        let samples: Vec<i16> = (0..48000)
            .map(|i| {
                let x = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin();
                (x * 12000.0) as i16
            })
            .collect();
        RawChunk {
            samples,
            device_rate_hz: 16000,
            chunk_index: index,
        }
    }

    #[test]
    fn test_silence_is_skipped() {
        let mut s = stage(true);
        let out = s.process(silence_chunk()).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_tone_produces_feature_job() {
        let mut s = stage(true);
        let out = s.process(tone_chunk(3)).unwrap().expect("speech window");
        assert_eq!(out.chunk_index, 3);
        assert_eq!(out.language, "auto");
        assert!(out.use_itn);
        assert_eq!(out.features.data.shape(), &[1, 171, 560]);
        assert!(out.vad.is_speech);
    }

    #[test]
    fn test_identical_audio_same_fingerprint() {
        let mut s = stage(true);
        let a = s.process(tone_chunk(0)).unwrap().unwrap();
        let b = s.process(tone_chunk(1)).unwrap().unwrap();
        assert_eq!(a.audio_hash, b.audio_hash);

        let mut different = tone_chunk(2);
        different.samples[100] = different.samples[100].wrapping_add(500);
        let c = s.process(different).unwrap().unwrap();
        assert_ne!(a.audio_hash, c.audio_hash);
    }

    #[test]
    fn test_vad_bypass_accepts_silence() {
        let mut s = stage(false);
        let out = s.process(silence_chunk()).unwrap();
        assert!(out.is_some());
    }
}
