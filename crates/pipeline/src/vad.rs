//! Multi-feature voice activity detection
//!
//! Cheap-to-expensive feature ladder: RMS energy first (mandatory
//! short-circuit on quiet windows), then zero-crossing rate, then — in
//! accurate mode only — normalized spectral entropy from an rFFT power
//! spectrum. All math is f32.

use realfft::RealFftPlanner;

use crate::PipelineError;
use sensestream_config::{VadConfig, VadMode};
use sensestream_core::audio::rms;

/// Per-window VAD decision and the features behind it.
#[derive(Clone, Copy, Debug)]
pub struct VadMetrics {
    pub rms: f32,
    pub zcr: f32,
    /// Normalized spectral entropy; -1.0 in fast mode (not computed).
    pub entropy: f32,
    pub is_speech: bool,
    pub energy_ok: bool,
    pub zcr_ok: bool,
    pub entropy_ok: bool,
}

impl VadMetrics {
    /// Metrics for a window rejected by the energy gate alone.
    fn quiet(rms: f32) -> Self {
        Self {
            rms,
            zcr: 0.0,
            entropy: 1.0,
            is_speech: false,
            energy_ok: false,
            zcr_ok: false,
            entropy_ok: false,
        }
    }

    /// Metrics for a window accepted without running the detector.
    pub(crate) fn bypass(rms: f32) -> Self {
        Self {
            rms,
            zcr: 0.0,
            entropy: -1.0,
            is_speech: true,
            energy_ok: true,
            zcr_ok: true,
            entropy_ok: true,
        }
    }
}

pub struct VoiceActivityDetector {
    config: VadConfig,
    rms_margin: f32,
    planner: RealFftPlanner<f32>,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig, rms_margin: f32) -> Self {
        Self {
            config,
            rms_margin,
            planner: RealFftPlanner::new(),
        }
    }

    /// Classify one 16 kHz window. The energy gate short-circuits: ZCR and
    /// entropy are never computed for windows below the threshold.
    pub fn assess(&mut self, samples: &[f32], noise_floor: Option<f32>) -> VadMetrics {
        let rms_value = rms(samples);

        let energy_threshold = match noise_floor {
            Some(floor) => floor + self.rms_margin,
            None => self.config.vad_energy_threshold,
        };

        if rms_value <= energy_threshold {
            return VadMetrics::quiet(rms_value);
        }

        let zcr = zero_crossing_rate(samples);
        let zcr_ok = self.config.vad_zcr_min < zcr && zcr < self.config.vad_zcr_max;

        if self.config.vad_mode == VadMode::Fast {
            return VadMetrics {
                rms: rms_value,
                zcr,
                entropy: -1.0,
                is_speech: zcr_ok,
                energy_ok: true,
                zcr_ok,
                entropy_ok: true,
            };
        }

        let entropy = match self.spectral_entropy(samples) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "spectral entropy failed, treating as maximal");
                1.0
            },
        };
        let entropy_ok = entropy < self.config.vad_entropy_max;

        VadMetrics {
            rms: rms_value,
            zcr,
            entropy,
            is_speech: zcr_ok || entropy_ok,
            energy_ok: true,
            zcr_ok,
            entropy_ok,
        }
    }

    /// Normalized spectral entropy of the window's rFFT power spectrum.
    ///
    /// Zero-power bins are excluded from both the entropy sum and the
    /// max-entropy normalizer.
    fn spectral_entropy(&mut self, samples: &[f32]) -> Result<f32, PipelineError> {
        if samples.len() < 2 {
            return Ok(1.0);
        }

        let fft = self.planner.plan_fft_forward(samples.len());
        let mut input = samples.to_vec();
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut input, &mut spectrum)
            .map_err(|e| PipelineError::Audio(e.to_string()))?;

        let power: Vec<f32> = spectrum.iter().map(|c| c.norm_sqr()).collect();
        let total: f32 = power.iter().sum();

        const EPS: f32 = 1e-12;
        let mut entropy = 0.0f32;
        let mut nonzero = 0usize;
        for &p in &power {
            let psd = p / (total + EPS);
            if psd > EPS {
                entropy -= psd * psd.log2();
                nonzero += 1;
            }
        }

        if nonzero == 0 {
            return Ok(1.0);
        }

        let max_entropy = (nonzero as f32).log2();
        if max_entropy > 0.0 {
            Ok(entropy / max_entropy)
        } else {
            Ok(1.0)
        }
    }
}

/// Fraction of adjacent sample pairs whose signs differ.
fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }

    let crossings = samples
        .windows(2)
        .filter(|pair| pair[0] * pair[1] < 0.0)
        .count();

    crossings as f32 / samples.len() as f32
}
