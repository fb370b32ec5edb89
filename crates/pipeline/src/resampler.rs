//! Device-rate → model-rate resampling
//!
//! Identity passthrough when the device already runs at 16 kHz, otherwise an
//! FFT resampler with a linear-interpolation fallback for buffers too short
//! or odd-shaped for the FFT path.

use rubato::{FftFixedIn, Resampler as RubatoResampler};

use sensestream_config::constants::audio::MODEL_SAMPLE_RATE;
use sensestream_core::PCM16_NORMALIZE;

/// Minimum input length for the FFT path; shorter buffers go linear.
const MIN_FFT_INPUT: usize = 64;

const FFT_CHUNK: usize = 1024;

pub struct Resampler {
    device_rate: u32,
    model_rate: u32,
}

impl Resampler {
    pub fn new(device_rate: u32) -> Self {
        Self {
            device_rate,
            model_rate: MODEL_SAMPLE_RATE,
        }
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Normalize int16 samples to [-1, 1] f32 at the model rate.
    pub fn resample(&self, samples: &[i16]) -> Vec<f32> {
        let normalized: Vec<f32> = samples
            .iter()
            .map(|&s| s as f32 / PCM16_NORMALIZE)
            .collect();

        if self.device_rate == self.model_rate {
            return normalized;
        }

        if normalized.len() < MIN_FFT_INPUT {
            return self.resample_linear(&normalized);
        }

        match self.resample_fft(&normalized) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(error = %e, "FFT resampling failed, using linear fallback");
                self.resample_linear(&normalized)
            },
        }
    }

    fn expected_len(&self, input_len: usize) -> usize {
        (input_len as f64 * self.model_rate as f64 / self.device_rate as f64).round() as usize
    }

    fn resample_fft(&self, input: &[f32]) -> Result<Vec<f32>, String> {
        let samples_f64: Vec<f64> = input.iter().map(|&s| s as f64).collect();

        let mut resampler = FftFixedIn::<f64>::new(
            self.device_rate as usize,
            self.model_rate as usize,
            FFT_CHUNK,
            2,
            1,
        )
        .map_err(|e| e.to_string())?;

        let mut output = Vec::with_capacity(self.expected_len(input.len()));
        let mut pos = 0;

        while pos + FFT_CHUNK <= samples_f64.len() {
            let frames = vec![samples_f64[pos..pos + FFT_CHUNK].to_vec()];
            let out = resampler.process(&frames, None).map_err(|e| e.to_string())?;
            output.extend(out[0].iter().map(|&s| s as f32));
            pos += FFT_CHUNK;
        }

        if pos < samples_f64.len() {
            let frames = vec![samples_f64[pos..].to_vec()];
            let out = resampler
                .process_partial(Some(&frames), None)
                .map_err(|e| e.to_string())?;
            output.extend(out[0].iter().map(|&s| s as f32));
        }

        // Flush the resampler's internal delay line.
        let out = resampler
            .process_partial::<Vec<f64>>(None, None)
            .map_err(|e| e.to_string())?;
        output.extend(out[0].iter().map(|&s| s as f32));

        // The FFT path pads with latency samples; trim/extend to the exact
        // length the rate ratio implies so window durations stay fixed.
        let expected = self.expected_len(input.len());
        match output.len().cmp(&expected) {
            std::cmp::Ordering::Greater => {
                // Latency sits at the front of the stream.
                let excess = output.len() - expected;
                output.drain(..excess);
            },
            std::cmp::Ordering::Less => {
                output.resize(expected, 0.0);
            },
            std::cmp::Ordering::Equal => {},
        }

        Ok(output)
    }

    fn resample_linear(&self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }

        let ratio = self.model_rate as f64 / self.device_rate as f64;
        let new_len = (input.len() as f64 * ratio).round() as usize;

        let mut out = Vec::with_capacity(new_len);
        for i in 0..new_len {
            let src_idx = i as f64 / ratio;
            let idx_floor = src_idx.floor() as usize;
            let idx_ceil = (idx_floor + 1).min(input.len() - 1);
            let frac = (src_idx - idx_floor as f64) as f32;

            let sample = input[idx_floor.min(input.len() - 1)] * (1.0 - frac)
                + input[idx_ceil] * frac;
            out.push(sample);
        }

        out
    }
}
