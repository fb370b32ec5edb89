//! Kaldi-compatible log-Mel filterbank
//!
//! Matches the option set the acoustic model was trained with: 25 ms Hamming
//! windows at a 10 ms shift, no dither, snip_edges, DC-offset removal,
//! 0.97 pre-emphasis, 512-point real FFT, power spectrum, 80 triangular mel
//! filters between 20 Hz and Nyquist, natural log with an epsilon floor.
//! Input is normalized f32 which is scaled back to int16 range first.

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use std::sync::Arc;

use sensestream_core::PCM16_NORMALIZE;

const PREEMPH_COEFF: f32 = 0.97;
const MEL_LOW_FREQ: f32 = 20.0;

pub struct FbankComputer {
    frame_len: usize,
    frame_shift: usize,
    n_fft: usize,
    n_mels: usize,
    window: Vec<f32>,
    /// Per-mel-bin triangular weights over FFT bins.
    mel_banks: Vec<Vec<f32>>,
    fft: Arc<dyn realfft::RealToComplex<f32>>,
}

impl FbankComputer {
    pub fn new(sample_rate: u32, n_mels: usize, frame_length_ms: f32, frame_shift_ms: f32) -> Self {
        let frame_len = (sample_rate as f32 * frame_length_ms / 1000.0) as usize;
        let frame_shift = (sample_rate as f32 * frame_shift_ms / 1000.0) as usize;
        let n_fft = frame_len.next_power_of_two();

        // Hamming window over the analysis frame
        let window: Vec<f32> = (0..frame_len)
            .map(|i| {
                let a = 2.0 * std::f32::consts::PI / (frame_len - 1) as f32;
                0.54 - 0.46 * (a * i as f32).cos()
            })
            .collect();

        let mel_banks = Self::create_mel_banks(sample_rate, n_fft, n_mels);

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);

        Self {
            frame_len,
            frame_shift,
            n_fft,
            n_mels,
            window,
            mel_banks,
            fft,
        }
    }

    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    fn hz_to_mel(hz: f32) -> f32 {
        1127.0 * (1.0 + hz / 700.0).ln()
    }

    /// Triangular filters with weights computed in the mel domain.
    fn create_mel_banks(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
        let nyquist = sample_rate as f32 / 2.0;
        let mel_low = Self::hz_to_mel(MEL_LOW_FREQ);
        let mel_high = Self::hz_to_mel(nyquist);
        let mel_delta = (mel_high - mel_low) / (n_mels + 1) as f32;

        let n_bins = n_fft / 2 + 1;
        let bin_width = sample_rate as f32 / n_fft as f32;

        let mut banks = Vec::with_capacity(n_mels);
        for m in 0..n_mels {
            let left = mel_low + m as f32 * mel_delta;
            let center = mel_low + (m + 1) as f32 * mel_delta;
            let right = mel_low + (m + 2) as f32 * mel_delta;

            let mut weights = vec![0.0f32; n_bins];
            for (bin, w) in weights.iter_mut().enumerate() {
                let mel = Self::hz_to_mel(bin as f32 * bin_width);
                if mel > left && mel < right {
                    *w = if mel <= center {
                        (mel - left) / (center - left)
                    } else {
                        (right - mel) / (right - center)
                    };
                }
            }
            banks.push(weights);
        }

        banks
    }

    /// Number of frames for an input length under snip_edges framing.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples < self.frame_len {
            0
        } else {
            (num_samples - self.frame_len) / self.frame_shift + 1
        }
    }

    /// Compute log-mel features. Returns one `n_mels`-wide row per frame.
    pub fn compute(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let n_frames = self.num_frames(samples.len());
        let mut features = Vec::with_capacity(n_frames);

        let mut buffer = vec![0.0f32; self.n_fft];
        let mut spectrum = vec![Complex::new(0.0f32, 0.0f32); self.n_fft / 2 + 1];

        for f in 0..n_frames {
            let start = f * self.frame_shift;
            let frame = &samples[start..start + self.frame_len];

            // Scale back to int16 amplitudes, matching training conditions
            let mut work: Vec<f32> = frame.iter().map(|&s| s * PCM16_NORMALIZE).collect();

            // Remove DC offset
            let mean = work.iter().sum::<f32>() / work.len() as f32;
            for s in work.iter_mut() {
                *s -= mean;
            }

            // Pre-emphasis, in reverse so each sample sees the raw
            // predecessor; the first sample references itself
            for i in (1..work.len()).rev() {
                work[i] -= PREEMPH_COEFF * work[i - 1];
            }
            work[0] -= PREEMPH_COEFF * work[0];

            // Window and zero-pad to the FFT size
            buffer.iter_mut().for_each(|s| *s = 0.0);
            for i in 0..self.frame_len {
                buffer[i] = work[i] * self.window[i];
            }

            let power: Vec<f32> = if self.fft.process(&mut buffer, &mut spectrum).is_ok() {
                spectrum.iter().map(|c| c.norm_sqr()).collect()
            } else {
                vec![0.0f32; self.n_fft / 2 + 1]
            };

            let mut row = Vec::with_capacity(self.n_mels);
            for bank in &self.mel_banks {
                let energy: f32 = bank
                    .iter()
                    .zip(power.iter())
                    .map(|(w, p)| w * p)
                    .sum();
                row.push(energy.max(f32::EPSILON).ln());
            }
            features.push(row);
        }

        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computer() -> FbankComputer {
        FbankComputer::new(16000, 80, 25.0, 10.0)
    }

    #[test]
    fn test_frame_geometry() {
        let fb = computer();
        assert_eq!(fb.frame_len, 400);
        assert_eq!(fb.frame_shift, 160);
        assert_eq!(fb.n_fft, 512);
        assert_eq!(fb.window.len(), 400);
        assert_eq!(fb.mel_banks.len(), 80);
    }

    #[test]
    fn test_snip_edges_frame_count() {
        let fb = computer();
        // 3 s at 16 kHz: (48000 - 400) / 160 + 1 = 298
        assert_eq!(fb.num_frames(48000), 298);
        // Exactly one window
        assert_eq!(fb.num_frames(400), 1);
        // Too short for any frame
        assert_eq!(fb.num_frames(399), 0);
    }

    #[test]
    fn test_compute_shapes() {
        let fb = computer();
        let audio: Vec<f32> = (0..16000)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 16000.0).sin())
            .collect();
        let feats = fb.compute(&audio);
        assert_eq!(feats.len(), fb.num_frames(16000));
        assert!(feats.iter().all(|row| row.len() == 80));
    }

    #[test]
    fn test_silence_hits_log_floor() {
        let fb = computer();
        let silence = vec![0.0f32; 4000];
        let feats = fb.compute(&silence);
        let floor = f32::EPSILON.ln();
        for row in &feats {
            for &v in row {
                assert!((v - floor).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_tone_excites_matching_band() {
        let fb = computer();
        // 1 kHz tone should put most energy into mid-frequency filters
        let audio: Vec<f32> = (0..8000)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 16000.0).sin())
            .collect();
        let feats = fb.compute(&audio);
        let row = &feats[feats.len() / 2];

        let peak_bin = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        // 1 kHz lands well below the top of an 80-bin mel scale to 8 kHz,
        // but clearly above the bottom filters.
        assert!(peak_bin > 10 && peak_bin < 60, "peak at {peak_bin}");
    }

    #[test]
    fn test_mel_banks_cover_spectrum() {
        let fb = computer();
        // Every interior FFT bin should be touched by at least one filter
        let n_bins = fb.n_fft / 2 + 1;
        for bin in 2..n_bins - 1 {
            let total: f32 = fb.mel_banks.iter().map(|b| b[bin]).sum();
            assert!(total > 0.0, "bin {bin} uncovered");
        }
    }
}
