//! Ambient-energy (noise floor) estimation
//!
//! Two phases: a bootstrap that collects RMS samples until enough audio has
//! been observed, then an adaptive phase fed by VAD non-speech decisions.
//! The floor feeds the VAD energy gate; until calibration completes the VAD
//! falls back to its static threshold.

use sensestream_config::constants::noise::{
    ADAPTIVE_WINDOW, HISTORY_CAP, MAX_STEP_RATIO, MIN_HISTORY, UPDATE_INTERVAL,
};

pub struct NoiseFloorEstimator {
    calib_needed_s: f64,
    adaptive: bool,

    bootstrap_rms: Vec<f32>,
    bootstrap_seen_s: f64,

    history: Vec<f32>,
    update_counter: u32,
    current: Option<f32>,
}

impl NoiseFloorEstimator {
    pub fn new(calib_needed_s: f64, adaptive: bool) -> Self {
        Self {
            calib_needed_s,
            adaptive,
            bootstrap_rms: Vec::new(),
            bootstrap_seen_s: 0.0,
            history: Vec::new(),
            update_counter: 0,
            current: None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.current.is_some()
    }

    /// Current floor, or `None` while still bootstrapping.
    pub fn get(&self) -> Option<f32> {
        self.current
    }

    /// Feed one bootstrap observation: the RMS of the accumulated audio
    /// prefix and that prefix's duration. Returns `true` exactly once, when
    /// calibration completes.
    pub fn absorb_bootstrap(&mut self, rms: f32, seen_s: f64) -> bool {
        if self.is_calibrated() {
            return false;
        }

        self.bootstrap_rms.push(rms);
        self.bootstrap_seen_s = self.bootstrap_seen_s.max(seen_s);

        if self.bootstrap_seen_s >= self.calib_needed_s {
            let floor = median(&mut self.bootstrap_rms.clone());
            self.current = Some(floor);
            tracing::info!(
                floor = format!("{floor:.6}"),
                over_s = self.calib_needed_s,
                "noise floor calibrated"
            );
            return true;
        }

        false
    }

    /// Adaptive update from a VAD non-speech decision. Recomputes the floor
    /// every `UPDATE_INTERVAL` calls once enough history exists.
    pub fn update(&mut self, rms: f32) {
        if !self.adaptive || !self.is_calibrated() {
            return;
        }

        self.history.push(rms);
        self.update_counter += 1;

        if self.update_counter % UPDATE_INTERVAL != 0 {
            return;
        }

        if self.history.len() < MIN_HISTORY {
            return;
        }

        let window_start = self.history.len().saturating_sub(ADAPTIVE_WINDOW);
        let mut window: Vec<f32> = self.history[window_start..].to_vec();
        let candidate = median(&mut window);
        self.set_floor(candidate);

        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(..excess);
        }
    }

    /// Clamp the floor so adjacent values never differ by more than 50:1.
    fn set_floor(&mut self, candidate: f32) {
        let clamped = match self.current {
            Some(prev) if prev > 0.0 => {
                candidate.clamp(prev / MAX_STEP_RATIO, prev * MAX_STEP_RATIO)
            },
            _ => candidate,
        };

        if Some(clamped) != self.current {
            tracing::debug!(
                floor = format!("{clamped:.6}"),
                "adaptive noise floor updated"
            );
        }
        self.current = Some(clamped);
    }
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
