//! Language auto-lock
//!
//! Sessions usually stay in one language. During a warmup window the LID
//! tags of accepted windows are collected as votes; once the window has
//! elapsed with enough samples, the majority language is locked in and fed
//! back into the preprocessing query prefix. An inconclusive warmup
//! abandons the attempt and stays in auto mode for the session.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

use sensestream_config::LanguageLockConfig;
use sensestream_core::Labels;

/// Externally observable lock state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockState {
    /// Pre-warmup, no speech seen yet.
    Auto,
    /// Collecting detections.
    Warming,
    /// Majority language locked for the session.
    Locked(String),
    /// Warmup ended inconclusively; stays auto permanently.
    Abandoned,
}

/// Terminal transition reported exactly once, for status emission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockOutcome {
    Locked(String),
    Abandoned,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct LanguageLockStatus {
    pub enabled: bool,
    pub locked: bool,
    pub current_language: String,
    pub detections: usize,
    pub distribution: HashMap<String, usize>,
}

struct LockInner {
    state: LockState,
    warmup_start: Option<Instant>,
    detections: Vec<String>,
}

pub struct LanguageLock {
    config: LanguageLockConfig,
    labels: Labels,
    initial_language: String,
    inner: Mutex<LockInner>,
}

impl LanguageLock {
    pub fn new(config: LanguageLockConfig, labels: Labels, initial_language: &str) -> Self {
        // A concrete initial language is a pre-locked session
        let state = if initial_language != "auto" {
            LockState::Locked(initial_language.to_string())
        } else {
            LockState::Auto
        };

        if config.enable_language_lock && state == LockState::Auto {
            tracing::info!(
                warmup_s = config.language_lock_warmup_s,
                "language auto-lock enabled"
            );
        } else if let LockState::Locked(lang) = &state {
            tracing::info!(language = %lang, "language pre-locked");
        }

        Self {
            config,
            labels,
            initial_language: initial_language.to_string(),
            inner: Mutex::new(LockInner {
                state,
                warmup_start: None,
                detections: Vec::new(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enable_language_lock
    }

    pub fn is_locked(&self) -> bool {
        matches!(
            self.inner.lock().state,
            LockState::Locked(_) | LockState::Abandoned
        )
    }

    /// Language code used for the query prefix: the locked code, or `auto`.
    pub fn current_language(&self) -> String {
        match &self.inner.lock().state {
            LockState::Locked(code) => code.clone(),
            _ => "auto".to_string(),
        }
    }

    /// Begin the warmup window. Called by preprocessing on the first speech
    /// window; later calls are no-ops.
    pub fn start_warmup(&self) {
        if !self.config.enable_language_lock {
            return;
        }

        let mut inner = self.inner.lock();
        if inner.state == LockState::Auto && inner.warmup_start.is_none() {
            inner.warmup_start = Some(Instant::now());
            inner.state = LockState::Warming;
            tracing::info!("language detection warmup started");
        }
    }

    /// Record a detected language (full name, e.g. `English`). Returns the
    /// terminal transition when this detection decides the session.
    pub fn record_detection(&self, language_name: &str) -> Option<LockOutcome> {
        if !self.config.enable_language_lock {
            return None;
        }

        let mut inner = self.inner.lock();
        if matches!(inner.state, LockState::Locked(_) | LockState::Abandoned) {
            return None;
        }

        if inner.warmup_start.is_none() {
            inner.warmup_start = Some(Instant::now());
            inner.state = LockState::Warming;
        }

        let Some(code) = self.labels.language_code(language_name) else {
            tracing::debug!(language = %language_name, "unknown language name ignored");
            return None;
        };
        inner.detections.push(code.to_string());

        self.check_lock_conditions(&mut inner)
    }

    fn check_lock_conditions(&self, inner: &mut LockInner) -> Option<LockOutcome> {
        let started = inner.warmup_start?;
        if started.elapsed().as_secs_f64() < self.config.language_lock_warmup_s {
            return None;
        }

        // Not enough votes yet: keep warming until min_samples accumulate
        if inner.detections.len() < self.config.language_lock_min_samples {
            return None;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for code in &inner.detections {
            *counts.entry(code.as_str()).or_insert(0) += 1;
        }
        let (top, count) = counts
            .iter()
            .max_by_key(|(_, &c)| c)
            .map(|(&code, &c)| (code.to_string(), c))?;

        let confidence = count as f32 / inner.detections.len() as f32;
        if confidence >= self.config.language_lock_confidence {
            tracing::info!(
                language = %top,
                confidence = format!("{:.1}%", confidence * 100.0),
                samples = count,
                total = inner.detections.len(),
                "language locked"
            );
            inner.state = LockState::Locked(top.clone());
            Some(LockOutcome::Locked(top))
        } else {
            tracing::info!(
                best = %top,
                confidence = format!("{:.1}%", confidence * 100.0),
                "language detection inconclusive, staying in auto mode"
            );
            inner.state = LockState::Abandoned;
            Some(LockOutcome::Abandoned)
        }
    }

    pub fn status(&self) -> LanguageLockStatus {
        let inner = self.inner.lock();
        let mut distribution = HashMap::new();
        for code in &inner.detections {
            *distribution.entry(code.clone()).or_insert(0) += 1;
        }

        LanguageLockStatus {
            enabled: self.config.enable_language_lock,
            locked: matches!(inner.state, LockState::Locked(_) | LockState::Abandoned),
            current_language: match &inner.state {
                LockState::Locked(code) => code.clone(),
                _ => "auto".to_string(),
            },
            detections: inner.detections.len(),
            distribution,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = if self.initial_language != "auto" {
            LockState::Locked(self.initial_language.clone())
        } else {
            LockState::Auto
        };
        inner.warmup_start = None;
        inner.detections.clear();
        tracing::info!("language lock reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_with(warmup_s: f64, min_samples: usize, confidence: f32) -> LanguageLock {
        LanguageLock::new(
            LanguageLockConfig {
                enable_language_lock: true,
                language_lock_warmup_s: warmup_s,
                language_lock_min_samples: min_samples,
                language_lock_confidence: confidence,
            },
            Labels::new(),
            "auto",
        )
    }

    #[test]
    fn test_majority_vote_locks() {
        let lock = lock_with(0.0, 3, 0.6);

        let sequence = [
            "English", "English", "English", "Chinese", "English", "English",
        ];
        let mut outcome = None;
        for name in sequence {
            if let Some(o) = lock.record_detection(name) {
                outcome = Some(o);
                break;
            }
        }

        // With warmup_s = 0 the decision lands as soon as min_samples is met
        assert_eq!(outcome, Some(LockOutcome::Locked("en".to_string())));
        assert!(lock.is_locked());
        assert_eq!(lock.current_language(), "en");
    }

    #[test]
    fn test_six_votes_five_to_one() {
        // warmup_s = 0, min_samples high enough that the decision uses all
        // six votes: 5/6 = 0.833 ≥ 0.6 → locked to en.
        let lock = lock_with(0.0, 6, 0.6);
        let sequence = [
            "English", "English", "English", "Chinese", "English", "English",
        ];
        let mut outcome = None;
        for name in sequence {
            if let Some(o) = lock.record_detection(name) {
                outcome = Some(o);
            }
        }
        assert_eq!(outcome, Some(LockOutcome::Locked("en".to_string())));
        assert_eq!(lock.current_language(), "en");

        // Further records have no observable effect
        assert!(lock.record_detection("Chinese").is_none());
        assert_eq!(lock.current_language(), "en");
    }

    #[test]
    fn test_inconclusive_vote_abandons() {
        let lock = lock_with(0.0, 4, 0.9);
        let mut outcome = None;
        for name in ["English", "Chinese", "English", "Chinese"] {
            if let Some(o) = lock.record_detection(name) {
                outcome = Some(o);
            }
        }
        assert_eq!(outcome, Some(LockOutcome::Abandoned));
        assert!(lock.is_locked());
        assert_eq!(lock.current_language(), "auto");
    }

    #[test]
    fn test_warmup_holds_decision() {
        let lock = lock_with(60.0, 1, 0.5);
        assert!(lock.record_detection("English").is_none());
        assert!(!lock.is_locked());
        assert_eq!(lock.current_language(), "auto");
    }

    #[test]
    fn test_pre_locked_language() {
        let lock = LanguageLock::new(
            LanguageLockConfig::default(),
            Labels::new(),
            "ja",
        );
        assert!(lock.is_locked());
        assert_eq!(lock.current_language(), "ja");
        assert!(lock.record_detection("English").is_none());
        assert_eq!(lock.current_language(), "ja");
    }

    #[test]
    fn test_disabled_lock_ignores_everything() {
        let lock = LanguageLock::new(
            LanguageLockConfig {
                enable_language_lock: false,
                ..LanguageLockConfig::default()
            },
            Labels::new(),
            "auto",
        );
        lock.start_warmup();
        assert!(lock.record_detection("English").is_none());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_unknown_language_name_not_counted() {
        let lock = lock_with(0.0, 1, 0.5);
        assert!(lock.record_detection("Klingon").is_none());
        assert_eq!(lock.status().detections, 0);
    }

    #[test]
    fn test_status_distribution() {
        let lock = lock_with(60.0, 10, 0.5);
        lock.record_detection("English");
        lock.record_detection("English");
        lock.record_detection("Chinese");

        let status = lock.status();
        assert_eq!(status.detections, 3);
        assert_eq!(status.distribution["en"], 2);
        assert_eq!(status.distribution["zh"], 1);
        assert!(!status.locked);
    }
}
