//! Main settings module

use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::ConfigError;
use sensestream_core::Labels;

/// VAD operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VadMode {
    /// RMS + ZCR only (~0.3 ms per window).
    Fast,
    /// Adds spectral entropy from an rFFT (~1.5 ms per window).
    #[default]
    Accurate,
}

impl FromStr for VadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(VadMode::Fast),
            "accurate" => Ok(VadMode::Accurate),
            other => Err(format!("unknown vad mode '{other}'")),
        }
    }
}

/// Audio framing and calibration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Window duration fed to the model, seconds.
    #[serde(default = "default_chunk_duration_s")]
    pub chunk_duration_s: f64,

    /// Overlap shared between successive windows, seconds.
    #[serde(default = "default_overlap_duration_s")]
    pub overlap_duration_s: f64,

    /// Device callback buffer size in frames.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Noise-floor bootstrap duration, seconds.
    #[serde(default = "default_noise_calib_secs")]
    pub noise_calib_secs: f64,

    /// Margin above the noise floor for the energy gate.
    #[serde(default = "default_rms_margin")]
    pub rms_margin: f32,

    /// Optional device name hint for the capture driver.
    #[serde(default)]
    pub audio_device: Option<String>,
}

fn default_chunk_duration_s() -> f64 {
    3.0
}
fn default_overlap_duration_s() -> f64 {
    1.5
}
fn default_chunk_size() -> usize {
    1024
}
fn default_noise_calib_secs() -> f64 {
    1.5
}
fn default_rms_margin() -> f32 {
    0.004
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_duration_s: default_chunk_duration_s(),
            overlap_duration_s: default_overlap_duration_s(),
            chunk_size: default_chunk_size(),
            noise_calib_secs: default_noise_calib_secs(),
            rms_margin: default_rms_margin(),
            audio_device: None,
        }
    }
}

impl AudioConfig {
    pub fn chunk_duration_ms(&self) -> f64 {
        self.chunk_duration_s * 1000.0
    }
}

/// Voice activity detection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_true")]
    pub enable_vad: bool,

    #[serde(default)]
    pub vad_mode: VadMode,

    /// Static energy threshold used before the noise floor is calibrated.
    #[serde(default = "default_vad_energy_threshold")]
    pub vad_energy_threshold: f32,

    #[serde(default = "default_vad_zcr_min")]
    pub vad_zcr_min: f32,

    #[serde(default = "default_vad_zcr_max")]
    pub vad_zcr_max: f32,

    #[serde(default = "default_vad_entropy_max")]
    pub vad_entropy_max: f32,

    #[serde(default = "default_true")]
    pub adaptive_noise_floor: bool,
}

fn default_vad_energy_threshold() -> f32 {
    0.01
}
fn default_vad_zcr_min() -> f32 {
    0.02
}
fn default_vad_zcr_max() -> f32 {
    0.35
}
fn default_vad_entropy_max() -> f32 {
    0.85
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enable_vad: true,
            vad_mode: VadMode::default(),
            vad_energy_threshold: default_vad_energy_threshold(),
            vad_zcr_min: default_vad_zcr_min(),
            vad_zcr_max: default_vad_zcr_max(),
            vad_entropy_max: default_vad_entropy_max(),
            adaptive_noise_floor: true,
        }
    }
}

/// Feature extraction and model-input options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    #[serde(default = "default_mel_bins")]
    pub mel_bins: usize,

    /// Speech feature frames are truncated to this count before assembly.
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,

    /// LFR stacking width.
    #[serde(default = "default_lfr_m")]
    pub lfr_m: usize,

    /// LFR frame-rate divisor.
    #[serde(default = "default_lfr_n")]
    pub lfr_n: usize,

    #[serde(default = "default_true")]
    pub use_itn: bool,

    /// Initial language code (`auto` enables LID + lock).
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_mel_bins() -> usize {
    80
}
fn default_max_frames() -> usize {
    3000
}
fn default_lfr_m() -> usize {
    7
}
fn default_lfr_n() -> usize {
    6
}
fn default_language() -> String {
    "auto".to_string()
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            mel_bins: default_mel_bins(),
            max_frames: default_max_frames(),
            lfr_m: default_lfr_m(),
            lfr_n: default_lfr_n(),
            use_itn: true,
            language: default_language(),
        }
    }
}

/// Decoder gates and boundary stitching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Minimum alphanumeric characters required in a decoded window.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,

    /// Fuzzy duplicate suppression similarity threshold.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_duplicate_cooldown_s")]
    pub duplicate_cooldown_s: f64,

    #[serde(default = "default_true")]
    pub enable_confidence_stitching: bool,

    /// Confidence below which a chunk tail is considered unreliable.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Words tracked at each chunk boundary for stitching.
    #[serde(default = "default_overlap_word_count")]
    pub overlap_word_count: usize,
}

fn default_min_chars() -> usize {
    3
}
fn default_similarity_threshold() -> f32 {
    0.85
}
fn default_duplicate_cooldown_s() -> f64 {
    4.0
}
fn default_confidence_threshold() -> f32 {
    0.6
}
fn default_overlap_word_count() -> usize {
    4
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            similarity_threshold: default_similarity_threshold(),
            duplicate_cooldown_s: default_duplicate_cooldown_s(),
            enable_confidence_stitching: true,
            confidence_threshold: default_confidence_threshold(),
            overlap_word_count: default_overlap_word_count(),
        }
    }
}

/// Global-timeline merge options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default = "default_true")]
    pub enable_timeline_merging: bool,

    /// Confidence margin a replacement word must clear.
    #[serde(default = "default_timeline_overlap_confidence")]
    pub timeline_overlap_confidence: f32,

    /// Words below this confidence are never placed on the timeline.
    #[serde(default = "default_timeline_min_word_confidence")]
    pub timeline_min_word_confidence: f32,

    #[serde(default = "default_true")]
    pub timeline_confidence_replacement: bool,
}

fn default_timeline_overlap_confidence() -> f32 {
    0.6
}
fn default_timeline_min_word_confidence() -> f32 {
    0.4
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            enable_timeline_merging: true,
            timeline_overlap_confidence: default_timeline_overlap_confidence(),
            timeline_min_word_confidence: default_timeline_min_word_confidence(),
            timeline_confidence_replacement: true,
        }
    }
}

/// Language auto-lock warmup options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageLockConfig {
    #[serde(default = "default_true")]
    pub enable_language_lock: bool,

    #[serde(default = "default_language_lock_warmup_s")]
    pub language_lock_warmup_s: f64,

    #[serde(default = "default_language_lock_min_samples")]
    pub language_lock_min_samples: usize,

    /// Fraction of warmup detections that must agree to lock.
    #[serde(default = "default_language_lock_confidence")]
    pub language_lock_confidence: f32,
}

fn default_language_lock_warmup_s() -> f64 {
    10.0
}
fn default_language_lock_min_samples() -> usize {
    3
}
fn default_language_lock_confidence() -> f32 {
    0.6
}

impl Default for LanguageLockConfig {
    fn default() -> Self {
        Self {
            enable_language_lock: true,
            language_lock_warmup_s: default_language_lock_warmup_s(),
            language_lock_min_samples: default_language_lock_min_samples(),
            language_lock_confidence: default_language_lock_confidence(),
        }
    }
}

/// Metadata filtering and console display options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Skip windows where background music was detected.
    #[serde(default = "default_true")]
    pub filter_bgm: bool,

    /// Audio event tags that drop a window entirely.
    #[serde(default)]
    pub filter_events: Vec<String>,

    /// Emotion emoji on the console line. Display-only; the wire record
    /// always carries the emotion field.
    #[serde(default)]
    pub show_emotions: bool,

    #[serde(default = "default_true")]
    pub show_events: bool,

    #[serde(default = "default_true")]
    pub show_language: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            filter_bgm: true,
            filter_events: Vec::new(),
            show_emotions: false,
            show_events: true,
            show_language: true,
        }
    }
}

/// Bounded queue capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_preprocess_queue")]
    pub preprocess: usize,

    #[serde(default = "default_inference_queue")]
    pub inference: usize,

    #[serde(default = "default_postprocess_queue")]
    pub postprocess: usize,

    #[serde(default = "default_emit_queue")]
    pub emit: usize,
}

fn default_preprocess_queue() -> usize {
    3
}
fn default_inference_queue() -> usize {
    2
}
fn default_postprocess_queue() -> usize {
    2
}
fn default_emit_queue() -> usize {
    10
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            preprocess: default_preprocess_queue(),
            inference: default_inference_queue(),
            postprocess: default_postprocess_queue(),
            emit: default_emit_queue(),
        }
    }
}

/// Paths to the model artifacts loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPaths {
    #[serde(default = "default_model_path")]
    pub model_path: String,

    #[serde(default = "default_embedding_path")]
    pub embedding_path: String,

    #[serde(default = "default_bpe_path")]
    pub bpe_path: String,

    #[serde(default = "default_cmvn_path")]
    pub cmvn_path: String,
}

fn default_model_path() -> String {
    "models/sensevoice/sense-voice-encoder.onnx".to_string()
}
fn default_embedding_path() -> String {
    "models/sensevoice/embedding.npy".to_string()
}
fn default_bpe_path() -> String {
    "models/sensevoice/vocab.json".to_string()
}
fn default_cmvn_path() -> String {
    "models/sensevoice/am.mvn".to_string()
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            embedding_path: default_embedding_path(),
            bpe_path: default_bpe_path(),
            cmvn_path: default_cmvn_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub vad: VadConfig,

    #[serde(default)]
    pub frontend: FrontendConfig,

    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub timeline: TimelineConfig,

    #[serde(default)]
    pub language_lock: LanguageLockConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub queues: QueueConfig,

    #[serde(default)]
    pub models: ModelPaths,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply environment-variable overrides. Invalid values warn and keep
    /// whatever was already configured.
    pub fn apply_env_overrides(&mut self) {
        env_override("CHUNK_DURATION_S", &mut self.audio.chunk_duration_s);
        env_override("OVERLAP_DURATION_S", &mut self.audio.overlap_duration_s);
        env_override("CHUNK_SIZE", &mut self.audio.chunk_size);
        env_override("NOISE_CALIB_SECS", &mut self.audio.noise_calib_secs);
        env_override("RMS_MARGIN", &mut self.audio.rms_margin);
        env_override_opt_string("AUDIO_DEVICE", &mut self.audio.audio_device);

        env_override_bool("ENABLE_VAD", &mut self.vad.enable_vad);
        env_override("VAD_MODE", &mut self.vad.vad_mode);
        env_override("VAD_ENERGY_THRESHOLD", &mut self.vad.vad_energy_threshold);
        env_override("VAD_ZCR_MIN", &mut self.vad.vad_zcr_min);
        env_override("VAD_ZCR_MAX", &mut self.vad.vad_zcr_max);
        env_override("VAD_ENTROPY_MAX", &mut self.vad.vad_entropy_max);
        env_override_bool("ADAPTIVE_NOISE_FLOOR", &mut self.vad.adaptive_noise_floor);

        env_override("MEL_BINS", &mut self.frontend.mel_bins);
        env_override("MAX_FRAMES", &mut self.frontend.max_frames);
        env_override("LFR_M", &mut self.frontend.lfr_m);
        env_override("LFR_N", &mut self.frontend.lfr_n);
        env_override_bool("USE_ITN", &mut self.frontend.use_itn);
        env_override("LANGUAGE", &mut self.frontend.language);

        env_override("MIN_CHARS", &mut self.decoder.min_chars);
        env_override("SIMILARITY_THRESHOLD", &mut self.decoder.similarity_threshold);
        env_override("DUPLICATE_COOLDOWN_S", &mut self.decoder.duplicate_cooldown_s);
        env_override_bool(
            "ENABLE_CONFIDENCE_STITCHING",
            &mut self.decoder.enable_confidence_stitching,
        );
        env_override("CONFIDENCE_THRESHOLD", &mut self.decoder.confidence_threshold);
        env_override("OVERLAP_WORD_COUNT", &mut self.decoder.overlap_word_count);

        env_override_bool(
            "ENABLE_TIMELINE_MERGING",
            &mut self.timeline.enable_timeline_merging,
        );
        env_override(
            "TIMELINE_OVERLAP_CONFIDENCE",
            &mut self.timeline.timeline_overlap_confidence,
        );
        env_override(
            "TIMELINE_MIN_WORD_CONFIDENCE",
            &mut self.timeline.timeline_min_word_confidence,
        );
        env_override_bool(
            "TIMELINE_CONFIDENCE_REPLACEMENT",
            &mut self.timeline.timeline_confidence_replacement,
        );

        env_override_bool(
            "ENABLE_LANGUAGE_LOCK",
            &mut self.language_lock.enable_language_lock,
        );
        env_override(
            "LANGUAGE_LOCK_WARMUP_S",
            &mut self.language_lock.language_lock_warmup_s,
        );
        env_override(
            "LANGUAGE_LOCK_MIN_SAMPLES",
            &mut self.language_lock.language_lock_min_samples,
        );
        env_override(
            "LANGUAGE_LOCK_CONFIDENCE",
            &mut self.language_lock.language_lock_confidence,
        );

        env_override_bool("FILTER_BGM", &mut self.display.filter_bgm);
        env_override_list("FILTER_EVENTS", &mut self.display.filter_events);
        env_override_bool("SHOW_EMOTIONS", &mut self.display.show_emotions);
        env_override_bool("SHOW_EVENTS", &mut self.display.show_events);
        env_override_bool("SHOW_LANGUAGE", &mut self.display.show_language);

        env_override("PIPELINE_PREPROCESS_QUEUE_SIZE", &mut self.queues.preprocess);
        env_override("PIPELINE_INFERENCE_QUEUE_SIZE", &mut self.queues.inference);
        env_override("PIPELINE_POSTPROCESS_QUEUE_SIZE", &mut self.queues.postprocess);
        env_override("PIPELINE_EMIT_QUEUE_SIZE", &mut self.queues.emit);

        env_override("MODEL_PATH", &mut self.models.model_path);
        env_override("EMBEDDING_PATH", &mut self.models.embedding_path);
        env_override("BPE_PATH", &mut self.models.bpe_path);
        env_override("CMVN_PATH", &mut self.models.cmvn_path);
    }

    /// Clamp out-of-range values with a warning, mirroring startup behavior
    /// of the capture service this replaces.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if !(0.1..=10.0).contains(&self.audio.chunk_duration_s) {
            tracing::warn!(
                value = self.audio.chunk_duration_s,
                "chunk_duration_s out of range, resetting to 3.0"
            );
            self.audio.chunk_duration_s = 3.0;
        }

        if self.audio.overlap_duration_s < 0.0
            || self.audio.overlap_duration_s >= self.audio.chunk_duration_s
        {
            let fallback = self.audio.chunk_duration_s * 0.5;
            tracing::warn!(
                value = self.audio.overlap_duration_s,
                fallback,
                "overlap_duration_s invalid, resetting"
            );
            self.audio.overlap_duration_s = fallback;
        }

        let labels = Labels::new();
        if !labels.is_valid_language_setting(&self.frontend.language) {
            tracing::warn!(
                language = %self.frontend.language,
                "unknown language setting, falling back to auto"
            );
            self.frontend.language = "auto".to_string();
        }

        if self.vad.vad_zcr_min >= self.vad.vad_zcr_max {
            return Err(ConfigError::InvalidValue {
                field: "vad_zcr_min".to_string(),
                message: format!(
                    "zcr window is empty ({} >= {})",
                    self.vad.vad_zcr_min, self.vad.vad_zcr_max
                ),
            });
        }

        if self.queues.preprocess == 0
            || self.queues.inference == 0
            || self.queues.postprocess == 0
            || self.queues.emit == 0
        {
            return Err(ConfigError::InvalidValue {
                field: "queues".to_string(),
                message: "queue capacities must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    /// Check the model artifacts exist. Startup aborts on the first miss.
    pub fn validate_model_paths(&self) -> Result<(), ConfigError> {
        let required = [
            ("model", &self.models.model_path),
            ("embedding table", &self.models.embedding_path),
            ("tokenizer", &self.models.bpe_path),
            ("cmvn", &self.models.cmvn_path),
        ];
        for (kind, path) in required {
            if !Path::new(path).exists() {
                return Err(ConfigError::MissingFile {
                    kind,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Load settings: defaults ← optional TOML file ← environment overrides.
pub fn load_settings(file: Option<&str>) -> Result<Settings, ConfigError> {
    let mut settings = match file {
        Some(path) if Path::new(path).exists() => {
            let loaded = Config::builder()
                .add_source(File::with_name(path))
                .build()?;
            loaded.try_deserialize::<Settings>()?
        },
        Some(path) => {
            return Err(ConfigError::FileNotFound(path.to_string()));
        },
        None => Settings::default(),
    };

    settings.apply_env_overrides();
    settings.validate()?;
    Ok(settings)
}

fn env_override<T>(key: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(e) => tracing::warn!(var = key, value = %raw, error = %e, "invalid env override, using default"),
        }
    }
}

fn env_override_bool(key: &str, slot: &mut bool) {
    if let Ok(raw) = std::env::var(key) {
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => *slot = true,
            "false" | "0" | "no" => *slot = false,
            other => {
                tracing::warn!(var = key, value = %other, "invalid boolean env override, using default")
            },
        }
    }
}

fn env_override_list(key: &str, slot: &mut Vec<String>) {
    if let Ok(raw) = std::env::var(key) {
        *slot = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
}

fn env_override_opt_string(key: &str, slot: &mut Option<String>) {
    if let Ok(raw) = std::env::var(key) {
        if raw.is_empty() {
            *slot = None;
        } else {
            *slot = Some(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that read or write process environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.audio.chunk_duration_s, 3.0);
        assert_eq!(s.audio.overlap_duration_s, 1.5);
        assert_eq!(s.audio.chunk_size, 1024);
        assert_eq!(s.audio.noise_calib_secs, 1.5);
        assert!((s.audio.rms_margin - 0.004).abs() < 1e-9);
        assert!(s.vad.enable_vad);
        assert_eq!(s.vad.vad_mode, VadMode::Accurate);
        assert_eq!(s.frontend.mel_bins, 80);
        assert_eq!(s.frontend.lfr_m, 7);
        assert_eq!(s.frontend.lfr_n, 6);
        assert_eq!(s.frontend.language, "auto");
        assert_eq!(s.decoder.min_chars, 3);
        assert_eq!(s.decoder.overlap_word_count, 4);
        assert!(s.timeline.enable_timeline_merging);
        assert_eq!(s.language_lock.language_lock_min_samples, 3);
        assert!(s.display.filter_bgm);
        assert!(!s.display.show_emotions);
        assert_eq!(s.queues.preprocess, 3);
        assert_eq!(s.queues.inference, 2);
        assert_eq!(s.queues.postprocess, 2);
        assert_eq!(s.queues.emit, 10);
    }

    #[test]
    fn test_validate_clamps_chunk_and_overlap() {
        let mut s = Settings::default();
        s.audio.chunk_duration_s = 42.0;
        s.validate().unwrap();
        assert_eq!(s.audio.chunk_duration_s, 3.0);

        let mut s = Settings::default();
        s.audio.overlap_duration_s = 5.0; // >= chunk duration
        s.validate().unwrap();
        assert_eq!(s.audio.overlap_duration_s, 1.5);
    }

    #[test]
    fn test_validate_resets_unknown_language() {
        let mut s = Settings::default();
        s.frontend.language = "klingon".to_string();
        s.validate().unwrap();
        assert_eq!(s.frontend.language, "auto");
    }

    #[test]
    fn test_validate_rejects_empty_zcr_window() {
        let mut s = Settings::default();
        s.vad.vad_zcr_min = 0.5;
        s.vad.vad_zcr_max = 0.3;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_env_override_valid_and_invalid() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CHUNK_DURATION_S", "2.0");
        std::env::set_var("MIN_CHARS", "not-a-number");
        std::env::set_var("ENABLE_VAD", "false");

        let mut s = Settings::default();
        s.apply_env_overrides();

        assert_eq!(s.audio.chunk_duration_s, 2.0);
        // Invalid parse keeps the default
        assert_eq!(s.decoder.min_chars, 3);
        assert!(!s.vad.enable_vad);

        std::env::remove_var("CHUNK_DURATION_S");
        std::env::remove_var("MIN_CHARS");
        std::env::remove_var("ENABLE_VAD");
    }

    #[test]
    fn test_env_override_event_filter_list() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("FILTER_EVENTS", "BGM, Applause");
        let mut s = Settings::default();
        s.apply_env_overrides();
        assert_eq!(s.display.filter_events, vec!["BGM", "Applause"]);
        std::env::remove_var("FILTER_EVENTS");
    }

    #[test]
    fn test_load_settings_from_toml_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[audio]\nchunk_duration_s = 4.0\n\n[vad]\nvad_mode = \"fast\"\n"
        )
        .unwrap();

        let settings = load_settings(file.path().to_str()).unwrap();
        assert_eq!(settings.audio.chunk_duration_s, 4.0);
        assert_eq!(settings.vad.vad_mode, VadMode::Fast);
        // Untouched sections keep defaults
        assert_eq!(settings.queues.emit, 10);
    }

    #[test]
    fn test_load_settings_missing_file_errors() {
        let err = load_settings(Some("/nonexistent/sensestream.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
