//! End-to-end pipeline tests with mock collaborators
//!
//! Drives the full orchestrator: scripted audio source → preprocess →
//! mock engine → postprocess → emitter → collecting sink.

use ndarray::Array3;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sensestream_config::Settings;
use sensestream_core::{
    AudioFrame, AudioSource, BroadcastSink, CoreError, EmbeddingTable, FeatureTensor, NpuInfer,
    NpuOutput, PassthroughPostProcessor, Tokenizer,
};
use sensestream_pipeline::{Collaborators, PipelineOrchestrator, PipelineSnapshot};

/// Source replaying a fixed sample buffer in 1024-sample frames, then EOF.
struct BufferSource {
    samples: Vec<i16>,
    pos: usize,
}

impl BufferSource {
    fn new(samples: Vec<i16>) -> Self {
        Self { samples, pos: 0 }
    }

    /// Leading silence (for noise-floor calibration) followed by a tone.
    fn silence_then_tone(silence_s: f64, tone_s: f64, amplitude: f32) -> Vec<i16> {
        let mut samples = vec![0i16; (16000.0 * silence_s) as usize];
        let n = (16000.0 * tone_s) as usize;
        samples.extend((0..n).map(|i| {
            let x = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin();
            (x * amplitude * 32767.0) as i16
        }));
        samples
    }
}

impl AudioSource for BufferSource {
    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<AudioFrame>, CoreError> {
        if self.pos >= self.samples.len() {
            return Err(CoreError::SourceClosed);
        }
        let end = (self.pos + 1024).min(self.samples.len());
        let frame = AudioFrame::new(self.samples[self.pos..end].to_vec(), 16000, 1);
        self.pos = end;
        Ok(Some(frame))
    }

    fn device_rate_hz(&self) -> u32 {
        16000
    }

    fn channels(&self) -> u16 {
        1
    }

    fn supports(&self, rate: u32, channels: u16) -> bool {
        rate == 16000 && channels == 1
    }
}

/// Engine ignoring its input and replaying the same logits every call.
struct ScriptedEngine {
    logits: Array3<f32>,
}

impl NpuInfer for ScriptedEngine {
    fn run(&mut self, _input: &FeatureTensor) -> Result<Option<NpuOutput>, CoreError> {
        Ok(Some(NpuOutput {
            logits: self.logits.clone(),
        }))
    }
}

struct PieceTokenizer;

const PIECES: [&str; 6] = ["<blank>", "▁hello", "▁there", "▁friend", "<|en|>", "<|BGM|>"];

impl Tokenizer for PieceTokenizer {
    fn vocab_size(&self) -> usize {
        PIECES.len()
    }

    fn decode_ids(&self, ids: &[u32]) -> Result<String, CoreError> {
        let text: String = ids
            .iter()
            .map(|&id| PIECES[id as usize])
            .collect::<Vec<_>>()
            .concat()
            .replace('▁', " ");
        Ok(text.trim().to_string())
    }

    fn piece(&self, id: u32) -> Result<String, CoreError> {
        Ok(PIECES[id as usize].to_string())
    }
}

struct ZeroEmbedding;

impl EmbeddingTable for ZeroEmbedding {
    fn dim(&self) -> usize {
        560
    }

    fn row(&self, _id: usize) -> Result<&[f32], CoreError> {
        Ok(&[])
    }
}

#[derive(Clone, Default)]
struct CollectingSink {
    records: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl BroadcastSink for CollectingSink {
    fn send(&mut self, record: &serde_json::Value) -> Result<(), CoreError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Logits [1, vocab, frames] whose per-frame argmax follows `ids`.
fn logits_for(ids: &[u32]) -> Array3<f32> {
    let mut logits = Array3::<f32>::zeros((1, PIECES.len(), ids.len()));
    for (t, &id) in ids.iter().enumerate() {
        logits[[0, id as usize, t]] = 12.0;
    }
    logits
}

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.audio.chunk_duration_s = 1.0;
    settings.audio.overlap_duration_s = 0.5;
    settings.audio.noise_calib_secs = 0.1;
    settings
}

fn run_session(
    samples: Vec<i16>,
    logits: Array3<f32>,
    settings: &Settings,
) -> (Vec<serde_json::Value>, PipelineSnapshot) {
    let sink = CollectingSink::default();
    let records = sink.records.clone();

    let collaborators = Collaborators {
        audio_source: Box::new(BufferSource::new(samples)),
        npu: Box::new(ScriptedEngine { logits }),
        tokenizer: Box::new(PieceTokenizer),
        embedding: Arc::new(ZeroEmbedding),
        broadcast: Box::new(sink),
        text_post: Box::new(PassthroughPostProcessor),
    };

    let orchestrator = PipelineOrchestrator::start(settings, collaborators).expect("start");

    // Source EOFs quickly; wait until the queues are empty and the stage
    // counters have stopped moving across two polls
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut prev_seen = u64::MAX;
    loop {
        std::thread::sleep(Duration::from_millis(200));
        let snapshot = orchestrator.snapshot();
        let idle = snapshot.queue_depths.preprocess == 0
            && snapshot.queue_depths.inference == 0
            && snapshot.queue_depths.postprocess == 0
            && snapshot.queue_depths.emit == 0;
        let seen = snapshot.preprocess.processed
            + snapshot.preprocess.skipped
            + snapshot.postprocess.processed
            + snapshot.postprocess.skipped;
        if (idle && seen == prev_seen) || Instant::now() > deadline {
            break;
        }
        prev_seen = seen;
    }

    let snapshot = orchestrator.snapshot();
    orchestrator.shutdown();
    let collected = records.lock().clone();
    (collected, snapshot)
}

fn transcriptions(records: &[serde_json::Value]) -> Vec<&serde_json::Value> {
    records
        .iter()
        .filter(|r| r["type"] == "transcription")
        .collect()
}

fn status_messages(records: &[serde_json::Value]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r["type"] == "status")
        .map(|r| r["message"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_silence_round_trip_emits_nothing() {
    // 3 s of silence: every window dies at the VAD, the engine never runs
    let (records, snapshot) = run_session(
        vec![0i16; 48000],
        logits_for(&[1, 1, 1]),
        &fast_settings(),
    );

    assert!(transcriptions(&records).is_empty());
    assert_eq!(snapshot.inference.processed, 0);
    assert!(snapshot.preprocess.skipped > 0);
}

#[test]
fn test_speech_window_produces_timed_words() {
    let (records, snapshot) = run_session(
        BufferSource::silence_then_tone(0.3, 2.0, 0.4),
        logits_for(&[1, 1, 0, 2, 2, 2]),
        &fast_settings(),
    );

    let emitted = transcriptions(&records);
    assert!(!emitted.is_empty());

    let first = emitted[0];
    assert_eq!(first["text"], "hello there");
    assert_eq!(first["source"], "core");
    let words = first["words"].as_array().unwrap();
    assert_eq!(words.len(), 2);
    assert!(words[0]["confidence"].as_f64().unwrap() > 0.9);
    assert!(words[0]["start_ms"].as_u64().unwrap() < words[1]["start_ms"].as_u64().unwrap());

    assert!(snapshot.inference.processed >= 1);
    assert!(snapshot.session.total_chunks_processed >= 1);
}

#[test]
fn test_repeated_identical_text_suppressed() {
    // Several overlapping speech windows all decode to the same text; only
    // the first emission survives the dedup gates within the cooldown.
    let (records, _snapshot) = run_session(
        BufferSource::silence_then_tone(0.3, 3.0, 0.4),
        logits_for(&[1, 1, 0, 2, 2, 2]),
        &fast_settings(),
    );

    assert_eq!(transcriptions(&records).len(), 1);
}

#[test]
fn test_bgm_windows_filtered_end_to_end() {
    // Engine tags every window as background music
    let (records, _snapshot) = run_session(
        BufferSource::silence_then_tone(0.3, 2.0, 0.4),
        logits_for(&[5, 1, 1, 2, 2]),
        &fast_settings(),
    );

    assert!(transcriptions(&records).is_empty());
}

#[test]
fn test_language_tag_feeds_lock_status() {
    let mut settings = fast_settings();
    settings.language_lock.language_lock_warmup_s = 0.0;
    settings.language_lock.language_lock_min_samples = 1;

    // <|en|> hello there → first accepted window locks the language
    let (records, snapshot) = run_session(
        BufferSource::silence_then_tone(0.3, 2.0, 0.4),
        logits_for(&[4, 1, 1, 2, 2]),
        &settings,
    );

    assert!(snapshot.language_lock.locked);
    assert_eq!(snapshot.language_lock.current_language, "en");

    // The lock transition surfaced as a status record
    let statuses = status_messages(&records);
    assert!(statuses.iter().any(|m| m.contains("language locked")));
}

#[test]
fn test_noise_floor_calibration_status_emitted() {
    let (records, _snapshot) = run_session(
        vec![0i16; 32000],
        logits_for(&[1]),
        &fast_settings(),
    );

    let statuses = status_messages(&records);
    assert!(statuses.iter().any(|m| m.contains("noise floor calibrated")));
}
