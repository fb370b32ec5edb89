//! Transcription domain types and wire records

use chrono::Utc;
use serde::Serialize;

/// One CTC token surviving run-collapse, with frame-derived timing.
#[derive(Clone, Debug)]
pub struct Token {
    pub token_id: u32,
    pub piece: String,
    /// Milliseconds relative to the window start (`start_frame * 31.25`).
    pub start_ms: f64,
    pub end_ms: f64,
    /// Max softmax probability over the collapsed run.
    pub confidence: f32,
}

/// A word assembled from subword pieces on the `▁` boundary marker.
#[derive(Clone, Debug, PartialEq)]
pub struct Word {
    pub text: String,
    pub start_ms: f64,
    pub end_ms: f64,
    /// Mean confidence of the member tokens.
    pub confidence: f32,
}

/// Decoded output of one accepted window.
#[derive(Clone, Debug)]
pub struct ChunkResult {
    /// Clean text, post metadata-strip and boundary stitching.
    pub text: String,
    /// Full language name as parsed from the LID tag, if present.
    pub language: Option<String>,
    /// Emotion tag (SER), if present.
    pub emotion: Option<String>,
    /// Audio event tags (AED), canonical casing.
    pub events: Vec<String>,
    pub has_itn: bool,
    /// Mean token confidence for the window.
    pub confidence: f32,
    pub words: Vec<Word>,
    /// Raw model text before tag stripping.
    pub raw_text: String,
    /// Fingerprint of the 16 kHz window this result came from.
    pub audio_hash: u64,
}

/// A word placed on the session-global timeline.
#[derive(Clone, Debug)]
pub struct TimelineEntry {
    pub word: String,
    pub start_ms: f64,
    pub end_ms: f64,
    pub confidence: f32,
}

/// Word as serialized on the wire (integer milliseconds).
#[derive(Clone, Debug, Serialize)]
pub struct WireWord {
    pub word: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f32,
}

impl From<&Word> for WireWord {
    fn from(w: &Word) -> Self {
        Self {
            word: w.text.clone(),
            start_ms: w.start_ms.round() as u64,
            end_ms: w.end_ms.round() as u64,
            confidence: w.confidence,
        }
    }
}

/// JSON record emitted per accepted window.
#[derive(Clone, Debug, Serialize)]
pub struct TranscriptionRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
    pub language: Option<String>,
    pub emotion: Option<String>,
    pub audio_events: Vec<String>,
    pub has_itn: bool,
    pub raw_text: String,
    pub confidence: f32,
    pub words: Vec<WireWord>,
    /// ISO-8601 emission timestamp.
    pub timestamp: String,
    pub source: &'static str,
}

impl TranscriptionRecord {
    /// Build a wire record from a chunk result. `words` overrides the
    /// result's own word list when timeline merging narrowed it to new words.
    pub fn from_result(text: &str, result: &ChunkResult, words: Option<&[Word]>) -> Self {
        let words = words
            .unwrap_or(&result.words)
            .iter()
            .map(WireWord::from)
            .collect();

        Self {
            kind: "transcription",
            text: text.to_string(),
            language: result.language.clone(),
            emotion: result.emotion.clone(),
            audio_events: result.events.clone(),
            has_itn: result.has_itn,
            raw_text: result.raw_text.clone(),
            confidence: result.confidence,
            words,
            timestamp: Utc::now().to_rfc3339(),
            source: "core",
        }
    }
}

/// Out-of-band status record (noise-floor calibration, language lock).
#[derive(Clone, Debug, Serialize)]
pub struct StatusRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub timestamp: String,
}

impl StatusRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: "status",
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ChunkResult {
        ChunkResult {
            text: "hello world".to_string(),
            language: Some("English".to_string()),
            emotion: None,
            events: vec!["Speech".to_string()],
            has_itn: true,
            confidence: 0.91,
            words: vec![
                Word {
                    text: "hello".to_string(),
                    start_ms: 0.0,
                    end_ms: 93.75,
                    confidence: 0.9,
                },
                Word {
                    text: "world".to_string(),
                    start_ms: 125.0,
                    end_ms: 250.0,
                    confidence: 0.92,
                },
            ],
            raw_text: "<|en|><|Speech|><|withitn|>hello world".to_string(),
            audio_hash: 42,
        }
    }

    #[test]
    fn test_record_shape() {
        let result = sample_result();
        let record = TranscriptionRecord::from_result(&result.text, &result, None);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "transcription");
        assert_eq!(value["text"], "hello world");
        assert_eq!(value["language"], "English");
        assert_eq!(value["emotion"], serde_json::Value::Null);
        assert_eq!(value["audio_events"][0], "Speech");
        assert_eq!(value["has_itn"], true);
        assert_eq!(value["source"], "core");
        assert_eq!(value["words"][0]["word"], "hello");
        // Fractional frame times round to integer milliseconds on the wire
        assert_eq!(value["words"][0]["end_ms"], 94);
    }

    #[test]
    fn test_record_word_override() {
        let result = sample_result();
        let only_new = vec![result.words[1].clone()];
        let record = TranscriptionRecord::from_result("world", &result, Some(&only_new));
        assert_eq!(record.words.len(), 1);
        assert_eq!(record.words[0].word, "world");
    }

    #[test]
    fn test_status_record() {
        let record = StatusRecord::new("noise floor calibrated");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["message"], "noise floor calibrated");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }
}
