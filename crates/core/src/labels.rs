//! Shared metadata tag tables
//!
//! The acoustic model emits inline `<|TAG|>` tokens for language
//! identification, speech emotion, audio events and text-normalization mode.
//! Both the decoder (parsing) and the formatter (display) need these tables,
//! so they live here and are injected into both.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static EMOTION_EMOJIS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("HAPPY", "😊"),
        ("SAD", "😢"),
        ("ANGRY", "😠"),
        ("NEUTRAL", "😐"),
        ("FEARFUL", "😨"),
        ("DISGUSTED", "🤢"),
        ("SURPRISED", "😲"),
    ])
});

static EVENT_EMOJIS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("BGM", "🎵"),
        ("Speech", "💬"),
        ("Applause", "👏"),
        ("Laughter", "😄"),
        ("Crying", "😭"),
        ("Sneeze", "🤧"),
        ("Breath", "💨"),
        ("Cough", "🤒"),
    ])
});

/// Language tag code → full name, as emitted by the model.
static LANGUAGE_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("zh", "Chinese"),
        ("en", "English"),
        ("ja", "Japanese"),
        ("ko", "Korean"),
        ("yue", "Cantonese"),
        ("auto", "Auto"),
    ])
});

/// Full name → code, used by the language lock when recording detections.
static LANGUAGE_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Chinese", "zh"),
        ("English", "en"),
        ("Japanese", "ja"),
        ("Korean", "ko"),
        ("Cantonese", "yue"),
    ])
});

/// Language code → embedding table row for the query prefix.
static LANGUAGE_IDS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("auto", 0),
        ("zh", 3),
        ("en", 4),
        ("yue", 7),
        ("ja", 11),
        ("ko", 12),
        ("nospeech", 13),
    ])
});

/// Embedding rows for the event+emotion query pair.
pub const EVENT_EMO_QUERY_IDS: [u32; 2] = [1, 2];
/// Embedding row selecting inverse text normalization.
pub const ITN_QUERY_ID: u32 = 14;
/// Embedding row selecting raw (no-ITN) output.
pub const NO_ITN_QUERY_ID: u32 = 15;

/// Lookup table for model metadata tags, injected into the decoder and
/// formatter by value.
#[derive(Clone, Copy, Debug, Default)]
pub struct Labels;

impl Labels {
    pub fn new() -> Self {
        Self
    }

    /// Emoji for an emotion tag (`HAPPY` → 😊).
    pub fn emotion_emoji(&self, tag: &str) -> Option<&'static str> {
        EMOTION_EMOJIS.get(tag).copied()
    }

    pub fn is_emotion(&self, tag: &str) -> bool {
        EMOTION_EMOJIS.contains_key(tag)
    }

    /// Emoji for an audio event tag (`BGM` → 🎵).
    pub fn event_emoji(&self, tag: &str) -> Option<&'static str> {
        EVENT_EMOJIS.get(tag).copied()
    }

    pub fn is_event(&self, tag: &str) -> bool {
        EVENT_EMOJIS.contains_key(tag)
    }

    /// Canonical casing for an event tag, matched case-insensitively
    /// (`laughter` → `Laughter`).
    pub fn canonical_event(&self, tag: &str) -> Option<&'static str> {
        EVENT_EMOJIS
            .keys()
            .find(|k| k.eq_ignore_ascii_case(tag))
            .copied()
    }

    /// Full language name for a tag code (`en` → `English`).
    pub fn language_name(&self, code: &str) -> Option<&'static str> {
        LANGUAGE_NAMES.get(code).copied()
    }

    pub fn is_language(&self, code: &str) -> bool {
        LANGUAGE_NAMES.contains_key(code)
    }

    /// Tag code for a full language name (`English` → `en`).
    pub fn language_code(&self, name: &str) -> Option<&'static str> {
        LANGUAGE_CODES.get(name).copied()
    }

    /// Embedding row for a language code; unknown codes map to `auto`.
    pub fn language_id(&self, code: &str) -> u32 {
        LANGUAGE_IDS.get(code).copied().unwrap_or(0)
    }

    /// Whether a language code is accepted by the configuration.
    pub fn is_valid_language_setting(&self, code: &str) -> bool {
        LANGUAGE_IDS.contains_key(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_id_mapping() {
        let labels = Labels::new();
        assert_eq!(labels.language_id("auto"), 0);
        assert_eq!(labels.language_id("zh"), 3);
        assert_eq!(labels.language_id("en"), 4);
        assert_eq!(labels.language_id("yue"), 7);
        assert_eq!(labels.language_id("ja"), 11);
        assert_eq!(labels.language_id("ko"), 12);
        assert_eq!(labels.language_id("nospeech"), 13);
        // Unknown codes fall back to auto
        assert_eq!(labels.language_id("fr"), 0);
    }

    #[test]
    fn test_language_name_round_trip() {
        let labels = Labels::new();
        assert_eq!(labels.language_name("en"), Some("English"));
        assert_eq!(labels.language_code("English"), Some("en"));
        assert_eq!(labels.language_code("Cantonese"), Some("yue"));
        // `auto` has a name but no reverse mapping into detections
        assert_eq!(labels.language_name("auto"), Some("Auto"));
        assert_eq!(labels.language_code("Auto"), None);
    }

    #[test]
    fn test_emotion_and_event_tables() {
        let labels = Labels::new();
        assert!(labels.is_emotion("HAPPY"));
        assert!(!labels.is_emotion("BGM"));
        assert!(labels.is_event("BGM"));
        assert!(labels.is_event("Laughter"));
        assert_eq!(labels.event_emoji("Applause"), Some("👏"));
    }
}
