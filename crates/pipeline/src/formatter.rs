//! Display formatting and metadata filtering

use sensestream_config::DisplayConfig;
use sensestream_core::{ChunkResult, Labels};

/// Stateless formatter for console lines plus the metadata drop filter.
#[derive(Clone)]
pub struct TranscriptionFormatter {
    config: DisplayConfig,
    labels: Labels,
}

impl TranscriptionFormatter {
    pub fn new(config: DisplayConfig, labels: Labels) -> Self {
        Self { config, labels }
    }

    /// Console line: optional emotion emoji, event emojis, text, `[language]`.
    pub fn format_display(&self, text: &str, result: &ChunkResult) -> String {
        let mut parts: Vec<String> = Vec::new();

        if self.config.show_emotions {
            if let Some(emotion) = &result.emotion {
                if let Some(emoji) = self.labels.emotion_emoji(emotion) {
                    parts.push(emoji.to_string());
                }
            }
        }

        if self.config.show_events {
            for event in &result.events {
                if let Some(emoji) = self.labels.event_emoji(event) {
                    parts.push(emoji.to_string());
                }
            }
        }

        parts.push(text.to_string());

        if self.config.show_language {
            if let Some(language) = &result.language {
                parts.push(format!("[{language}]"));
            }
        }

        parts.join(" ")
    }

    /// Returns the drop reason when the result's audio events match the
    /// configured filters, `None` when the result should pass through.
    pub fn check_filter(&self, result: &ChunkResult) -> Option<String> {
        if self.config.filter_bgm && result.events.iter().any(|e| e == "BGM") {
            return Some("background music detected".to_string());
        }

        for event in &result.events {
            if self.config.filter_events.iter().any(|f| f == event) {
                return Some(format!("filtered event: {event}"));
            }
        }

        None
    }
}
