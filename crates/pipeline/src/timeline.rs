//! Global-timeline word merging
//!
//! Windows overlap, so the same word tends to arrive twice with slightly
//! different timing. The merger keeps a session-global, time-ordered word
//! list and a high-water mark (`last_emit_ms`); words entirely behind the
//! mark are dropped, words spanning it may replace an existing entry when
//! sufficiently more confident, and words past it are appended and emitted.

use sensestream_config::TimelineConfig;
use sensestream_core::{TimelineEntry, Word};

pub struct TimelineMerger {
    config: TimelineConfig,
    entries: Vec<TimelineEntry>,
    last_emit_ms: f64,
}

impl TimelineMerger {
    pub fn new(config: TimelineConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            last_emit_ms: 0.0,
        }
    }

    /// High-water mark of emitted audio time; monotonically non-decreasing.
    pub fn last_emit_ms(&self) -> f64 {
        self.last_emit_ms
    }

    pub fn word_count(&self) -> usize {
        self.entries.len()
    }

    /// Merge one chunk's words at the given global offset, returning only
    /// the words to emit (new content plus accepted replacements).
    pub fn merge_chunk(&mut self, words: &[Word], chunk_offset_ms: f64) -> Vec<Word> {
        let mut new_words = Vec::new();
        let mut replaced = 0usize;
        let mut skipped = 0usize;

        for word in words {
            let start = chunk_offset_ms + word.start_ms;
            let end = chunk_offset_ms + word.end_ms;

            if word.confidence < self.config.timeline_min_word_confidence {
                tracing::debug!(word = %word.text, conf = word.confidence, "skip low-confidence word");
                skipped += 1;
                continue;
            }

            // Entirely before the high-water mark: already represented
            if end <= self.last_emit_ms {
                skipped += 1;
                continue;
            }

            // Spans the boundary: optionally replace the overlapped entry
            if start < self.last_emit_ms && self.last_emit_ms < end {
                if self.config.timeline_confidence_replacement {
                    if self.try_replace(word, start, end) {
                        replaced += 1;
                        new_words.push(Word {
                            text: word.text.clone(),
                            start_ms: start,
                            end_ms: end,
                            confidence: word.confidence,
                        });
                    } else {
                        skipped += 1;
                    }
                } else {
                    skipped += 1;
                }
                continue;
            }

            // New content past the mark
            let emitted = Word {
                text: word.text.clone(),
                start_ms: start,
                end_ms: end,
                confidence: word.confidence,
            };
            self.entries.push(TimelineEntry {
                word: emitted.text.clone(),
                start_ms: start,
                end_ms: end,
                confidence: word.confidence,
            });
            self.last_emit_ms = self.last_emit_ms.max(end);
            new_words.push(emitted);
        }

        if !new_words.is_empty() || replaced > 0 {
            tracing::debug!(
                new = new_words.len(),
                replaced,
                skipped,
                last_emit_ms = self.last_emit_ms,
                "merged chunk into timeline"
            );
        }

        new_words
    }

    /// Scan the timeline from newest to oldest for a time-overlapping entry
    /// that the candidate beats by the configured confidence margin.
    /// Replacement is in place: length and ordering are preserved.
    fn try_replace(&mut self, word: &Word, start: f64, end: f64) -> bool {
        for entry in self.entries.iter_mut().rev() {
            let overlaps = entry.start_ms < end && entry.end_ms > start;
            if !overlaps {
                continue;
            }

            if word.confidence > entry.confidence + self.config.timeline_overlap_confidence {
                tracing::debug!(
                    old = %entry.word,
                    new = %word.text,
                    old_conf = entry.confidence,
                    new_conf = word.confidence,
                    "replaced overlapping word"
                );
                *entry = TimelineEntry {
                    word: word.text.clone(),
                    start_ms: start,
                    end_ms: end,
                    confidence: word.confidence,
                };
                return true;
            }
        }
        false
    }

    /// Full session text in timeline order.
    pub fn timeline_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.word.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Aggregate timeline statistics.
    pub fn stats(&self) -> TimelineStats {
        if self.entries.is_empty() {
            return TimelineStats::default();
        }

        let confidences: Vec<f32> = self.entries.iter().map(|e| e.confidence).collect();
        let sum: f32 = confidences.iter().sum();
        TimelineStats {
            word_count: self.entries.len(),
            duration_ms: self.last_emit_ms,
            avg_confidence: sum / confidences.len() as f32,
            min_confidence: confidences.iter().copied().fold(f32::INFINITY, f32::min),
            max_confidence: confidences.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        }
    }

    pub fn reset(&mut self) {
        let cleared = self.entries.len();
        self.entries.clear();
        self.last_emit_ms = 0.0;
        tracing::info!(cleared, "timeline reset");
    }
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct TimelineStats {
    pub word_count: usize,
    pub duration_ms: f64,
    pub avg_confidence: f32,
    pub min_confidence: f32,
    pub max_confidence: f32,
}
