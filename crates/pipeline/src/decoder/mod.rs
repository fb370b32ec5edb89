//! CTC decoding and transcription post-processing
//!
//! Turns raw logits into a `ChunkResult`: blank-posterior gate, greedy CTC
//! collapse with per-token confidence and frame timing, metadata tag
//! parsing, minimum-content gate, confidence-gated boundary stitching,
//! fuzzy duplicate suppression, and subword→word aggregation.

mod stitch;

pub use stitch::{apply_stitching, levenshtein_similarity, ChunkTail};

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use ndarray::Axis;

use sensestream_config::constants::audio::CTC_FRAME_DURATION_MS;
use sensestream_config::constants::decoder::{
    HASH_RESULT_CAP, RECENT_HASH_COUNT, RECENT_TEXT_COUNT,
};
use sensestream_config::constants::model::{BLANK_GATE_THRESHOLD, BLANK_ID, LOGIT_CLIP};
use sensestream_config::DecoderConfig;
use sensestream_core::{ChunkResult, Labels, NpuOutput, Token, Tokenizer, Word};

static META_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\|(.*?)\|>").unwrap());

/// Metadata parsed out of the raw model text.
#[derive(Debug, Default)]
struct ParsedMetadata {
    language: Option<String>,
    emotion: Option<String>,
    events: Vec<String>,
    has_itn: bool,
}

pub struct TranscriptionDecoder {
    config: DecoderConfig,
    labels: Labels,
    tokenizer: Box<dyn Tokenizer>,
    blank_id: u32,

    recent_hashes: VecDeque<u64>,
    hash_results: HashMap<u64, ChunkResult>,
    hash_order: VecDeque<u64>,

    recent_texts: VecDeque<String>,
    last_emit: Option<Instant>,
    prev_tail: Option<ChunkTail>,
}

impl TranscriptionDecoder {
    pub fn new(config: DecoderConfig, labels: Labels, tokenizer: Box<dyn Tokenizer>) -> Self {
        Self {
            config,
            labels,
            tokenizer,
            blank_id: BLANK_ID,
            recent_hashes: VecDeque::with_capacity(RECENT_HASH_COUNT),
            hash_results: HashMap::new(),
            hash_order: VecDeque::new(),
            recent_texts: VecDeque::with_capacity(RECENT_TEXT_COUNT),
            last_emit: None,
            prev_tail: None,
        }
    }

    /// Remember an accepted result for audio-level deduplication.
    pub fn register_result(&mut self, audio_hash: u64, result: &ChunkResult) {
        if self.recent_hashes.len() == RECENT_HASH_COUNT {
            self.recent_hashes.pop_front();
        }
        self.recent_hashes.push_back(audio_hash);

        self.hash_results.insert(audio_hash, result.clone());
        self.hash_order.push_back(audio_hash);
        while self.hash_results.len() > HASH_RESULT_CAP {
            if let Some(oldest) = self.hash_order.pop_front() {
                self.hash_results.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Decode one inference output. `None` means the window was rejected by
    /// one of the gates; the caller counts it as skipped.
    pub fn decode(&mut self, output: &NpuOutput, audio_hash: u64) -> Option<ChunkResult> {
        // Duplicate audio short-circuit
        if self.recent_hashes.contains(&audio_hash) && self.hash_results.contains_key(&audio_hash)
        {
            tracing::debug!(hash = format!("{audio_hash:016x}"), "skip duplicate audio chunk");
            return None;
        }

        let logits = output.logits.index_axis(Axis(0), 0); // [vocab, frames]
        let vocab = logits.shape()[0];
        let frames = logits.shape()[1];
        if vocab == 0 || frames == 0 {
            return None;
        }

        // Column-wise softmax with max-subtraction and exponent clipping;
        // we only need the argmax probability and the blank probability.
        let mut argmax_ids = Vec::with_capacity(frames);
        let mut argmax_probs = Vec::with_capacity(frames);
        let mut blank_sum = 0.0f32;

        for t in 0..frames {
            let column = logits.index_axis(Axis(1), t);

            let mut max_val = f32::NEG_INFINITY;
            let mut max_id = 0usize;
            for (v, &l) in column.iter().enumerate() {
                if l > max_val {
                    max_val = l;
                    max_id = v;
                }
            }

            let mut denom = 0.0f32;
            for &l in column.iter() {
                denom += (l - max_val).clamp(-LOGIT_CLIP, LOGIT_CLIP).exp();
            }

            let prob_of = |l: f32| (l - max_val).clamp(-LOGIT_CLIP, LOGIT_CLIP).exp() / denom;

            blank_sum += prob_of(column[self.blank_id as usize]);
            argmax_ids.push(max_id as u32);
            argmax_probs.push(prob_of(column[max_id]));
        }

        let avg_blank = blank_sum / frames as f32;
        if avg_blank > BLANK_GATE_THRESHOLD {
            tracing::debug!(avg_blank = format!("{avg_blank:.3}"), "drop by blank gate");
            return None;
        }

        // Greedy CTC collapse: maximal runs of equal ids, blanks dropped,
        // max probability over each run as the token confidence.
        let mut runs: Vec<(u32, usize, usize, f32)> = Vec::new();
        let mut t = 0;
        while t < frames {
            let id = argmax_ids[t];
            if id == self.blank_id {
                t += 1;
                continue;
            }

            let start = t;
            let mut max_conf = argmax_probs[t];
            let mut end = t + 1;
            while end < frames && argmax_ids[end] == id {
                max_conf = max_conf.max(argmax_probs[end]);
                end += 1;
            }

            runs.push((id, start, end, max_conf));
            t = end;
        }

        if runs.is_empty() {
            return None;
        }

        let avg_confidence =
            runs.iter().map(|(_, _, _, c)| c).sum::<f32>() / runs.len() as f32;

        let ids: Vec<u32> = runs.iter().map(|(id, _, _, _)| *id).collect();
        let text = match self.tokenizer.decode_ids(&ids) {
            Ok(t) => t.trim().to_string(),
            Err(e) => {
                tracing::error!(error = %e, "tokenizer decode failed");
                return None;
            },
        };

        let mut tokens = Vec::with_capacity(runs.len());
        for &(id, start, end, conf) in &runs {
            let piece = match self.tokenizer.piece(id) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, token = id, "tokenizer piece lookup failed");
                    return None;
                },
            };
            tokens.push(Token {
                token_id: id,
                piece,
                start_ms: start as f64 * CTC_FRAME_DURATION_MS,
                end_ms: end as f64 * CTC_FRAME_DURATION_MS,
                confidence: conf,
            });
        }

        let metadata = self.parse_metadata(&text);
        let mut text_clean = META_TOKEN_RE.replace_all(&text, "").trim().to_string();

        // Require some real alphanumeric content
        let alnum = text_clean.chars().filter(|c| c.is_ascii_alphanumeric()).count();
        if alnum < self.config.min_chars {
            tracing::debug!(text = %text_clean, "too little content after cleanup");
            return None;
        }

        if self.config.enable_confidence_stitching {
            if let Some(tail) = &self.prev_tail {
                text_clean = apply_stitching(
                    &text_clean,
                    avg_confidence,
                    tail,
                    self.config.confidence_threshold,
                );
            }
            self.prev_tail = Some(ChunkTail::capture(
                &text_clean,
                avg_confidence,
                self.config.overlap_word_count,
            ));
        }

        // Fuzzy duplicate suppression within the cooldown window
        let lowered = text_clean.to_lowercase();
        let within_cooldown = self
            .last_emit
            .map(|t| t.elapsed().as_secs_f64() < self.config.duplicate_cooldown_s)
            .unwrap_or(false);
        if within_cooldown {
            for prev in &self.recent_texts {
                let similarity = levenshtein_similarity(&lowered, &prev.to_lowercase());
                if similarity >= self.config.similarity_threshold {
                    tracing::debug!(
                        similarity = format!("{similarity:.2}"),
                        text = %text_clean,
                        "suppress near-duplicate"
                    );
                    return None;
                }
            }
        }

        if self.recent_texts.len() == RECENT_TEXT_COUNT {
            self.recent_texts.pop_front();
        }
        self.recent_texts.push_back(text_clean.clone());
        self.last_emit = Some(Instant::now());

        let words = tokens_to_words(&tokens);

        Some(ChunkResult {
            text: text_clean,
            language: metadata.language,
            emotion: metadata.emotion,
            events: metadata.events,
            has_itn: metadata.has_itn,
            confidence: avg_confidence,
            words,
            raw_text: text,
            audio_hash,
        })
    }

    fn parse_metadata(&self, text: &str) -> ParsedMetadata {
        let mut meta = ParsedMetadata::default();

        for capture in META_TOKEN_RE.captures_iter(text) {
            let tag = &capture[1];

            if self.labels.is_language(tag) {
                meta.language = self.labels.language_name(tag).map(str::to_string);
            } else if self.labels.is_emotion(&tag.to_uppercase()) {
                meta.emotion = Some(tag.to_uppercase());
            } else if let Some(event) = self.labels.canonical_event(tag) {
                meta.events.push(event.to_string());
            } else if tag.eq_ignore_ascii_case("withitn") {
                meta.has_itn = true;
            }
        }

        meta
    }
}

/// Join subword pieces into words: a piece beginning with `▁` starts a new
/// word; continuation pieces extend the current one. Word confidence is the
/// mean of its token confidences.
pub fn tokens_to_words(tokens: &[Token]) -> Vec<Word> {
    let mut words = Vec::new();

    let mut pieces: Vec<&str> = Vec::new();
    let mut start_ms: Option<f64> = None;
    let mut end_ms = 0.0f64;
    let mut confidences: Vec<f32> = Vec::new();

    let mut flush = |pieces: &mut Vec<&str>,
                     start_ms: &mut Option<f64>,
                     end_ms: f64,
                     confidences: &mut Vec<f32>,
                     words: &mut Vec<Word>| {
        if pieces.is_empty() {
            return;
        }
        let text: String = pieces.concat().replace('▁', " ").trim().to_string();
        if let (false, Some(start)) = (text.is_empty(), *start_ms) {
            let confidence = confidences.iter().sum::<f32>() / confidences.len() as f32;
            words.push(Word {
                text,
                start_ms: start,
                end_ms,
                confidence,
            });
        }
        pieces.clear();
        confidences.clear();
        *start_ms = None;
    };

    for token in tokens {
        // Metadata tags are not part of any word
        if token.piece.starts_with("<|") {
            continue;
        }

        if token.piece.starts_with('▁') {
            flush(&mut pieces, &mut start_ms, end_ms, &mut confidences, &mut words);
            pieces.push(&token.piece);
            start_ms = Some(token.start_ms);
            end_ms = token.end_ms;
            confidences.push(token.confidence);
        } else {
            if start_ms.is_none() {
                start_ms = Some(token.start_ms);
            }
            pieces.push(&token.piece);
            end_ms = token.end_ms;
            confidences.push(token.confidence);
        }
    }

    flush(&mut pieces, &mut start_ms, end_ms, &mut confidences, &mut words);
    words
}
