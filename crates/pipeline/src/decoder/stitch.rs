//! Chunk-boundary text stitching
//!
//! Adjacent windows share overlap audio, so the tail of one decode tends to
//! reappear at the head of the next. When the overlap is detected (by word
//! similarity) the lower-confidence side loses: an unreliable previous tail
//! causes the duplicated head of the current chunk to be trimmed.

use sensestream_config::constants::decoder::STITCH_SIMILARITY;

/// Levenshtein similarity in [0, 1], character-based with a quick reject
/// when lengths differ by more than half.
pub fn levenshtein_similarity(s1: &str, s2: &str) -> f32 {
    if s1 == s2 {
        return 1.0;
    }
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }

    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (len1, len2) = (a.len(), b.len());
    let max_len = len1.max(len2);

    if (len1 as i64 - len2 as i64).unsigned_abs() as f32 / max_len as f32 > 0.5 {
        return 0.0;
    }

    let mut prev: Vec<usize> = (0..=len2).collect();
    let mut curr = vec![0usize; len2 + 1];

    for i in 0..len1 {
        curr[0] = i + 1;
        for j in 0..len2 {
            let insertions = prev[j + 1] + 1;
            let deletions = curr[j] + 1;
            let substitutions = prev[j] + usize::from(a[i] != b[j]);
            curr[j + 1] = insertions.min(deletions).min(substitutions);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    1.0 - prev[len2] as f32 / max_len as f32
}

/// Tail of the previously emitted chunk, kept for boundary comparison.
#[derive(Clone, Debug)]
pub struct ChunkTail {
    pub words: Vec<String>,
    pub confidence: f32,
}

impl ChunkTail {
    /// Capture the last `overlap_word_count` words of a chunk.
    pub fn capture(text: &str, confidence: f32, overlap_word_count: usize) -> Self {
        let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let start = words.len().saturating_sub(overlap_word_count);
        Self {
            words: words[start..].to_vec(),
            confidence,
        }
    }
}

/// Confidence-gated stitch: scan overlap lengths from the configured word
/// count down to 1; the first length whose tail/head similarity reaches the
/// threshold decides. Returns the (possibly trimmed) current text.
pub fn apply_stitching(
    current_text: &str,
    current_confidence: f32,
    prev_tail: &ChunkTail,
    confidence_threshold: f32,
) -> String {
    let current_words: Vec<&str> = current_text.split_whitespace().collect();
    if current_words.is_empty() || prev_tail.words.is_empty() {
        return current_text.to_string();
    }

    let max_overlap = prev_tail.words.len().min(current_words.len());

    for overlap_len in (1..=max_overlap).rev() {
        let tail_start = prev_tail.words.len() - overlap_len;
        let prev_subset = prev_tail.words[tail_start..].join(" ");
        let head_subset = current_words[..overlap_len].join(" ");

        let similarity =
            levenshtein_similarity(&prev_subset.to_lowercase(), &head_subset.to_lowercase());
        if similarity < STITCH_SIMILARITY {
            continue;
        }

        if prev_tail.confidence < confidence_threshold {
            // The previous tail was unreliable; trust the current chunk and
            // drop its duplicated head.
            tracing::debug!(
                prev_conf = prev_tail.confidence,
                overlap = %head_subset,
                "confidence-gated trim of duplicated head"
            );
            return current_words[overlap_len..].join(" ");
        }

        if current_confidence < confidence_threshold {
            tracing::debug!(
                current_conf = current_confidence,
                "current chunk head uncertain, keeping text unchanged"
            );
            return current_text.to_string();
        }

        // Both sides confident: keep current; downstream dedup resolves it.
        return current_text.to_string();
    }

    current_text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_identical_and_disjoint() {
        assert_eq!(levenshtein_similarity("hello", "hello"), 1.0);
        assert_eq!(levenshtein_similarity("", "hello"), 0.0);
        assert_eq!(levenshtein_similarity("abc", "abcdefghij"), 0.0); // length reject
    }

    #[test]
    fn test_similarity_single_edit() {
        // One substitution over five characters
        let sim = levenshtein_similarity("hello", "hallo");
        assert!((sim - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = levenshtein_similarity("quick brown", "quick brawn");
        let b = levenshtein_similarity("quick brawn", "quick brown");
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_tail_capture_limits_words() {
        let tail = ChunkTail::capture("the quick brown fox jumps", 0.8, 4);
        assert_eq!(tail.words, vec!["quick", "brown", "fox", "jumps"]);

        let short = ChunkTail::capture("one two", 0.5, 4);
        assert_eq!(short.words, vec!["one", "two"]);
    }

    #[test]
    fn test_stitch_trims_on_low_prev_confidence() {
        // Boundary scenario: prev tail stored with confidence 0.40, current
        // chunk repeats it and continues.
        let tail = ChunkTail::capture("the quick brown fox", 0.40, 4);
        let out = apply_stitching("the quick brown fox jumps over", 0.80, &tail, 0.6);
        assert_eq!(out, "jumps over");
    }

    #[test]
    fn test_stitch_keeps_when_prev_confident() {
        let tail = ChunkTail::capture("the quick brown fox", 0.90, 4);
        let out = apply_stitching("the quick brown fox jumps over", 0.80, &tail, 0.6);
        assert_eq!(out, "the quick brown fox jumps over");
    }

    #[test]
    fn test_stitch_keeps_when_current_uncertain() {
        let tail = ChunkTail::capture("the quick brown fox", 0.90, 4);
        let out = apply_stitching("the quick brown fox jumps", 0.30, &tail, 0.6);
        assert_eq!(out, "the quick brown fox jumps");
    }

    #[test]
    fn test_stitch_no_overlap_found() {
        let tail = ChunkTail::capture("completely different words here", 0.40, 4);
        let out = apply_stitching("nothing matches at all", 0.80, &tail, 0.6);
        assert_eq!(out, "nothing matches at all");
    }

    #[test]
    fn test_stitch_partial_overlap() {
        // Only the last two tail words repeat at the head
        let tail = ChunkTail::capture("alpha beta gamma delta", 0.40, 4);
        let out = apply_stitching("gamma delta epsilon", 0.80, &tail, 0.6);
        assert_eq!(out, "epsilon");
    }
}
