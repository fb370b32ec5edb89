//! Collaborator traits
//!
//! These are the seams to the externally-provided pieces: the audio capture
//! driver, the NPU inference engine, the sub-word tokenizer, the embedding
//! table, the broadcast transport and the (stubbed) text post-processor.
//! Each is acquired once at startup and owned by exactly one pipeline stage.

use std::time::Duration;

use crate::audio::AudioFrame;
use crate::error::{CoreError, Result};
use crate::features::{FeatureTensor, NpuOutput};

/// Preferred `(channels, rates)` combinations probed in order when opening a
/// capture stream. Mono at the model rate first.
pub const RATE_PREFERENCES: [(u16, [u32; 6]); 2] = [
    (1, [16000, 48000, 44100, 32000, 22050, 8000]),
    (2, [16000, 48000, 44100, 32000, 22050, 8000]),
];

/// Source of device-rate int16 audio frames.
pub trait AudioSource: Send {
    /// Pull the next frame, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when no frame arrived within the timeout and
    /// `Err(CoreError::SourceClosed)` once the stream reports end-of-file.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>>;

    /// Negotiated device sample rate in Hz.
    fn device_rate_hz(&self) -> u32;

    /// Negotiated channel count.
    fn channels(&self) -> u16;

    /// Whether the device supports a given `(rate, channels)` combination.
    fn supports(&self, rate: u32, channels: u16) -> bool;

    /// Walk the preference list and return the first supported combination.
    fn negotiate(&self) -> Option<(u32, u16)> {
        for (channels, rates) in RATE_PREFERENCES.iter() {
            for &rate in rates.iter() {
                if self.supports(rate, *channels) {
                    return Some((rate, *channels));
                }
            }
        }
        None
    }

    /// Release the capture stream.
    fn close(&mut self) {}
}

/// Opaque inference engine. Thread-confined to the inference stage.
pub trait NpuInfer: Send {
    /// Run one forward pass. `Ok(None)` means the engine produced no output
    /// for this window; the item is dropped and counted.
    fn run(&mut self, input: &FeatureTensor) -> Result<Option<NpuOutput>>;
}

/// Opaque sub-word tokenizer. Pieces retain the `▁` word-boundary marker.
pub trait Tokenizer: Send {
    fn vocab_size(&self) -> usize;

    /// Decode a token id sequence to text.
    fn decode_ids(&self, ids: &[u32]) -> Result<String>;

    /// Piece text for a single id, `▁` marker included.
    fn piece(&self, id: u32) -> Result<String>;
}

/// Pre-trained query/embedding table with integer row lookups.
pub trait EmbeddingTable: Send + Sync {
    /// Embedding dimensionality.
    fn dim(&self) -> usize;

    fn row(&self, id: usize) -> Result<&[f32]>;
}

/// Best-effort broadcast transport for wire records.
pub trait BroadcastSink: Send {
    fn send(&mut self, record: &serde_json::Value) -> Result<()>;
}

/// A sink that discards everything. Useful when no transport is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBroadcastSink;

impl BroadcastSink for NullBroadcastSink {
    fn send(&mut self, _record: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Text post-processing collaborator (spell-check / punctuation live behind
/// this seam; the core only guarantees the call site).
pub trait TextPostProcessor: Send {
    fn process(&mut self, text: &str, prev: Option<&str>) -> String;
}

/// Pass-through post-processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughPostProcessor;

impl TextPostProcessor for PassthroughPostProcessor {
    fn process(&mut self, text: &str, _prev: Option<&str>) -> String {
        text.to_string()
    }
}

impl CoreError {
    /// Whether an audio-source error is terminal for the ingress loop.
    pub fn is_source_closed(&self) -> bool {
        matches!(self, CoreError::SourceClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        rate: u32,
        channels: u16,
    }

    impl AudioSource for FixedSource {
        fn next_frame(&mut self, _timeout: Duration) -> Result<Option<AudioFrame>> {
            Ok(None)
        }

        fn device_rate_hz(&self) -> u32 {
            self.rate
        }

        fn channels(&self) -> u16 {
            self.channels
        }

        fn supports(&self, rate: u32, channels: u16) -> bool {
            rate == self.rate && channels == self.channels
        }
    }

    #[test]
    fn test_negotiate_walks_preference_list() {
        let mono = FixedSource {
            rate: 48000,
            channels: 1,
        };
        assert_eq!(mono.negotiate(), Some((48000, 1)));

        let stereo_only = FixedSource {
            rate: 44100,
            channels: 2,
        };
        assert_eq!(stereo_only.negotiate(), Some((44100, 2)));

        let unsupported = FixedSource {
            rate: 11025,
            channels: 1,
        };
        assert_eq!(unsupported.negotiate(), None);
    }

    #[test]
    fn test_passthrough_post_processor() {
        let mut pp = PassthroughPostProcessor;
        assert_eq!(pp.process("hello there", Some("prior")), "hello there");
    }
}
