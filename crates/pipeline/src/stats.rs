//! Session-wide statistics
//!
//! Counters are atomics written from every stage; snapshots are cheap
//! copies taken for status surfaces and the shutdown summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct StatisticsTracker {
    start: Instant,
    chunks_processed: AtomicU64,
    total_inference_us: AtomicU64,
    errors: AtomicU64,
    ingress_dropped: AtomicU64,
    audio_transient_errors: AtomicU64,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SessionStats {
    pub total_chunks_processed: u64,
    pub total_inference_ms: f64,
    pub average_inference_ms: f64,
    pub errors: u64,
    pub ingress_dropped: u64,
    pub audio_transient_errors: u64,
    pub uptime_s: f64,
    pub chunks_per_second: f64,
    pub error_rate: f64,
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsTracker {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            chunks_processed: AtomicU64::new(0),
            total_inference_us: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            ingress_dropped: AtomicU64::new(0),
            audio_transient_errors: AtomicU64::new(0),
        }
    }

    pub fn record_inference(&self, elapsed: Duration) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
        self.total_inference_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A raw chunk dropped because the preprocess queue was full.
    pub fn record_ingress_drop(&self) {
        self.ingress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A single failed frame read, skipped and counted.
    pub fn record_audio_transient(&self) {
        self.audio_transient_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        let chunks = self.chunks_processed.load(Ordering::Relaxed);
        let total_us = self.total_inference_us.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let uptime_s = self.start.elapsed().as_secs_f64();

        SessionStats {
            total_chunks_processed: chunks,
            total_inference_ms: total_us as f64 / 1000.0,
            average_inference_ms: if chunks > 0 {
                total_us as f64 / 1000.0 / chunks as f64
            } else {
                0.0
            },
            errors,
            ingress_dropped: self.ingress_dropped.load(Ordering::Relaxed),
            audio_transient_errors: self.audio_transient_errors.load(Ordering::Relaxed),
            uptime_s,
            chunks_per_second: if uptime_s > 0.0 {
                chunks as f64 / uptime_s
            } else {
                0.0
            },
            error_rate: if chunks > 0 {
                errors as f64 / chunks as f64
            } else {
                0.0
            },
        }
    }

    /// Shutdown summary, one tracing line per headline number.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            uptime_s = format!("{:.1}", s.uptime_s),
            chunks = s.total_chunks_processed,
            chunks_per_second = format!("{:.2}", s.chunks_per_second),
            avg_inference_ms = format!("{:.1}", s.average_inference_ms),
            errors = s.errors,
            ingress_dropped = s.ingress_dropped,
            "session statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_accounting() {
        let stats = StatisticsTracker::new();
        stats.record_inference(Duration::from_millis(50));
        stats.record_inference(Duration::from_millis(150));

        let s = stats.snapshot();
        assert_eq!(s.total_chunks_processed, 2);
        assert!((s.average_inference_ms - 100.0).abs() < 1.0);
        assert!((s.total_inference_ms - 200.0).abs() < 1.0);
    }

    #[test]
    fn test_empty_snapshot_has_no_nans() {
        let s = StatisticsTracker::new().snapshot();
        assert_eq!(s.average_inference_ms, 0.0);
        assert_eq!(s.error_rate, 0.0);
        assert_eq!(s.total_chunks_processed, 0);
    }

    #[test]
    fn test_error_rate() {
        let stats = StatisticsTracker::new();
        stats.record_inference(Duration::from_millis(10));
        stats.record_inference(Duration::from_millis(10));
        stats.record_error();

        let s = stats.snapshot();
        assert!((s.error_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_drop_counters() {
        let stats = StatisticsTracker::new();
        stats.record_ingress_drop();
        stats.record_ingress_drop();
        stats.record_audio_transient();

        let s = stats.snapshot();
        assert_eq!(s.ingress_dropped, 2);
        assert_eq!(s.audio_transient_errors, 1);
    }
}
