//! Generic pipeline stage worker
//!
//! A stage owns one OS thread, pops items from its bounded input queue with
//! a timeout, runs its processor, and pushes results downstream with a
//! bounded timeout. Rejections (`Ok(None)`) count as skipped; errors are
//! counted and never terminate the worker. The shutdown sentinel is an
//! explicit message variant, not a magic item.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::PipelineError;
use sensestream_config::constants::stage::{
    JOIN_TIMEOUT_MS, POP_TIMEOUT_MS, PUSH_TIMEOUT_MS, SLOW_PROCESS_WARN_MS,
};

/// Message moving through a stage queue.
pub enum StageMsg<T> {
    Item(T),
    Shutdown,
}

/// A unit of stage work. `Ok(None)` means "skip this item".
pub trait StageProcessor: Send + 'static {
    type In: Send + 'static;
    type Out: Send + 'static;

    fn process(&mut self, item: Self::In) -> Result<Option<Self::Out>, PipelineError>;
}

#[derive(Default)]
pub struct StageStats {
    pub processed: AtomicU64,
    pub skipped: AtomicU64,
    pub errors: AtomicU64,
    /// Items dropped on a timed-out downstream push.
    pub dropped: AtomicU64,
    total_time_us: AtomicU64,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct StageStatsSnapshot {
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
    pub dropped: u64,
    pub avg_time_ms: f64,
}

impl StageStats {
    pub fn snapshot(&self) -> StageStatsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let total_us = self.total_time_us.load(Ordering::Relaxed);
        StageStatsSnapshot {
            processed,
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            avg_time_ms: if processed > 0 {
                total_us as f64 / 1000.0 / processed as f64
            } else {
                0.0
            },
        }
    }
}

/// Handle to a running stage worker.
pub struct PipelineStage {
    name: &'static str,
    worker: Option<thread::JoinHandle<()>>,
    done_rx: Receiver<()>,
    stats: Arc<StageStats>,
}

impl PipelineStage {
    /// Spawn a worker thread around a processor.
    pub fn spawn<P: StageProcessor>(
        name: &'static str,
        mut processor: P,
        input: Receiver<StageMsg<P::In>>,
        output: Option<Sender<StageMsg<P::Out>>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let stats = Arc::new(StageStats::default());
        let worker_stats = stats.clone();
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker = thread::Builder::new()
            .name(format!("stage-{name}"))
            .spawn(move || {
                tracing::info!(stage = name, "stage worker started");
                worker_loop(name, &mut processor, &input, output.as_ref(), &running, &worker_stats);
                tracing::info!(stage = name, "stage worker stopped");
                let _ = done_tx.send(());
            })
            .expect("failed to spawn stage thread");

        Self {
            name,
            worker: Some(worker),
            done_rx,
            stats,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> &Arc<StageStats> {
        &self.stats
    }

    /// Bounded join: wait for the worker's completion signal, then reap it.
    pub fn join(mut self) {
        let finished = self
            .done_rx
            .recv_timeout(Duration::from_millis(JOIN_TIMEOUT_MS))
            .is_ok();

        if finished {
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        } else {
            tracing::warn!(stage = self.name, "stage did not stop within timeout, detaching");
        }

        let snapshot = self.stats.snapshot();
        tracing::info!(
            stage = self.name,
            processed = snapshot.processed,
            skipped = snapshot.skipped,
            errors = snapshot.errors,
            dropped = snapshot.dropped,
            avg_time_ms = format!("{:.1}", snapshot.avg_time_ms),
            "stage stopped"
        );
    }
}

fn worker_loop<P: StageProcessor>(
    name: &'static str,
    processor: &mut P,
    input: &Receiver<StageMsg<P::In>>,
    output: Option<&Sender<StageMsg<P::Out>>>,
    running: &AtomicBool,
    stats: &StageStats,
) {
    loop {
        let msg = match input.recv_timeout(Duration::from_millis(POP_TIMEOUT_MS)) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                continue;
            },
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let item = match msg {
            StageMsg::Item(item) => item,
            StageMsg::Shutdown => break,
        };

        let start = Instant::now();
        let outcome = processor.process(item);
        let elapsed = start.elapsed();
        stats
            .total_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        if elapsed.as_millis() as u64 > SLOW_PROCESS_WARN_MS {
            tracing::warn!(
                stage = name,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow stage processing"
            );
        }

        match outcome {
            Ok(Some(out)) => {
                stats.processed.fetch_add(1, Ordering::Relaxed);
                if let Some(tx) = output {
                    match tx.send_timeout(
                        StageMsg::Item(out),
                        Duration::from_millis(PUSH_TIMEOUT_MS),
                    ) {
                        Ok(()) => {},
                        Err(SendTimeoutError::Timeout(_)) => {
                            stats.dropped.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(stage = name, "output queue full, dropping result");
                        },
                        Err(SendTimeoutError::Disconnected(_)) => break,
                    }
                }
            },
            Ok(None) => {
                stats.skipped.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(stage = name, error = %e, "stage processing error");
            },
        }
    }
}
