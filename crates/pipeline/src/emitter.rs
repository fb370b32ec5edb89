//! Non-blocking result emission
//!
//! Producers hand results to a bounded queue and never block: a full queue
//! drops the envelope and bumps a counter. A dedicated worker thread owns
//! every blocking sink (console write, broadcast send); a failing sink is
//! counted and contained, never propagated upstream.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::formatter::TranscriptionFormatter;
use sensestream_config::constants::stage::{EMITTER_JOIN_TIMEOUT_MS, POP_TIMEOUT_MS};
use sensestream_core::{BroadcastSink, ChunkResult, StatusRecord, TranscriptionRecord, Word};

/// One transcription queued for emission.
pub struct EmitEnvelope {
    pub text: String,
    pub result: ChunkResult,
    /// New-words subset when timeline merging narrowed the emission.
    pub words: Option<Vec<Word>>,
}

enum EmitMsg {
    Transcription(Box<EmitEnvelope>),
    Status(StatusRecord),
    Shutdown,
}

#[derive(Default)]
pub struct EmitterStats {
    pub emitted: AtomicU64,
    pub dropped: AtomicU64,
    pub errors: AtomicU64,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct EmitterStatsSnapshot {
    pub emitted: u64,
    pub dropped: u64,
    pub errors: u64,
}

impl EmitterStats {
    pub fn snapshot(&self) -> EmitterStatsSnapshot {
        EmitterStatsSnapshot {
            emitted: self.emitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Cheap cloneable producer handle.
#[derive(Clone)]
pub struct EmitterHandle {
    tx: Sender<EmitMsg>,
    stats: Arc<EmitterStats>,
}

impl EmitterHandle {
    /// Queue a transcription. Non-blocking; returns `false` on a full queue.
    pub fn emit(&self, text: String, result: ChunkResult, words: Option<Vec<Word>>) -> bool {
        let envelope = Box::new(EmitEnvelope {
            text,
            result,
            words,
        });
        match self.tx.try_send(EmitMsg::Transcription(envelope)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(total_dropped = dropped, "emission queue full, dropping result");
                false
            },
        }
    }

    /// Queue a status record. Best-effort, silent on overflow.
    pub fn emit_status(&self, message: impl Into<String>) {
        let record = StatusRecord::new(message);
        if self.tx.try_send(EmitMsg::Status(record)).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> &Arc<EmitterStats> {
        &self.stats
    }

    pub fn queue_depth(&self) -> usize {
        self.tx.len()
    }
}

pub struct AsyncEmitter {
    handle: EmitterHandle,
    worker: Option<thread::JoinHandle<()>>,
    done_rx: Receiver<()>,
}

impl AsyncEmitter {
    /// Start the emitter worker owning the console and broadcast sinks.
    pub fn start(
        formatter: TranscriptionFormatter,
        mut sink: Box<dyn BroadcastSink>,
        queue_size: usize,
    ) -> Self {
        let (tx, rx) = bounded::<EmitMsg>(queue_size);
        let (done_tx, done_rx) = bounded::<()>(1);
        let stats = Arc::new(EmitterStats::default());
        let worker_stats = stats.clone();

        let worker = thread::Builder::new()
            .name("emitter".to_string())
            .spawn(move || {
                emit_worker(rx, formatter, &mut *sink, &worker_stats);
                let _ = done_tx.send(());
            })
            .expect("failed to spawn emitter thread");

        tracing::info!(queue_size, "async emitter started");

        Self {
            handle: EmitterHandle { tx, stats },
            worker: Some(worker),
            done_rx,
        }
    }

    pub fn handle(&self) -> EmitterHandle {
        self.handle.clone()
    }

    /// Stop the worker: sentinel, then a bounded join.
    pub fn stop(mut self) {
        let _ = self
            .handle
            .tx
            .send_timeout(EmitMsg::Shutdown, Duration::from_millis(POP_TIMEOUT_MS));

        let finished = self
            .done_rx
            .recv_timeout(Duration::from_millis(EMITTER_JOIN_TIMEOUT_MS))
            .is_ok();

        if finished {
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        } else {
            tracing::warn!("emitter did not stop within timeout, detaching");
        }

        let snapshot = self.handle.stats.snapshot();
        tracing::info!(
            emitted = snapshot.emitted,
            dropped = snapshot.dropped,
            errors = snapshot.errors,
            "async emitter stopped"
        );
    }
}

fn emit_worker(
    rx: Receiver<EmitMsg>,
    formatter: TranscriptionFormatter,
    sink: &mut dyn BroadcastSink,
    stats: &EmitterStats,
) {
    tracing::debug!("emitter worker thread started");

    loop {
        match rx.recv_timeout(Duration::from_millis(POP_TIMEOUT_MS)) {
            Ok(EmitMsg::Shutdown) => break,
            Ok(EmitMsg::Transcription(envelope)) => {
                do_emit(&envelope, &formatter, sink, stats);
            },
            Ok(EmitMsg::Status(record)) => {
                match serde_json::to_value(&record) {
                    Ok(value) => {
                        if let Err(e) = sink.send(&value) {
                            stats.errors.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(error = %e, "status broadcast failed");
                        }
                    },
                    Err(e) => {
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = %e, "status serialization failed");
                    },
                }
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::debug!("emitter worker thread stopped");
}

/// All blocking sink I/O happens here, on the worker thread.
fn do_emit(
    envelope: &EmitEnvelope,
    formatter: &TranscriptionFormatter,
    sink: &mut dyn BroadcastSink,
    stats: &EmitterStats,
) {
    let display = formatter.format_display(&envelope.text, &envelope.result);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = writeln!(out, "TRANSCRIPT: {display}").and_then(|_| out.flush()) {
        stats.errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(error = %e, "console write failed");
    }
    drop(out);

    let record = TranscriptionRecord::from_result(
        &envelope.text,
        &envelope.result,
        envelope.words.as_deref(),
    );
    match serde_json::to_value(&record) {
        Ok(value) => {
            if let Err(e) = sink.send(&value) {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, "broadcast send failed");
            }
        },
        Err(e) => {
            stats.errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "record serialization failed");
        },
    }

    stats.emitted.fetch_add(1, Ordering::Relaxed);
}
