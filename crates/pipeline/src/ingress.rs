//! Audio ingress loop
//!
//! Pulls device frames, maintains a rolling device-rate buffer, and frames
//! it into fixed-duration overlapping chunks for the preprocess queue.
//! While the noise floor is uncalibrated, the accumulated prefix feeds the
//! bootstrap instead and nothing is submitted. Queue overflow drops the
//! newest chunk with a counter so the audio driver is never blocked.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::emitter::EmitterHandle;
use crate::noise_floor::NoiseFloorEstimator;
use crate::stage::StageMsg;
use crate::stats::StatisticsTracker;
use sensestream_config::constants::stage::{INGRESS_POLL_TIMEOUT_MS, JOIN_TIMEOUT_MS};
use sensestream_config::AudioConfig;
use sensestream_core::{rms_i16, AudioSource, CoreError, RawChunk};

pub struct IngressLoop {
    worker: Option<thread::JoinHandle<()>>,
    done_rx: Receiver<()>,
}

impl IngressLoop {
    /// Spawn the ingress worker. It owns the audio source and releases it
    /// on exit.
    pub fn spawn(
        mut source: Box<dyn AudioSource>,
        tx: Sender<StageMsg<RawChunk>>,
        noise_floor: Arc<Mutex<NoiseFloorEstimator>>,
        config: AudioConfig,
        running: Arc<AtomicBool>,
        stats: Arc<StatisticsTracker>,
        emitter: EmitterHandle,
    ) -> Self {
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker = thread::Builder::new()
            .name("ingress".to_string())
            .spawn(move || {
                ingress_loop(&mut *source, &tx, &noise_floor, &config, &running, &stats, &emitter);
                source.close();
                let _ = done_tx.send(());
            })
            .expect("failed to spawn ingress thread");

        Self {
            worker: Some(worker),
            done_rx,
        }
    }

    /// Bounded join after `running` has been cleared.
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
            tracing::warn!("ingress did not stop within timeout, detaching");
        }
    }
}

fn ingress_loop(
    source: &mut dyn AudioSource,
    tx: &Sender<StageMsg<RawChunk>>,
    noise_floor: &Mutex<NoiseFloorEstimator>,
    config: &AudioConfig,
    running: &AtomicBool,
    stats: &StatisticsTracker,
    emitter: &EmitterHandle,
) {
    let device_rate = source.device_rate_hz();
    let chunk_samples = (device_rate as f64 * config.chunk_duration_s) as usize;
    let overlap_samples = (device_rate as f64 * config.overlap_duration_s) as usize;
    let calib_samples = (device_rate as f64 * config.noise_calib_secs) as usize;

    tracing::info!(
        device_rate,
        chunk_s = config.chunk_duration_s,
        overlap_s = config.overlap_duration_s,
        "ingress loop started"
    );

    let mut buffer: Vec<i16> = Vec::with_capacity(chunk_samples + overlap_samples);
    let mut chunk_index: u64 = 0;

    while running.load(Ordering::Relaxed) {
        let frame = match source.next_frame(Duration::from_millis(INGRESS_POLL_TIMEOUT_MS)) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(CoreError::SourceClosed) => {
                tracing::info!("audio source closed, ingress stopping");
                break;
            },
            Err(e) => {
                stats.record_audio_transient();
                tracing::debug!(error = %e, "transient frame read failure, skipping");
                continue;
            },
        };

        let frame = frame.to_mono();
        buffer.extend_from_slice(&frame.samples);

        // Bootstrap: feed the accumulated prefix until calibration lands;
        // no chunks are submitted during this phase.
        {
            let mut nf = noise_floor.lock();
            if !nf.is_calibrated() {
                let prefix_len = buffer.len().min(calib_samples);
                let prefix = &buffer[..prefix_len];
                let seen_s = prefix_len as f64 / device_rate as f64;
                if nf.absorb_bootstrap(rms_i16(prefix), seen_s) {
                    drop(nf);
                    emitter.emit_status(format!(
                        "noise floor calibrated over {:.1}s",
                        config.noise_calib_secs
                    ));
                }
                continue;
            }
        }

        if buffer.len() < chunk_samples {
            continue;
        }

        // Frame one window: the first chunk_duration worth is the payload,
        // the final overlap_duration of the buffer seeds the next window.
        let payload = buffer[..chunk_samples].to_vec();
        if overlap_samples > 0 && buffer.len() >= overlap_samples {
            let tail_start = buffer.len() - overlap_samples;
            buffer.drain(..tail_start);
        } else {
            buffer.clear();
        }

        let chunk = RawChunk {
            samples: payload,
            device_rate_hz: device_rate,
            chunk_index,
        };
        chunk_index += 1;

        match tx.try_send(StageMsg::Item(chunk)) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                stats.record_ingress_drop();
                tracing::warn!(chunk = chunk_index - 1, "preprocess queue full, dropping chunk");
            },
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    tracing::info!(chunks = chunk_index, "ingress loop stopped");
}
