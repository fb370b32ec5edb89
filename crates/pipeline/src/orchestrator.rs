//! Pipeline orchestration and lifecycle
//!
//! Owns the bounded queues, the three stage workers, the async emitter and
//! the ingress loop. Startup order is emitter → postprocess → inference →
//! preprocess → ingress; shutdown sends sentinels the other way so each
//! stage drains what upstream already produced, with bounded joins
//! throughout. Resources release LIFO with their owning threads.

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::decoder::TranscriptionDecoder;
use crate::emitter::{AsyncEmitter, EmitterHandle, EmitterStatsSnapshot};
use crate::formatter::TranscriptionFormatter;
use crate::frontend::{Cmvn, WavFrontend};
use crate::ingress::IngressLoop;
use crate::language_lock::{LanguageLock, LanguageLockStatus};
use crate::noise_floor::NoiseFloorEstimator;
use crate::resampler::Resampler;
use crate::stage::{PipelineStage, StageMsg, StageStatsSnapshot};
use crate::stages::{FeatureJob, InferStage, InferenceJob, PostprocessStage, PreprocessStage};
use crate::stats::{SessionStats, StatisticsTracker};
use crate::timeline::TimelineMerger;
use crate::vad::VoiceActivityDetector;
use crate::PipelineError;
use sensestream_config::constants::stage::PUSH_TIMEOUT_MS;
use sensestream_config::Settings;
use sensestream_core::{
    AudioSource, BroadcastSink, EmbeddingTable, Labels, NpuInfer, RawChunk, TextPostProcessor,
    Tokenizer,
};

/// Externally-provided collaborators, acquired once at startup.
pub struct Collaborators {
    pub audio_source: Box<dyn AudioSource>,
    pub npu: Box<dyn NpuInfer>,
    pub tokenizer: Box<dyn Tokenizer>,
    pub embedding: Arc<dyn EmbeddingTable>,
    pub broadcast: Box<dyn BroadcastSink>,
    pub text_post: Box<dyn TextPostProcessor>,
}

/// Aggregate view over every counter surface in the pipeline.
#[derive(Clone, Debug, serde::Serialize)]
pub struct PipelineSnapshot {
    pub session: SessionStats,
    pub preprocess: StageStatsSnapshot,
    pub inference: StageStatsSnapshot,
    pub postprocess: StageStatsSnapshot,
    pub emitter: EmitterStatsSnapshot,
    pub queue_depths: QueueDepths,
    pub language_lock: LanguageLockStatus,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct QueueDepths {
    pub preprocess: usize,
    pub inference: usize,
    pub postprocess: usize,
    pub emit: usize,
}

pub struct PipelineOrchestrator {
    running: Arc<AtomicBool>,

    q0_tx: Sender<StageMsg<RawChunk>>,
    q1_tx: Sender<StageMsg<FeatureJob>>,
    q2_tx: Sender<StageMsg<InferenceJob>>,

    preprocess: PipelineStage,
    inference: PipelineStage,
    postprocess: PipelineStage,
    emitter: AsyncEmitter,
    emitter_handle: EmitterHandle,
    ingress: IngressLoop,

    stats: Arc<StatisticsTracker>,
    language_lock: Arc<LanguageLock>,
}

impl PipelineOrchestrator {
    /// Wire and start the full pipeline. Fails only on initialization
    /// problems; once running, per-window errors are counted, not fatal.
    pub fn start(settings: &Settings, collab: Collaborators) -> Result<Self, PipelineError> {
        let labels = Labels::new();
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(StatisticsTracker::new());

        // Bounded inter-stage queues
        let (q0_tx, q0_rx) = bounded::<StageMsg<RawChunk>>(settings.queues.preprocess);
        let (q1_tx, q1_rx) = bounded::<StageMsg<FeatureJob>>(settings.queues.inference);
        let (q2_tx, q2_rx) = bounded::<StageMsg<InferenceJob>>(settings.queues.postprocess);

        let cmvn = match Cmvn::load(&settings.models.cmvn_path) {
            Ok(cmvn) => Some(cmvn),
            Err(e) => {
                tracing::warn!(error = %e, "running without CMVN normalization");
                None
            },
        };

        let noise_floor = Arc::new(Mutex::new(NoiseFloorEstimator::new(
            settings.audio.noise_calib_secs,
            settings.vad.adaptive_noise_floor,
        )));
        let language_lock = Arc::new(LanguageLock::new(
            settings.language_lock.clone(),
            labels,
            &settings.frontend.language,
        ));
        let formatter = TranscriptionFormatter::new(settings.display.clone(), labels);

        // Startup order: emitter first so every stage can emit from its
        // first item on.
        let emitter = AsyncEmitter::start(formatter.clone(), collab.broadcast, settings.queues.emit);
        let emitter_handle = emitter.handle();

        let decoder = TranscriptionDecoder::new(settings.decoder.clone(), labels, collab.tokenizer);
        let merger = settings
            .timeline
            .enable_timeline_merging
            .then(|| TimelineMerger::new(settings.timeline.clone()));

        let postprocess = PipelineStage::spawn(
            "postprocess",
            PostprocessStage::new(
                decoder,
                language_lock.clone(),
                merger,
                formatter,
                collab.text_post,
                emitter_handle.clone(),
                settings.audio.chunk_duration_ms(),
            ),
            q2_rx,
            None,
            running.clone(),
        );

        let inference = PipelineStage::spawn(
            "inference",
            InferStage::new(collab.npu, stats.clone()),
            q1_rx,
            Some(q2_tx.clone()),
            running.clone(),
        );

        let device_rate = collab.audio_source.device_rate_hz();
        let preprocess = PipelineStage::spawn(
            "preprocess",
            PreprocessStage::new(
                Resampler::new(device_rate),
                VoiceActivityDetector::new(settings.vad.clone(), settings.audio.rms_margin),
                settings.vad.enable_vad,
                settings.vad.adaptive_noise_floor,
                noise_floor.clone(),
                language_lock.clone(),
                WavFrontend::new(&settings.frontend, cmvn),
                collab.embedding,
                labels,
                settings.frontend.use_itn,
            ),
            q0_rx,
            Some(q1_tx.clone()),
            running.clone(),
        );

        let ingress = IngressLoop::spawn(
            collab.audio_source,
            q0_tx.clone(),
            noise_floor,
            settings.audio.clone(),
            running.clone(),
            stats.clone(),
            emitter_handle.clone(),
        );

        tracing::info!("pipeline started: ingress + 3 stages + emitter");

        Ok(Self {
            running,
            q0_tx,
            q1_tx,
            q2_tx,
            preprocess,
            inference,
            postprocess,
            emitter,
            emitter_handle,
            ingress,
            stats,
            language_lock,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> &Arc<StatisticsTracker> {
        &self.stats
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            session: self.stats.snapshot(),
            preprocess: self.preprocess.stats().snapshot(),
            inference: self.inference.stats().snapshot(),
            postprocess: self.postprocess.stats().snapshot(),
            emitter: self.emitter_handle.stats().snapshot(),
            queue_depths: QueueDepths {
                preprocess: self.q0_tx.len(),
                inference: self.q1_tx.len(),
                postprocess: self.q2_tx.len(),
                emit: self.emitter_handle.queue_depth(),
            },
            language_lock: self.language_lock.status(),
        }
    }

    /// Cooperative shutdown: clear the running flag, stop ingress, then
    /// sentinel each stage in reverse startup order with bounded joins.
    pub fn shutdown(self) {
        tracing::info!("stopping pipeline...");
        self.running.store(false, Ordering::Relaxed);

        // Producer side first so queues only drain from here on
        self.ingress.join();

        let push_timeout = Duration::from_millis(PUSH_TIMEOUT_MS);
        let _ = self.q0_tx.send_timeout(StageMsg::Shutdown, push_timeout);
        self.preprocess.join();

        let _ = self.q1_tx.send_timeout(StageMsg::Shutdown, push_timeout);
        self.inference.join();

        let _ = self.q2_tx.send_timeout(StageMsg::Shutdown, push_timeout);
        self.postprocess.join();

        self.emitter.stop();

        self.stats.log_summary();
        tracing::info!("pipeline stopped");
    }
}
