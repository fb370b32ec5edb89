//! Live transcription service entry point
//!
//! Loads configuration, acquires the collaborators (inference engine,
//! tokenizer, embedding table, audio source), starts the pipeline and runs
//! until interrupted.
//!
//! Exit codes: 0 normal, 1 initialization failure (missing model artifacts),
//! 2 audio device unavailable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use sensestream_config::{load_settings, Settings};
use sensestream_core::{NullBroadcastSink, PassthroughPostProcessor};
use sensestream_pipeline::{
    Collaborators, JsonVocabTokenizer, NpyEmbeddingTable, PipelineOrchestrator, WavFileSource,
};

const EXIT_INIT_FAILURE: i32 = 1;
const EXIT_AUDIO_UNAVAILABLE: i32 = 2;

/// Snapshot log cadence while running.
const STATS_INTERVAL_S: u64 = 30;

fn main() {
    init_tracing();
    std::process::exit(run());
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn run() -> i32 {
    tracing::info!("starting sensestream v{}", env!("CARGO_PKG_VERSION"));

    let config_file = std::env::var("SENSESTREAM_CONFIG").ok();
    let settings = match load_settings(config_file.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "configuration failed");
            return EXIT_INIT_FAILURE;
        },
    };

    if let Err(e) = settings.validate_model_paths() {
        tracing::error!(error = %e, "required model artifact missing");
        return EXIT_INIT_FAILURE;
    }

    let collaborators = match build_collaborators(&settings) {
        Ok(c) => c,
        Err(BuildError::Init(e)) => {
            tracing::error!(error = %e, "initialization failed");
            return EXIT_INIT_FAILURE;
        },
        Err(BuildError::Audio(e)) => {
            tracing::error!(error = %e, "audio device unavailable");
            return EXIT_AUDIO_UNAVAILABLE;
        },
    };

    let orchestrator = match PipelineOrchestrator::start(&settings, collaborators) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(error = %e, "pipeline failed to start");
            return EXIT_INIT_FAILURE;
        },
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
        }) {
            tracing::warn!(error = %e, "could not install signal handler");
        }
    }

    tracing::info!("live transcription running, press Ctrl+C to stop");

    let mut ticks: u64 = 0;
    while !interrupted.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
        ticks += 1;
        if ticks % (STATS_INTERVAL_S * 5) == 0 {
            let snapshot = orchestrator.snapshot();
            tracing::info!(
                chunks = snapshot.session.total_chunks_processed,
                avg_inference_ms = format!("{:.1}", snapshot.session.average_inference_ms),
                emitted = snapshot.emitter.emitted,
                dropped = snapshot.emitter.dropped + snapshot.session.ingress_dropped,
                q0 = snapshot.queue_depths.preprocess,
                q1 = snapshot.queue_depths.inference,
                q2 = snapshot.queue_depths.postprocess,
                "pipeline status"
            );
        }
    }

    tracing::info!("interrupt received, shutting down");
    orchestrator.shutdown();
    0
}

enum BuildError {
    Init(String),
    Audio(String),
}

fn build_collaborators(settings: &Settings) -> Result<Collaborators, BuildError> {
    let tokenizer = JsonVocabTokenizer::load(&settings.models.bpe_path)
        .map_err(|e| BuildError::Init(e.to_string()))?;

    let embedding = NpyEmbeddingTable::load(&settings.models.embedding_path)
        .map_err(|e| BuildError::Init(e.to_string()))?;

    let npu = build_engine(settings)?;

    // The capture seam: a WAV file path replays offline audio through the
    // exact live path. A real microphone driver implements the same trait.
    let device = settings
        .audio
        .audio_device
        .clone()
        .ok_or_else(|| BuildError::Audio("no audio device configured (AUDIO_DEVICE)".to_string()))?;
    let audio_source = WavFileSource::open(&device, settings.audio.chunk_size)
        .map_err(|e| BuildError::Audio(e.to_string()))?;

    Ok(Collaborators {
        audio_source: Box::new(audio_source),
        npu,
        tokenizer: Box::new(tokenizer),
        embedding: Arc::new(embedding),
        broadcast: Box::new(NullBroadcastSink),
        text_post: Box::new(PassthroughPostProcessor),
    })
}

#[cfg(feature = "onnx")]
fn build_engine(
    settings: &Settings,
) -> Result<Box<dyn sensestream_core::NpuInfer>, BuildError> {
    let engine = sensestream_pipeline::OnnxNpuEngine::load(&settings.models.model_path)
        .map_err(|e| BuildError::Init(e.to_string()))?;
    Ok(Box::new(engine))
}

#[cfg(not(feature = "onnx"))]
fn build_engine(
    _settings: &Settings,
) -> Result<Box<dyn sensestream_core::NpuInfer>, BuildError> {
    Err(BuildError::Init(
        "built without an inference engine (enable the onnx feature)".to_string(),
    ))
}
