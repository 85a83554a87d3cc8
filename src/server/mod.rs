pub mod protocol;
pub mod registry;

pub use protocol::{ErrorResponse, HealthResponse, Request, RunRequest, RunResponse, parse_request};
pub use registry::{ModelsLoaded, WorkerRegistry};

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::asr::{Transcriber, WhisperPreset};
use crate::audio::AudioNormalizer;
use crate::clinical::{ClinicalExtractor, LlmExtractorConfig, build_extraction_prompt};
use crate::config::PipelineConfig;
use crate::diarize::Diarizer;
use crate::error::Result;
use crate::models::{AudioRef, Job, JobOptions};
use crate::pipeline::{PipelineExecutor, WorkerSet};
use crate::source::SourceResolver;
use crate::translate::{Translator, TranslatorConfig};

/// Run the persistent pipeline server: line-delimited JSON over stdio.
///
/// The read loop starts immediately; workers load on a background task so
/// health probes answer while models are still coming up. One `run`
/// executes at a time; all stdout writes go through a single writer.
pub async fn run_server(config: PipelineConfig) -> Result<()> {
    // A missing media converter is fatal at server startup.
    AudioNormalizer::check_environment().await?;

    let registry = Arc::new(WorkerRegistry::new());
    let executor = Arc::new(PipelineExecutor::new(config.clone())?);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.write_all(b"\n").await;
            let _ = stdout.flush().await;
        }
    });

    let loader = {
        let registry = Arc::clone(&registry);
        let out_tx = out_tx.clone();
        let config = config.clone();
        tokio::spawn(async move {
            load_and_warmup(config, registry, out_tx).await;
        })
    };

    // Single consumer: jobs run one at a time, in arrival order.
    let (job_tx, mut job_rx) = mpsc::unbounded_channel::<RunRequest>();
    let dispatcher = {
        let registry = Arc::clone(&registry);
        let executor = Arc::clone(&executor);
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(request) = job_rx.recv().await {
                let response = handle_run(&executor, &registry, request).await;
                send_json(&out_tx, &response);
            }
        })
    };

    info!("pipeline server ready - listening for commands on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, finishing in-flight work");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    dispatch_line(line, &registry, &job_tx, &out_tx);
                }
                Ok(None) => {
                    info!("stdin closed, shutting down");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to read request channel");
                    break;
                }
            }
        }
    }

    // Let the dispatcher drain queued work, then stop the writer. An
    // unfinished loader would keep the writer alive, so cut it loose.
    drop(job_tx);
    let _ = dispatcher.await;
    if !loader.is_finished() {
        loader.abort();
    }
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

/// Answer health probes and protocol errors inline; queue runs for the
/// dispatcher.
fn dispatch_line(
    line: &str,
    registry: &Arc<WorkerRegistry>,
    job_tx: &mpsc::UnboundedSender<RunRequest>,
    out_tx: &mpsc::UnboundedSender<String>,
) {
    match parse_request(line) {
        Ok(Request::Health) => send_json(out_tx, &health_snapshot(registry)),
        Ok(Request::Run(run)) => {
            if job_tx.send(run).is_err() {
                send_json(out_tx, &ErrorResponse::new("server is shutting down"));
            }
        }
        Ok(Request::Unknown(cmd)) => send_json(out_tx, &ErrorResponse::unknown_command(&cmd)),
        Err(e) => send_json(out_tx, &ErrorResponse::new(e.to_string())),
    }
}

async fn handle_run(
    executor: &PipelineExecutor,
    registry: &WorkerRegistry,
    request: RunRequest,
) -> RunResponse {
    let job_id = request
        .job_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let Some(audio_input) = request.audio_input() else {
        return RunResponse::Failed {
            job_id,
            status: "failed",
            error: "Missing audio_path or audio_s3_path".to_string(),
            trace: String::new(),
        };
    };

    let mut job = Job::new(
        job_id.clone(),
        AudioRef::parse(audio_input),
        JobOptions {
            language: None,
            skip_translation: request.skip_translation,
            skip_clinical: request.skip_clinical,
        },
    );

    let workers = registry.workers();
    match executor.run(&mut job, &workers).await {
        Ok(result) => RunResponse::done(job_id, result),
        Err(e) => RunResponse::failed(job_id, &e),
    }
}

fn health_snapshot(registry: &WorkerRegistry) -> HealthResponse {
    HealthResponse {
        status: "ok",
        ready: registry.is_ready(),
        models_loaded: registry.models_loaded(),
        models_initialization_done: registry.is_ready(),
        model_errors: registry.load_errors(),
    }
}

fn send_json<T: Serialize>(out_tx: &mpsc::UnboundedSender<String>, value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => {
            let _ = out_tx.send(line);
        }
        Err(e) => error!(error = %e, "failed to serialize response"),
    }
}

/// Initialize every heavy worker, recording per-worker failures, then run
/// the warm-up pass and flip the ready event.
async fn load_and_warmup(
    config: PipelineConfig,
    registry: Arc<WorkerRegistry>,
    out_tx: mpsc::UnboundedSender<String>,
) {
    info!("background loader starting");
    let mut workers = WorkerSet::default();

    match SourceResolver::new(&config).await {
        Ok(resolver) => workers.resolver = Some(Arc::new(resolver)),
        Err(e) => registry.record_error(format!("object store init failed: {}", e)),
    }

    let preset = WhisperPreset::from_name(&config.whisper_model_size);
    let model_dir = config.model_dir.clone();
    match tokio::task::spawn_blocking(move || Transcriber::new(&model_dir, preset)).await {
        Ok(Ok(transcriber)) => workers.transcriber = Some(Arc::new(transcriber)),
        Ok(Err(e)) => registry.record_error(format!("whisper load failed: {}", e)),
        Err(e) => registry.record_error(format!("whisper loader panicked: {}", e)),
    }

    if config.hf_token.is_some() {
        let segmentation = config.segmentation_model.clone();
        let embedding = config.embedding_model.clone();
        let max_speakers = config.max_speakers;
        match tokio::task::spawn_blocking(move || {
            Diarizer::new(segmentation, embedding, max_speakers)
        })
        .await
        {
            Ok(Ok(diarizer)) => workers.diarizer = Some(Arc::new(diarizer)),
            Ok(Err(e)) => registry.record_error(format!("diarizer load failed: {}", e)),
            Err(e) => registry.record_error(format!("diarizer loader panicked: {}", e)),
        }
    } else {
        info!("HF_TOKEN not set, diarization disabled");
    }

    match &config.sealion_api_key {
        Some(key) => match Translator::new(TranslatorConfig::new(key.clone())) {
            Ok(translator) => workers.translator = Some(Arc::new(translator)),
            Err(e) => registry.record_error(format!("translator init failed: {}", e)),
        },
        None => info!("SEALION_API_KEY not set, translator disabled"),
    }

    let llm_config = config.clinical_endpoint.clone().map(|endpoint| LlmExtractorConfig {
        endpoint,
        model: config.clinical_model.clone(),
        api_key: None,
    });
    match ClinicalExtractor::new(llm_config) {
        Ok(extractor) => workers.extractor = Some(Arc::new(extractor)),
        Err(e) => registry.record_error(format!("clinical extractor init failed: {}", e)),
    }

    registry.install(workers.clone());
    info!("models loaded, starting warmup");
    warm_up(&workers).await;

    registry.set_ready();
    info!("background model load completed");

    // Push a health line so the host learns readiness without polling.
    send_json(&out_tx, &health_snapshot(&registry));
}

/// Exercise each worker once with a dummy payload. Failures are logged
/// and never fatal.
async fn warm_up(workers: &WorkerSet) {
    if let Some(transcriber) = &workers.transcriber {
        let transcriber = Arc::clone(transcriber);
        let outcome = tokio::task::spawn_blocking(move || {
            let silence = vec![0.0f32; 16_000];
            transcriber.transcribe(&silence, "auto", "warmup")
        })
        .await;
        match outcome {
            Ok(Ok(_)) => info!("whisper warmup completed"),
            Ok(Err(e)) => warn!(error = %e, "whisper warmup failed (non-critical)"),
            Err(e) => warn!(error = %e, "whisper warmup panicked (non-critical)"),
        }
    }

    if workers.extractor.is_some() {
        // Prompt assembly only; no inference.
        let _ = build_extraction_prompt("Warmup prompt: patient complains of cough.");
        info!("clinical extractor warmup completed (no inference)");
    }

    if let Some(translator) = &workers.translator {
        match translator.warm_up().await {
            Ok(()) => info!("translator warmup completed"),
            Err(e) => warn!(error = %e, "translator warmup failed (non-critical)"),
        }
    }
}
