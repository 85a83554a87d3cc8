use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use medscribe::asr::{Transcriber, WhisperPreset};
use medscribe::audio::AudioNormalizer;
use medscribe::clinical::{ClinicalExtractor, LlmExtractorConfig};
use medscribe::config::PipelineConfig;
use medscribe::diarize::Diarizer;
use medscribe::io::{ArtifactStore, adapt_transcript};
use medscribe::models::{AudioRef, Job, JobOptions, RecordMetadata};
use medscribe::pipeline::{PipelineExecutor, WorkerSet};
use medscribe::server;
use medscribe::source::SourceResolver;
use medscribe::translate::{Translator, TranslatorConfig};

#[derive(Parser)]
#[command(name = "medscribe")]
#[command(author, version, about = "Medical consultation audio pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one audio file through the full pipeline
    Process {
        /// Audio input: local path, s3:// URI, or bare object key
        audio_input: String,

        /// Language hint (auto, en, ms, zh, ...)
        #[arg(short, long, default_value = "auto")]
        language: String,

        /// ASR model preset
        #[arg(short, long, default_value = "small")]
        model_size: String,

        /// Maximum number of speakers for diarization
        #[arg(long, default_value = "4")]
        max_speakers: usize,

        /// Skip the translation stage
        #[arg(long)]
        skip_translation: bool,

        /// Skip the clinical extraction stage
        #[arg(long)]
        skip_clinical: bool,

        /// Cache directory for downloaded and converted audio
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Root of the artifact output tree
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Extract a clinical record from an existing transcript JSON file
    Extract {
        /// Transcript JSON: lean, translated, or free-form shapes
        input: PathBuf,

        /// Root of the artifact output tree
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List audio objects in the configured bucket
    List {
        /// Key prefix to filter on
        #[arg(long, default_value = "")]
        prefix: String,

        /// Bucket to list (default: AUDIO_S3_BUCKET)
        #[arg(long)]
        bucket: Option<String>,
    },

    /// Run the persistent pipeline server on stdin/stdout
    Serve {
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            audio_input,
            language,
            model_size,
            max_speakers,
            skip_translation,
            skip_clinical,
            cache_dir,
            output_dir,
            verbose,
        } => {
            setup_logging(verbose);
            let mut config = PipelineConfig::from_env();
            config.whisper_model_size = model_size;
            config.max_speakers = max_speakers;
            if let Some(dir) = cache_dir {
                config.cache_dir = dir;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            process_audio(config, audio_input, language, skip_translation, skip_clinical).await
        }
        Commands::Extract {
            input,
            output_dir,
            verbose,
        } => {
            setup_logging(verbose);
            let mut config = PipelineConfig::from_env();
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            extract_from_file(config, input).await
        }
        Commands::List { prefix, bucket } => {
            setup_logging(false);
            list_audio(prefix, bucket).await
        }
        Commands::Serve { verbose } => {
            setup_logging(verbose);
            let config = PipelineConfig::from_env();
            server::run_server(config).await.context("pipeline server failed")
        }
    }
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let ansi = std::env::var_os("NO_COLOR").is_none();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        // Logs share the process with the stdio protocol; keep them off
        // stdout.
        .with_writer(std::io::stderr)
        .init();
}

async fn process_audio(
    config: PipelineConfig,
    audio_input: String,
    language: String,
    skip_translation: bool,
    skip_clinical: bool,
) -> Result<()> {
    AudioNormalizer::check_environment()
        .await
        .context("media converter missing")?;

    info!(input = %audio_input, "initializing pipeline workers");
    let workers = build_workers(&config).await?;
    let executor = PipelineExecutor::new(config)?;

    let options = JobOptions {
        language: Some(language),
        skip_translation,
        skip_clinical,
    };
    let mut job = Job::new(
        uuid::Uuid::new_v4().to_string(),
        AudioRef::parse(&audio_input),
        options,
    );

    let result = executor
        .run(&mut job, &workers)
        .await
        .context("pipeline failed")?;

    info!("pipeline completed");
    info!(path = %result.raw_transcript.display(), "raw transcript");
    info!(path = %result.lean_transcript.display(), "lean transcript");
    if let Some(path) = &result.translated_transcript {
        info!(path = %path.display(), "translated transcript");
    }
    if let Some(path) = &result.clinical_extraction {
        info!(path = %path.display(), "clinical extraction");
    }
    for warning in &result.warnings {
        warn!(%warning, "stage degraded");
    }

    Ok(())
}

/// Build the worker set synchronously for a one-shot run. The transcriber
/// is required; every optional worker degrades with a warning.
async fn build_workers(config: &PipelineConfig) -> Result<WorkerSet> {
    let mut workers = WorkerSet::default();

    match SourceResolver::new(config).await {
        Ok(resolver) => workers.resolver = Some(Arc::new(resolver)),
        Err(e) => warn!(error = %e, "object store unavailable, only local files will resolve"),
    }

    let preset = WhisperPreset::from_name(&config.whisper_model_size);
    let transcriber =
        Transcriber::new(&config.model_dir, preset).context("failed to load ASR model")?;
    workers.transcriber = Some(Arc::new(transcriber));

    if config.hf_token.is_some() {
        match Diarizer::new(
            &config.segmentation_model,
            &config.embedding_model,
            config.max_speakers,
        ) {
            Ok(diarizer) => workers.diarizer = Some(Arc::new(diarizer)),
            Err(e) => warn!(error = %e, "diarization unavailable, continuing single-speaker"),
        }
    } else {
        info!("HF_TOKEN not set, skipping speaker diarization");
    }

    match &config.sealion_api_key {
        Some(key) => match Translator::new(TranslatorConfig::new(key.clone())) {
            Ok(translator) => workers.translator = Some(Arc::new(translator)),
            Err(e) => warn!(error = %e, "translator unavailable"),
        },
        None => info!("SEALION_API_KEY not set, translation disabled"),
    }

    let llm_config = config.clinical_endpoint.clone().map(|endpoint| LlmExtractorConfig {
        endpoint,
        model: config.clinical_model.clone(),
        api_key: None,
    });
    workers.extractor = Some(Arc::new(
        ClinicalExtractor::new(llm_config).context("failed to init clinical extractor")?,
    ));

    Ok(workers)
}

/// Run only the extraction stage over a transcript already on disk. The
/// input may be a lean transcript, a translated one, or any of the other
/// recognized shapes.
async fn extract_from_file(config: PipelineConfig, input: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).context("input is not valid JSON")?;
    let transcript = adapt_transcript(&value)
        .context("input does not match any recognized transcript shape")?;

    let llm_config = config.clinical_endpoint.clone().map(|endpoint| LlmExtractorConfig {
        endpoint,
        model: config.clinical_model.clone(),
        api_key: None,
    });
    let extractor = ClinicalExtractor::new(llm_config)?;

    info!(input = %input.display(), turns = transcript.turns.len(), "extracting clinical record");
    let (mut record, method) = extractor.extract(&transcript).await?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().replace("_translated", ""))
        .unwrap_or_else(|| "transcript".to_string());
    record.metadata = Some(RecordMetadata {
        source_file: input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        model_used: extractor.model_name(),
        extraction_method: method.to_string(),
        pipeline_version: "1.0".to_string(),
        extracted_at: chrono::Utc::now().to_rfc3339(),
    });

    let store = ArtifactStore::new(&config.output_dir)?;
    let path = store.write_clinical(&stem, &record)?;
    info!(path = %path.display(), method, "clinical record written");
    Ok(())
}

async fn list_audio(prefix: String, bucket: Option<String>) -> Result<()> {
    let config = PipelineConfig::from_env();
    let resolver = SourceResolver::new(&config)
        .await
        .context("failed to initialize object store client")?;

    let files = resolver
        .list_audio_files(&prefix, bucket.as_deref())
        .await
        .context("failed to list audio files")?;

    println!("Found {} audio file(s):", files.len());
    for uri in files {
        println!("  {}", uri);
    }
    Ok(())
}
