use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::asr::Transcriber;
use crate::audio::{AudioNormalizer, read_wav_samples};
use crate::clinical::ClinicalExtractor;
use crate::config::PipelineConfig;
use crate::diarize::{Diarizer, assign_word_speakers};
use crate::error::{PipelineError, Result};
use crate::io::{ArtifactStore, audio_stem};
use crate::models::{
    AudioRef, Job, JobResult, JobStatus, LeanTranscript, RecordMetadata,
};
use crate::source::SourceResolver;
use crate::translate::Translator;
use crate::turns;

const PIPELINE_VERSION: &str = "1.0";

/// The heavy workers a job runs against. Optional slots stay empty when a
/// credential is missing or the background loader failed.
#[derive(Clone, Default)]
pub struct WorkerSet {
    pub resolver: Option<Arc<SourceResolver>>,
    pub transcriber: Option<Arc<Transcriber>>,
    pub diarizer: Option<Arc<Diarizer>>,
    pub translator: Option<Arc<Translator>>,
    pub extractor: Option<Arc<ClinicalExtractor>>,
}

/// Sequences the pipeline stages for a single job and persists each
/// stage's artifact before the next begins.
pub struct PipelineExecutor {
    config: PipelineConfig,
    artifacts: ArtifactStore,
    normalizer: AudioNormalizer,
}

impl PipelineExecutor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let artifacts = ArtifactStore::new(&config.output_dir)?;
        let normalizer = AudioNormalizer::new(&config.cache_dir);
        Ok(Self {
            config,
            artifacts,
            normalizer,
        })
    }

    pub async fn run(&self, job: &mut Job, workers: &WorkerSet) -> Result<JobResult> {
        job.status = JobStatus::Running;
        match self.run_stages(job, workers).await {
            Ok(result) => {
                job.status = JobStatus::Done;
                Ok(result)
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, job: &Job, workers: &WorkerSet) -> Result<JobResult> {
        let job_id = job.job_id.as_str();
        let mut result = JobResult::default();

        // Fetch.
        info!(job_id, stage = "resolve", audio = %job.audio_ref, "resolving audio source");
        let local_path = match &job.audio_ref {
            AudioRef::LocalPath(path) if path.exists() => path.clone(),
            AudioRef::LocalPath(path) => {
                return Err(PipelineError::AudioNotFound(path.clone()));
            }
            remote => {
                let resolver = workers.resolver.as_ref().ok_or_else(|| {
                    PipelineError::config("object store client not available. Check AWS credentials")
                })?;
                let path = resolver.resolve(remote).await?;
                result.downloaded_audio = Some(path.clone());
                path
            }
        };

        // Normalize.
        info!(job_id, stage = "normalize", input = %local_path.display(), "normalizing audio");
        let normalized = self.normalizer.normalize(&local_path).await?;
        let stem = audio_stem(&local_path);

        // Transcribe.
        let transcriber = workers.transcriber.as_ref().ok_or_else(|| {
            PipelineError::Transcribe {
                job_id: job_id.to_string(),
                message: "ASR worker not available".to_string(),
            }
        })?;
        let (samples, pcm, sample_rate) = read_wav_samples(&normalized.path)?;

        info!(job_id, stage = "transcribe", samples = samples.len(), "running ASR");
        let lang_hint = job
            .options
            .language
            .clone()
            .unwrap_or_else(|| "auto".to_string());
        let mut raw = {
            let transcriber = Arc::clone(transcriber);
            let jid = job_id.to_string();
            tokio::task::spawn_blocking(move || transcriber.transcribe(&samples, &lang_hint, &jid))
                .await
                .map_err(|e| PipelineError::Transcribe {
                    job_id: job_id.to_string(),
                    message: format!("worker panicked: {}", e),
                })??
        };
        result.raw_transcript = self.artifacts.write_raw(&stem, &raw)?;
        info!(job_id, stage = "transcribe", path = %result.raw_transcript.display(), "raw transcript written");

        // Align and diarize. Best-effort: failure degrades to one speaker.
        if let Some(diarizer) = &workers.diarizer {
            info!(job_id, stage = "diarize", "running speaker diarization");
            let diarizer = Arc::clone(diarizer);
            let spans =
                tokio::task::spawn_blocking(move || diarizer.diarize(&pcm, sample_rate)).await;
            match spans {
                Ok(Ok(spans)) => {
                    assign_word_speakers(&mut raw.segments, &spans);
                    info!(job_id, stage = "diarize", spans = spans.len(), "speakers assigned");
                }
                Ok(Err(e)) => {
                    warn!(job_id, stage = "diarize", error = %e, "continuing with a single speaker");
                    result.warnings.push(format!("diarization failed: {}", e));
                }
                Err(e) => {
                    warn!(job_id, stage = "diarize", error = %e, "continuing with a single speaker");
                    result.warnings.push(format!("diarization panicked: {}", e));
                }
            }
        } else {
            info!(job_id, stage = "diarize", "no diarizer configured, assuming a single speaker");
        }

        // Merge into turns.
        info!(job_id, stage = "reconstruct", segments = raw.segments.len(), "reconstructing turns");
        let lean = turns::reconstruct(
            &raw.segments,
            std::slice::from_ref(&raw.detected_language),
            &self.config.turn_policy,
        );
        result.lean_transcript = self.artifacts.write_lean(&stem, &lean)?;
        info!(
            job_id,
            stage = "reconstruct",
            turns = lean.turns.len(),
            languages = ?lean.languages_detected,
            "lean transcript written"
        );

        // Translate. Non-fatal: failure continues with the lean transcript.
        let transcript_for_extraction = if job.options.skip_translation {
            info!(job_id, stage = "translate", "skipped by job option");
            lean.clone()
        } else if lean.is_english_only() {
            info!(job_id, stage = "translate", "transcript already English");
            lean.clone()
        } else if let Some(translator) = &workers.translator {
            match translator.translate(&lean).await {
                Ok(translated) => {
                    result.translated_transcript =
                        Some(self.artifacts.write_translated(&stem, &translated)?);
                    info!(job_id, stage = "translate", "translated transcript written");
                    translated
                }
                Err(e) => {
                    warn!(job_id, stage = "translate", error = %e, "continuing untranslated");
                    result.warnings.push(format!("translation failed: {}", e));
                    lean.clone()
                }
            }
        } else {
            info!(job_id, stage = "translate", "translator not configured, skipping");
            lean.clone()
        };

        // Extract. Non-fatal: failure is recorded in the job status.
        if job.options.skip_clinical {
            info!(job_id, stage = "extract", "skipped by job option");
        } else if let Some(extractor) = &workers.extractor {
            match self
                .extract_record(extractor, &transcript_for_extraction, &stem)
                .await
            {
                Ok(path) => {
                    result.clinical_extraction = Some(path);
                    info!(job_id, stage = "extract", "clinical record written");
                }
                Err(e) => {
                    warn!(job_id, stage = "extract", error = %e, "clinical extraction failed");
                    result.warnings.push(format!("clinical extraction failed: {}", e));
                }
            }
        } else {
            info!(job_id, stage = "extract", "extractor not configured, skipping");
        }

        Ok(result)
    }

    async fn extract_record(
        &self,
        extractor: &Arc<ClinicalExtractor>,
        transcript: &LeanTranscript,
        stem: &str,
    ) -> Result<std::path::PathBuf> {
        let (mut record, method) = extractor.extract(transcript).await?;
        record.metadata = Some(RecordMetadata {
            source_file: format!("{}.json", stem),
            model_used: extractor.model_name(),
            extraction_method: method.to_string(),
            pipeline_version: PIPELINE_VERSION.to_string(),
            extracted_at: Utc::now().to_rfc3339(),
        });
        self.artifacts.write_clinical(stem, &record)
    }
}
