use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::AudioRef;

/// Per-job options. Transcription itself is never skippable.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Language hint for the ASR engine ("auto" lets the model decide).
    pub language: Option<String>,
    pub skip_translation: bool,
    pub skip_clinical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

/// A single unit of pipeline work.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub audio_ref: AudioRef,
    pub options: JobOptions,
    pub status: JobStatus,
}

impl Job {
    pub fn new(job_id: impl Into<String>, audio_ref: AudioRef, options: JobOptions) -> Self {
        Self {
            job_id: job_id.into(),
            audio_ref,
            options,
            status: JobStatus::Queued,
        }
    }
}

/// Paths to the artifacts a completed job left on disk. Stages that were
/// skipped or degraded leave their slot empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_audio: Option<PathBuf>,
    pub raw_transcript: PathBuf,
    pub lean_transcript: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_transcript: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_extraction: Option<PathBuf>,
    /// Non-fatal stage failures, recorded for the response.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Done).unwrap(),
            "\"done\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Failed).unwrap(),
            "\"failed\""
        );
    }
}
