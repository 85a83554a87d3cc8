use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::models::JobResult;

use super::registry::ModelsLoaded;

/// A parsed request line from the control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Health,
    Run(RunRequest),
    Unknown(String),
}

/// Payload of a `run` command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub audio_path: Option<String>,
    #[serde(default)]
    pub audio_s3_path: Option<String>,
    #[serde(default)]
    pub skip_translation: bool,
    /// Server jobs skip clinical extraction unless asked for it.
    #[serde(default = "default_true")]
    pub skip_clinical: bool,
}

fn default_true() -> bool {
    true
}

impl RunRequest {
    /// Whichever of the two audio fields was supplied.
    pub fn audio_input(&self) -> Option<&str> {
        self.audio_path
            .as_deref()
            .or(self.audio_s3_path.as_deref())
    }
}

/// Parse one request line. A malformed line is a `ProtocolError`; an
/// unrecognized command parses successfully so the caller can answer it in
/// place.
pub fn parse_request(line: &str) -> Result<Request> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| PipelineError::Protocol(format!("malformed request: {}", e)))?;

    let cmd = value
        .get("cmd")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::Protocol("missing cmd field".to_string()))?;

    match cmd {
        "health" => Ok(Request::Health),
        "run" => {
            let run: RunRequest = serde_json::from_value(value.clone())
                .map_err(|e| PipelineError::Protocol(format!("malformed run request: {}", e)))?;
            Ok(Request::Run(run))
        }
        other => Ok(Request::Unknown(other.to_string())),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub models_loaded: ModelsLoaded,
    pub models_initialization_done: bool,
    pub model_errors: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RunResponse {
    Done {
        job_id: String,
        status: &'static str,
        result: JobResult,
    },
    Failed {
        job_id: String,
        status: &'static str,
        error: String,
        trace: String,
    },
}

impl RunResponse {
    pub fn done(job_id: String, result: JobResult) -> Self {
        Self::Done {
            job_id,
            status: "done",
            result,
        }
    }

    pub fn failed(job_id: String, error: &PipelineError) -> Self {
        Self::Failed {
            job_id,
            status: "failed",
            error: error.to_string(),
            trace: format!("{:?}", error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: "error",
            error: error.into(),
        }
    }

    pub fn unknown_command(cmd: &str) -> Self {
        Self::new(format!("Unknown command: {}", cmd))
    }
}
