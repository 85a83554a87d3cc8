use std::path::PathBuf;

/// Why an object-store lookup failed. Each kind is fatal to the job and is
/// never retried by the resolver itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    NotFound,
    AccessDenied,
    NoSuchBucket,
    Other,
}

impl std::fmt::Display for ResolveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolveKind::NotFound => "object not found",
            ResolveKind::AccessDenied => "access denied",
            ResolveKind::NoSuchBucket => "no such bucket",
            ResolveKind::Other => "object store error",
        };
        f.write_str(s)
    }
}

/// Error taxonomy for the pipeline. The executor decides fatal vs degraded
/// per stage; the server formats the outcome into the response shape.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Missing bucket, missing credential, unsupported option.
    #[error("configuration error: {0}")]
    Config(String),

    /// Object not found / access denied / no such bucket / other.
    #[error("failed to resolve {uri}: {kind}")]
    Resolve { uri: String, kind: ResolveKind },

    /// Required host tooling (ffmpeg/ffprobe) is missing.
    #[error("environment error: {0}")]
    Environment(String),

    /// ASR inference failure, tagged with the job it belongs to.
    #[error("transcription failed for job {job_id}: {message}")]
    Transcribe { job_id: String, message: String },

    /// Diarization failure. Degraded-continue: the caller falls back to a
    /// single-speaker assumption.
    #[error("diarization failed: {0}")]
    Diarize(String),

    #[error("translation failed: {0}")]
    Translate(String),

    #[error("clinical extraction failed: {0}")]
    Extract(String),

    /// Malformed request line on the control channel. Responded to in
    /// place; the server does not terminate.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("audio file not found: {0}")]
    AudioNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Config(msg.into())
    }

    pub fn resolve(uri: impl Into<String>, kind: ResolveKind) -> Self {
        PipelineError::Resolve {
            uri: uri.into(),
            kind,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
