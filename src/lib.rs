pub mod asr;
pub mod audio;
pub mod clinical;
pub mod config;
pub mod diarize;
pub mod error;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod source;
pub mod translate;
pub mod turns;

pub use clinical::{ClinicalExtractor, LlmExtractorConfig, RuleExtractor};
pub use config::{PipelineConfig, TurnPolicy};
pub use error::{PipelineError, ResolveKind, Result};
pub use models::{
    AudioRef, ClinicalRecord, Job, JobOptions, JobResult, JobStatus, LeanTranscript, Segment,
    SpeakerSpan, Turn, Word,
};
pub use pipeline::{PipelineExecutor, WorkerSet};
pub use translate::{Translator, TranslatorConfig};
pub use turns::reconstruct;
