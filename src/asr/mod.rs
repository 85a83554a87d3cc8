use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::{PipelineError, Result};
use crate::models::{RawTranscription, Segment, Word};

/// ASR model presets, selected by `WHISPER_MODEL_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperPreset {
    Tiny,
    Base,
    Small,
    Medium,
    LargeV3,
}

impl WhisperPreset {
    pub fn from_name(name: &str) -> Self {
        match name {
            "tiny" => Self::Tiny,
            "base" => Self::Base,
            "medium" => Self::Medium,
            "large-v1" | "large-v2" | "large-v3" | "large" => Self::LargeV3,
            _ => Self::Small,
        }
    }

    pub fn filename(&self) -> &'static str {
        match self {
            Self::Tiny => "ggml-tiny.bin",
            Self::Base => "ggml-base.bin",
            Self::Small => "ggml-small.bin",
            Self::Medium => "ggml-medium.bin",
            Self::LargeV3 => "ggml-large-v3.bin",
        }
    }
}

/// Wraps the ASR model. Input: 16 kHz mono f32 buffer plus a language
/// hint; output: time-stamped segments with word timings and the detected
/// language.
pub struct Transcriber {
    ctx: WhisperContext,
    n_threads: i32,
}

impl Transcriber {
    /// Load the model for a preset from `model_dir`. Load failure is fatal
    /// at worker init.
    pub fn new(model_dir: &Path, preset: WhisperPreset) -> Result<Self> {
        let model_path: PathBuf = model_dir.join(preset.filename());
        if !model_path.exists() {
            return Err(PipelineError::Environment(format!(
                "whisper model not found: {}",
                model_path.display()
            )));
        }

        info!(model = %model_path.display(), "loading whisper model");
        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| PipelineError::Environment("invalid model path".to_string()))?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| PipelineError::Environment(format!("failed to load whisper model: {}", e)))?;
        info!("whisper model loaded");

        let n_threads = std::thread::available_parallelism()
            .map(|n| n.get().min(8) as i32)
            .unwrap_or(4);

        Ok(Self { ctx, n_threads })
    }

    /// Transcribe a normalized audio buffer. On `auto` the engine uses
    /// whatever language the model reports.
    pub fn transcribe(
        &self,
        samples: &[f32],
        lang_hint: &str,
        job_id: &str,
    ) -> Result<RawTranscription> {
        let fail = |message: String| PipelineError::Transcribe {
            job_id: job_id.to_string(),
            message,
        };

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.n_threads);
        params.set_translate(false);
        params.set_token_timestamps(true);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        if lang_hint != "auto" {
            params.set_language(Some(lang_hint));
        } else {
            params.set_language(Some("auto"));
        }

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| fail(format!("failed to create decode state: {}", e)))?;
        state
            .full(params, samples)
            .map_err(|e| fail(format!("inference failed: {}", e)))?;

        let detected_language = if lang_hint != "auto" {
            lang_hint.to_string()
        } else {
            state
                .full_lang_id()
                .ok()
                .and_then(whisper_rs::get_lang_str)
                .unwrap_or("en")
                .to_string()
        };

        let n_segments = state
            .full_n_segments()
            .map_err(|e| fail(format!("failed to read segment count: {}", e)))?;

        let mut segments = Vec::with_capacity(n_segments as usize);
        for i in 0..n_segments {
            let text = state
                .full_get_segment_text(i)
                .map_err(|e| fail(format!("failed to read segment {}: {}", i, e)))?
                .trim()
                .to_string();
            let start = state.full_get_segment_t0(i).unwrap_or(0) as f64 / 100.0;
            let end = state.full_get_segment_t1(i).unwrap_or(0) as f64 / 100.0;

            let (words, avg_logprob) = self.collect_words(&state, i);

            segments.push(Segment {
                start,
                end: end.max(start),
                text,
                words,
                avg_logprob,
            });
        }

        segments.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

        debug!(
            job_id,
            segments = segments.len(),
            language = %detected_language,
            "transcription complete"
        );

        Ok(RawTranscription {
            segments,
            detected_language,
        })
    }

    /// Assemble words from token timestamps. A token whose text begins
    /// with a space starts a new word (whisper tokenizer convention).
    /// Returns the words and the segment's mean token log-probability.
    fn collect_words(&self, state: &whisper_rs::WhisperState, segment: i32) -> (Vec<Word>, f64) {
        let n_tokens = match state.full_n_tokens(segment) {
            Ok(n) => n,
            Err(e) => {
                warn!(segment, error = %e, "could not read tokens, keeping segment timing only");
                return (Vec::new(), 0.0);
            }
        };

        let mut words: Vec<Word> = Vec::new();
        let mut logprob_sum = 0.0;
        let mut logprob_count = 0usize;

        for j in 0..n_tokens {
            let text = match state.full_get_token_text(segment, j) {
                Ok(t) => t,
                Err(_) => continue,
            };
            // Skip special markers like [_BEG_] and <|endoftext|>.
            if text.starts_with("[_") || text.starts_with("<|") {
                continue;
            }

            let data = match state.full_get_token_data(segment, j) {
                Ok(d) => d,
                Err(_) => continue,
            };
            logprob_sum += data.plog as f64;
            logprob_count += 1;

            let t0 = (data.t0 as f64 / 100.0).max(0.0);
            let t1 = (data.t1 as f64 / 100.0).max(t0);

            let starts_word = text.starts_with(' ') || words.is_empty();
            if starts_word {
                words.push(Word::new(text.trim().to_string(), Some(t0), Some(t1)));
            } else if let Some(last) = words.last_mut() {
                last.text.push_str(text.trim_end());
                last.end = Some(t1);
            }
        }

        words.retain(|w| !w.text.is_empty());

        let avg = if logprob_count > 0 {
            logprob_sum / logprob_count as f64
        } else {
            0.0
        };
        (words, avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_from_name() {
        assert_eq!(WhisperPreset::from_name("tiny"), WhisperPreset::Tiny);
        assert_eq!(WhisperPreset::from_name("large-v2"), WhisperPreset::LargeV3);
        // Unknown names fall back to the small preset.
        assert_eq!(WhisperPreset::from_name("huge"), WhisperPreset::Small);
    }

    #[test]
    fn test_preset_filename() {
        assert_eq!(WhisperPreset::Small.filename(), "ggml-small.bin");
        assert_eq!(WhisperPreset::LargeV3.filename(), "ggml-large-v3.bin");
    }

    #[test]
    fn test_missing_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Transcriber::new(dir.path(), WhisperPreset::Tiny).unwrap_err();
        assert!(err.to_string().contains("whisper model not found"));
    }
}
