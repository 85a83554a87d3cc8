use std::path::PathBuf;

/// Default region when `AWS_DEFAULT_REGION` is unset.
pub const DEFAULT_REGION: &str = "ap-southeast-2";

/// Process-wide pipeline configuration, read once from the environment.
/// CLI flags may override individual fields before workers are built.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Default bucket for bare keys and host-as-filename URIs.
    pub default_bucket: Option<String>,
    /// Configured object-store region; overridden per-object on mismatch.
    pub region: String,
    /// Cache directory for downloaded and converted audio.
    pub cache_dir: PathBuf,
    /// Root of the tiered artifact tree.
    pub output_dir: PathBuf,
    /// HuggingFace credential for the diarizer. Absent: diarization skipped.
    pub hf_token: Option<String>,
    /// SEA-LION credential for the translator. Absent: translator disabled.
    pub sealion_api_key: Option<String>,
    /// Directory holding ggml/onnx model files.
    pub model_dir: PathBuf,
    /// ASR model preset.
    pub whisper_model_size: String,
    /// Extractor model preset.
    pub clinical_model: String,
    /// OpenAI-compatible endpoint serving the extractor model. Absent:
    /// the rule strategy is used.
    pub clinical_endpoint: Option<String>,
    /// Upper bound on distinct speakers for diarization.
    pub max_speakers: usize,
    /// Diarization model files.
    pub segmentation_model: PathBuf,
    pub embedding_model: PathBuf,
    /// Turn reconstruction thresholds.
    pub turn_policy: TurnPolicy,
}

impl PipelineConfig {
    /// Build the configuration from recognized environment variables.
    pub fn from_env() -> Self {
        Self {
            default_bucket: std::env::var("AUDIO_S3_BUCKET").ok(),
            region: std::env::var("AWS_DEFAULT_REGION")
                .unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            cache_dir: PathBuf::from("audio_cache"),
            output_dir: PathBuf::from("outputs"),
            hf_token: std::env::var("HF_TOKEN").ok(),
            sealion_api_key: std::env::var("SEALION_API_KEY").ok(),
            model_dir: PathBuf::from("models"),
            whisper_model_size: std::env::var("WHISPER_MODEL_SIZE")
                .unwrap_or_else(|_| "small".to_string()),
            clinical_model: std::env::var("CLINICAL_MODEL_NAME")
                .unwrap_or_else(|_| "Qwen/Qwen2.5-3B-Instruct".to_string()),
            clinical_endpoint: std::env::var("CLINICAL_MODEL_ENDPOINT").ok(),
            max_speakers: 4,
            segmentation_model: PathBuf::from("models/segmentation-3.0.onnx"),
            embedding_model: PathBuf::from("models/wespeaker_en_voxceleb_CAM++.onnx"),
            turn_policy: TurnPolicy::default(),
        }
    }
}

/// Turn reconstruction thresholds. The defaults are the contract; they are
/// tunable only through this block.
#[derive(Debug, Clone)]
pub struct TurnPolicy {
    /// Segments shorter than this (chars, after trim) are dropped.
    pub min_segment_chars: usize,
    /// Segments longer than this with fewer than `min_distinct_chars`
    /// distinct characters are dropped.
    pub low_diversity_len: usize,
    pub min_distinct_chars: usize,
    /// Drop when a single word exceeds this share of the segment's words.
    pub max_single_word_share: f64,
    /// Internal-repetition thresholds.
    pub max_repeated_word_share: f64,
    pub min_unique_word_share: f64,
    /// Longest phrase checked for consecutive repetition.
    pub max_phrase_len: usize,
    /// Segments below this average log-probability are dropped (strict).
    pub min_avg_logprob: f64,
    /// Turns shorter than this are dropped (strict).
    pub min_turn_secs: f64,
    /// Same-speaker segments further apart than this (strict) start a new
    /// turn.
    pub max_turn_gap_secs: f64,
    /// How many preceding segments a speakerless segment may inherit from.
    pub speaker_lookback: usize,
    /// Fallback speaker id when no vote exists anywhere.
    pub default_speaker: String,
    /// Known nonsense n-grams. Replaceable policy, not contract.
    pub blocklist: Vec<String>,
}

impl Default for TurnPolicy {
    fn default() -> Self {
        Self {
            min_segment_chars: 3,
            low_diversity_len: 10,
            min_distinct_chars: 3,
            max_single_word_share: 0.5,
            max_repeated_word_share: 0.4,
            min_unique_word_share: 0.3,
            max_phrase_len: 5,
            min_avg_logprob: -1.5,
            min_turn_secs: 1.0,
            max_turn_gap_secs: 2.0,
            speaker_lookback: 3,
            default_speaker: "SPEAKER_00".to_string(),
            blocklist: vec![
                "thank you for watching".to_string(),
                "thanks for watching".to_string(),
                "subscribe to my channel".to_string(),
                "please subscribe".to_string(),
                "see you in the next video".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_policy_contract_values() {
        let policy = TurnPolicy::default();
        assert_eq!(policy.min_segment_chars, 3);
        assert_eq!(policy.low_diversity_len, 10);
        assert_eq!(policy.min_distinct_chars, 3);
        assert_eq!(policy.max_single_word_share, 0.5);
        assert_eq!(policy.max_repeated_word_share, 0.4);
        assert_eq!(policy.min_unique_word_share, 0.3);
        assert_eq!(policy.max_phrase_len, 5);
        assert_eq!(policy.min_avg_logprob, -1.5);
        assert_eq!(policy.min_turn_secs, 1.0);
        assert_eq!(policy.max_turn_gap_secs, 2.0);
        assert_eq!(policy.default_speaker, "SPEAKER_00");
    }
}
