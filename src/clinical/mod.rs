pub mod llm;
pub mod rules;

pub use llm::{LlmExtractor, LlmExtractorConfig, build_extraction_prompt, parse_record_json};
pub use rules::{RULE_SUMMARY_SENTINEL, RuleExtractor, dedupe_substrings};

use tracing::warn;

use crate::error::Result;
use crate::models::{ClinicalRecord, LeanTranscript};

/// Converts a conversational transcript into a structured clinical
/// record. The strategy is chosen at init: a generative model when an
/// endpoint is configured, with the rule extractor as the always-present
/// fallback.
pub struct ClinicalExtractor {
    llm: Option<LlmExtractor>,
    rules: RuleExtractor,
}

impl ClinicalExtractor {
    pub fn new(llm_config: Option<LlmExtractorConfig>) -> Result<Self> {
        let llm = match llm_config {
            Some(config) => Some(LlmExtractor::new(config)?),
            None => None,
        };
        Ok(Self {
            llm,
            rules: RuleExtractor::new(),
        })
    }

    /// Name of the model behind the active strategy, for metadata.
    pub fn model_name(&self) -> String {
        self.llm
            .as_ref()
            .map(|l| l.model().to_string())
            .unwrap_or_else(|| "rules".to_string())
    }

    /// Extract a record. Returns the record and the method actually used.
    pub async fn extract(&self, transcript: &LeanTranscript) -> Result<(ClinicalRecord, &'static str)> {
        let text = transcript.to_flat_text();
        if text.trim().is_empty() {
            let mut record = ClinicalRecord::default();
            record.summary = Some(RULE_SUMMARY_SENTINEL.to_string());
            return Ok((record, "rules"));
        }

        if let Some(llm) = &self.llm {
            match llm.extract(&text).await {
                Ok(record) => return Ok((record, "llm")),
                Err(e) => {
                    warn!(error = %e, "generative extraction failed, using rule strategy");
                }
            }
        }

        Ok((self.rules.extract(&text), "rules"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Turn;

    #[tokio::test]
    async fn test_rule_strategy_when_no_endpoint() {
        let extractor = ClinicalExtractor::new(None).unwrap();
        let transcript = LeanTranscript {
            languages_detected: vec!["en".to_string()],
            turns: vec![Turn {
                turn_id: 1,
                speaker: "SPEAKER_01".to_string(),
                text: "I have a headache and I'm allergic to aspirin.".to_string(),
                start_time: 0.0,
                end_time: 3.0,
                duration: 3.0,
            }],
        };

        let (record, method) = extractor.extract(&transcript).await.unwrap();
        assert_eq!(method, "rules");
        assert!(record.symptoms_present.iter().any(|s| s == "headache"));
        assert!(record.allergy_substance.iter().any(|a| a == "aspirin"));
        assert_eq!(record.summary.as_deref(), Some(RULE_SUMMARY_SENTINEL));
    }

    #[tokio::test]
    async fn test_empty_transcript_yields_sentinel_record() {
        let extractor = ClinicalExtractor::new(None).unwrap();
        let transcript = LeanTranscript {
            languages_detected: vec!["en".to_string()],
            turns: vec![],
        };

        let (record, _) = extractor.extract(&transcript).await.unwrap();
        assert_eq!(record.summary.as_deref(), Some(RULE_SUMMARY_SENTINEL));
        assert!(record.symptoms_present.is_empty());
    }
}
