use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::models::ClinicalRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const MAX_PARSE_ATTEMPTS: usize = 3;

/// Configuration for the generative extraction endpoint.
#[derive(Debug, Clone)]
pub struct LlmExtractorConfig {
    /// OpenAI-compatible base URL serving the clinical model.
    pub endpoint: String,
    /// Model preset, from `CLINICAL_MODEL_NAME`.
    pub model: String,
    pub api_key: Option<String>,
}

/// Generative extraction strategy. Issues a schema-first prompt with
/// greedy decoding and retries the JSON parse before giving up.
pub struct LlmExtractor {
    client: Client,
    config: LlmExtractorConfig,
}

impl LlmExtractor {
    pub fn new(config: LlmExtractorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Extract(format!("failed to build client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Extract a clinical record from the flattened transcript text.
    /// Errors once the retry attempts are exhausted; the caller falls
    /// through to the rule strategy.
    pub async fn extract(&self, transcript_text: &str) -> Result<ClinicalRecord> {
        let prompt = build_extraction_prompt(transcript_text);

        let mut last_error = None;
        for attempt in 1..=MAX_PARSE_ATTEMPTS {
            match self.generate(&prompt).await {
                Ok(response) => match parse_record_json(&response) {
                    Some(mut record) => {
                        record.normalize();
                        debug!(attempt, "generative extraction parsed");
                        return Ok(record);
                    }
                    None => {
                        warn!(attempt, "no parseable JSON in model response");
                        last_error =
                            Some(PipelineError::Extract("no JSON object in response".into()));
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "generation request failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PipelineError::Extract("extraction attempts exhausted".into())))
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerationRequest {
            model: self.config.model.clone(),
            messages: vec![GenerationMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            // Greedy decoding: no sampling.
            temperature: 0.0,
            max_tokens: 800,
            repetition_penalty: 1.1,
            no_repeat_ngram_size: 3,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.config.endpoint));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Extract(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Extract(format!(
                "extraction service error: {} - {}",
                status, body
            )));
        }

        let response: GenerationResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Extract(format!("malformed response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Extract("no choices in response".to_string()))
    }
}

/// Deterministic extraction prompt: flattened conversation, declared
/// schema, no speculation.
pub fn build_extraction_prompt(transcript_text: &str) -> String {
    format!(
        r#"You are a clinical information extraction assistant. Your task is to extract medical information from consultation transcripts.

From this transcript, extract only explicit facts into valid JSON with this schema:

{{
  "summary": string,
  "chief_complaint": string or null,
  "symptoms_present": [strings],
  "symptoms_negated": [strings],
  "onset_or_duration": string or null,
  "allergy_substance": [strings],
  "meds_current": [strings],
  "conditions_past": [strings],
  "primary_diagnosis": string or null,
  "rx_drug": string or null,
  "rx_dose": string or null,
  "follow_up": string or null,
  "red_flags": [strings]
}}

Rules:
- Only extract what is explicitly stated; do not guess.
- Keep drug/disease names lowercase.
- Deduplicate list entries.
- Put negated symptoms into `symptoms_negated`.
- `rx_drug` = drug name prescribed, `rx_dose` = dose/frequency/duration details.
- If nothing is mentioned, return null or [].

Now process this consultation transcript:

{}

JSON:"#,
        transcript_text
    )
}

/// Pull a `ClinicalRecord` out of a model response: a raw JSON object or
/// one wrapped in markdown fences.
pub fn parse_record_json(response: &str) -> Option<ClinicalRecord> {
    let fenced = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static fence pattern");
    if let Some(caps) = fenced.captures(response) {
        if let Ok(record) = serde_json::from_str(caps.get(1)?.as_str()) {
            return Some(record);
        }
    }

    // Balanced-brace scan over the raw text.
    let bytes = response.as_bytes();
    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        match b {
            b'"' if !escaped => in_string = !in_string,
            b'\\' if in_string => {
                escaped = !escaped;
                continue;
            }
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &response[start..start + offset + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
        escaped = false;
    }
    None
}

#[derive(Debug, Serialize)]
struct GenerationRequest {
    model: String,
    messages: Vec<GenerationMessage>,
    temperature: f64,
    max_tokens: u32,
    repetition_penalty: f64,
    no_repeat_ngram_size: u32,
}

#[derive(Debug, Serialize)]
struct GenerationMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    choices: Vec<GenerationChoice>,
}

#[derive(Debug, Deserialize)]
struct GenerationChoice {
    message: GenerationResponseMessage,
}

#[derive(Debug, Deserialize)]
struct GenerationResponseMessage {
    content: String,
}
