use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::LeanTranscript;

/// Minimum delay between per-turn requests, sized for a 10-requests-per-
/// minute quota with a little headroom.
const RATE_LIMIT_DELAY: Duration = Duration::from_millis(6_500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the SEA-LION translation client.
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl TranslatorConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.sea-lion.ai/v1".to_string(),
            model: "aisingapore/Gemma-SEA-LION-v4-27B-IT".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
        }
    }
}

/// Translates non-English transcripts to English in bulk, falling back to
/// per-turn requests when the bulk response cannot be re-parsed.
pub struct Translator {
    client: Client,
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Translate(format!("failed to build client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Translate a lean transcript to English. Turn ids, speakers, and
    /// timing are preserved; `languages_detected` becomes `["en"]`.
    pub async fn translate(&self, lean: &LeanTranscript) -> Result<LeanTranscript> {
        if lean.is_english_only() {
            info!("transcript already English, skipping translation");
            return Ok(lean.clone());
        }

        let mut translated = lean.clone();
        let pending: Vec<usize> = translated
            .turns
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.text.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        if !pending.is_empty() {
            match self.translate_bulk(&translated, &pending).await {
                Ok(by_turn) => {
                    for &i in &pending {
                        let id = translated.turns[i].turn_id;
                        if let Some(text) = by_turn.get(&id) {
                            translated.turns[i].text = text.clone();
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "bulk translation failed, falling back to per-turn");
                    self.translate_per_turn(&mut translated, &pending).await;
                }
            }
        }

        translated.languages_detected = vec!["en".to_string()];
        Ok(translated)
    }

    /// One round-trip for the whole transcript, re-parsed by turn marker.
    async fn translate_bulk(
        &self,
        lean: &LeanTranscript,
        pending: &[usize],
    ) -> Result<HashMap<u32, String>> {
        let batch = serialize_bulk(lean, pending);
        let prompt = format!(
            "Translate the following medical consultation turns to English. \
             Keep every [TURN_n] marker exactly as given, each on its own line \
             before its translation. Do not add, remove, or reorder turns. \
             If a turn is already in English, return it unchanged.\n\n{}",
            batch
        );

        let response = self.complete(&prompt).await?;
        let expected: Vec<u32> = pending.iter().map(|&i| lean.turns[i].turn_id).collect();

        parse_bulk_response(&response, &expected).ok_or_else(|| {
            PipelineError::Translate(format!(
                "bulk response yielded fewer than {} turns",
                expected.len()
            ))
        })
    }

    /// One request per turn, spaced by the rate-limit delay. Failures keep
    /// the original text in place.
    async fn translate_per_turn(&self, lean: &mut LeanTranscript, pending: &[usize]) {
        for (n, &i) in pending.iter().enumerate() {
            if n > 0 {
                tokio::time::sleep(RATE_LIMIT_DELAY).await;
            }

            let original = lean.turns[i].text.clone();
            let prompt = format!(
                "Translate the following text to English. If it is already \
                 in English, return it unchanged. Reply with the translation \
                 only:\n\n{}",
                original
            );

            match self.complete(&prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    lean.turns[i].text = text.trim().to_string();
                }
                Ok(_) => warn!(turn_id = lean.turns[i].turn_id, "empty translation, keeping original"),
                Err(e) => {
                    warn!(
                        turn_id = lean.turns[i].turn_id,
                        error = %e,
                        "per-turn translation failed, keeping original"
                    );
                }
            }
        }
    }

    /// One trivial round-trip to amortize first-call latency.
    pub async fn warm_up(&self) -> Result<()> {
        self.complete("Reply with the single word ready.").await.map(|_| ())
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Translate(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Translate(format!(
                "translation service error: {} - {}",
                status, body
            )));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Translate(format!("malformed response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Translate("no choices in response".to_string()))
    }
}

/// Render the non-empty turns as `[TURN_n]`-marked lines.
pub fn serialize_bulk(lean: &LeanTranscript, pending: &[usize]) -> String {
    pending
        .iter()
        .map(|&i| {
            let turn = &lean.turns[i];
            format!("[TURN_{}] {}", turn.turn_id, turn.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Re-parse a bulk response into turn-id-indexed texts. Returns `None`
/// when any expected marker is missing, which sends the caller down the
/// per-turn path.
pub fn parse_bulk_response(response: &str, expected: &[u32]) -> Option<HashMap<u32, String>> {
    let marker = Regex::new(r"\[TURN_(\d+)\]").expect("static marker pattern");

    let mut result: HashMap<u32, String> = HashMap::new();
    let matches: Vec<_> = marker.captures_iter(response).collect();
    for (idx, caps) in matches.iter().enumerate() {
        let id: u32 = caps.get(1)?.as_str().parse().ok()?;
        let start = caps.get(0)?.end();
        let end = matches
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(response.len());
        let text = response[start..end].trim().to_string();
        if !text.is_empty() {
            result.insert(id, text);
        }
    }

    if expected.iter().all(|id| result.contains_key(id)) {
        Some(result)
    } else {
        None
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Turn;

    fn lean(langs: &[&str], texts: &[(&str, &str)]) -> LeanTranscript {
        LeanTranscript {
            languages_detected: langs.iter().map(|s| s.to_string()).collect(),
            turns: texts
                .iter()
                .enumerate()
                .map(|(i, (speaker, text))| Turn {
                    turn_id: i as u32 + 1,
                    speaker: speaker.to_string(),
                    text: text.to_string(),
                    start_time: i as f64 * 3.0,
                    end_time: i as f64 * 3.0 + 2.0,
                    duration: 2.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_serialize_bulk_markers() {
        let lean = lean(
            &["ms"],
            &[("SPEAKER_00", "Apa khabar?"), ("SPEAKER_01", "Khabar baik.")],
        );
        let batch = serialize_bulk(&lean, &[0, 1]);
        assert_eq!(batch, "[TURN_1] Apa khabar?\n[TURN_2] Khabar baik.");
    }

    #[test]
    fn test_parse_bulk_response_roundtrip() {
        let response = "[TURN_1] How are you?\n[TURN_2] I am well.";
        let parsed = parse_bulk_response(response, &[1, 2]).unwrap();
        assert_eq!(parsed[&1], "How are you?");
        assert_eq!(parsed[&2], "I am well.");
    }

    #[test]
    fn test_parse_bulk_response_multiline_turn() {
        let response = "[TURN_1] First line\ncontinues here.\n[TURN_2] Second.";
        let parsed = parse_bulk_response(response, &[1, 2]).unwrap();
        assert_eq!(parsed[&1], "First line\ncontinues here.");
    }

    #[test]
    fn test_parse_bulk_response_missing_turn_rejected() {
        let response = "[TURN_1] Only the first came back.";
        assert!(parse_bulk_response(response, &[1, 2]).is_none());
    }

    #[test]
    fn test_parse_bulk_response_garbage_rejected() {
        assert!(parse_bulk_response("Sorry, I cannot help with that.", &[1]).is_none());
    }
}
