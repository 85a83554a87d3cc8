use serde_json::Value;

use crate::models::{LeanTranscript, Turn};

/// Convert an arbitrary transcript-shaped JSON document into a
/// `LeanTranscript`.
///
/// Recognizers are tried in priority order; the first match wins. The set
/// is a closed enumeration:
/// 1. `turns` array of `{speaker, text, ...}` objects
/// 2. `segments` array (timing-bearing or plain text)
/// 3. one of the string fields `text`, `translated_text`, `transcript`,
///    `content`
/// 4. a bare string document
pub fn adapt_transcript(value: &Value) -> Option<LeanTranscript> {
    recognize_turns(value)
        .or_else(|| recognize_segments(value))
        .or_else(|| recognize_text_field(value))
        .or_else(|| recognize_bare_string(value))
}

fn languages_of(value: &Value) -> Vec<String> {
    let mut langs: Vec<String> = value
        .get("languages_detected")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if langs.is_empty() {
        langs.push("en".to_string());
    }
    langs.sort();
    langs.dedup();
    langs
}

fn recognize_turns(value: &Value) -> Option<LeanTranscript> {
    let turns_json = value.get("turns")?.as_array()?;

    let mut turns = Vec::new();
    for (i, turn) in turns_json.iter().enumerate() {
        let text = turn.get("text")?.as_str()?.trim().to_string();
        if text.is_empty() {
            continue;
        }
        let speaker = turn
            .get("speaker")
            .and_then(Value::as_str)
            .unwrap_or("SPEAKER_00")
            .to_string();
        let start = turn.get("start_time").and_then(Value::as_f64).unwrap_or(0.0);
        let end = turn.get("end_time").and_then(Value::as_f64).unwrap_or(start);
        turns.push(Turn {
            turn_id: turn
                .get("turn_id")
                .and_then(Value::as_u64)
                .map(|id| id as u32)
                .unwrap_or(i as u32 + 1),
            speaker,
            text,
            start_time: start,
            end_time: end,
            duration: (end - start).max(0.0),
        });
    }

    Some(LeanTranscript {
        languages_detected: languages_of(value),
        turns,
    })
}

fn recognize_segments(value: &Value) -> Option<LeanTranscript> {
    let segments = value.get("segments")?.as_array()?;

    let mut turns = Vec::new();
    for (i, seg) in segments.iter().enumerate() {
        let text = seg.get("text")?.as_str()?.trim().to_string();
        if text.is_empty() {
            continue;
        }
        let speaker = seg
            .get("speaker")
            .and_then(Value::as_str)
            .unwrap_or("SPEAKER_00")
            .to_string();
        let start = seg.get("start").and_then(Value::as_f64).unwrap_or(0.0);
        let end = seg.get("end").and_then(Value::as_f64).unwrap_or(start);
        turns.push(Turn {
            turn_id: i as u32 + 1,
            speaker,
            text,
            start_time: start,
            end_time: end,
            duration: (end - start).max(0.0),
        });
    }

    Some(LeanTranscript {
        languages_detected: languages_of(value),
        turns,
    })
}

fn recognize_text_field(value: &Value) -> Option<LeanTranscript> {
    const FIELDS: [&str; 4] = ["text", "translated_text", "transcript", "content"];

    let text = FIELDS
        .iter()
        .find_map(|f| value.get(f).and_then(Value::as_str))?
        .trim();
    if text.is_empty() {
        return None;
    }

    Some(single_turn_transcript(text, languages_of(value)))
}

fn recognize_bare_string(value: &Value) -> Option<LeanTranscript> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    Some(single_turn_transcript(text, vec!["en".to_string()]))
}

fn single_turn_transcript(text: &str, languages: Vec<String>) -> LeanTranscript {
    LeanTranscript {
        languages_detected: languages,
        turns: vec![Turn {
            turn_id: 1,
            speaker: "SPEAKER_00".to_string(),
            text: text.to_string(),
            start_time: 0.0,
            end_time: 0.0,
            duration: 0.0,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turns_shape_wins() {
        let value = json!({
            "languages_detected": ["ms"],
            "turns": [
                {"turn_id": 1, "speaker": "SPEAKER_00", "text": "Apa khabar?",
                 "start_time": 0.0, "end_time": 1.5},
                {"turn_id": 2, "speaker": "SPEAKER_01", "text": "Khabar baik.",
                 "start_time": 2.0, "end_time": 3.5}
            ],
            "text": "should not be used"
        });

        let lean = adapt_transcript(&value).unwrap();
        assert_eq!(lean.languages_detected, vec!["ms"]);
        assert_eq!(lean.turns.len(), 2);
        assert_eq!(lean.turns[1].speaker, "SPEAKER_01");
    }

    #[test]
    fn test_segments_shape() {
        let value = json!({
            "segments": [
                {"start": 0.0, "end": 2.0, "text": "Hello there."},
                {"start": 2.5, "end": 4.0, "text": "Hi."}
            ]
        });

        let lean = adapt_transcript(&value).unwrap();
        assert_eq!(lean.turns.len(), 2);
        assert_eq!(lean.turns[0].turn_id, 1);
        assert_eq!(lean.turns[0].speaker, "SPEAKER_00");
    }

    #[test]
    fn test_string_fields_in_priority_order() {
        let value = json!({"translated_text": "The patient reports chest pain."});
        let lean = adapt_transcript(&value).unwrap();
        assert_eq!(lean.turns.len(), 1);
        assert_eq!(lean.turns[0].text, "The patient reports chest pain.");
    }

    #[test]
    fn test_bare_string() {
        let value = json!("I've had a cough for a week.");
        let lean = adapt_transcript(&value).unwrap();
        assert_eq!(lean.turns[0].text, "I've had a cough for a week.");
    }

    #[test]
    fn test_unrecognized_shape() {
        let value = json!({"unrelated": 42});
        assert!(adapt_transcript(&value).is_none());
    }
}
