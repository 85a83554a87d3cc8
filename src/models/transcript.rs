use serde::{Deserialize, Serialize};

/// A maximal contiguous stretch of speech by one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based position in start-time order.
    pub turn_id: u32,
    pub speaker: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    /// `end_time - start_time`, always >= 1.0 s for emitted turns.
    pub duration: f64,
}

/// The canonical simplified transcript: detected languages plus ordered
/// speaker turns. Hand-off format to translation and extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeanTranscript {
    /// Sorted, de-duplicated language codes.
    pub languages_detected: Vec<String>,
    pub turns: Vec<Turn>,
}

impl LeanTranscript {
    pub fn is_english_only(&self) -> bool {
        self.languages_detected == ["en"]
    }

    /// Flatten turns into `speaker: text` lines for prompting.
    pub fn to_flat_text(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker, t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(id: u32, speaker: &str, text: &str) -> Turn {
        Turn {
            turn_id: id,
            speaker: speaker.to_string(),
            text: text.to_string(),
            start_time: id as f64,
            end_time: id as f64 + 1.5,
            duration: 1.5,
        }
    }

    #[test]
    fn test_english_only() {
        let lean = LeanTranscript {
            languages_detected: vec!["en".to_string()],
            turns: vec![],
        };
        assert!(lean.is_english_only());

        let mixed = LeanTranscript {
            languages_detected: vec!["en".to_string(), "ms".to_string()],
            turns: vec![],
        };
        assert!(!mixed.is_english_only());
    }

    #[test]
    fn test_flat_text() {
        let lean = LeanTranscript {
            languages_detected: vec!["en".to_string()],
            turns: vec![
                turn(1, "SPEAKER_00", "Any allergies?"),
                turn(2, "SPEAKER_01", "I'm allergic to penicillin."),
            ],
        };
        assert_eq!(
            lean.to_flat_text(),
            "SPEAKER_00: Any allergies?\nSPEAKER_01: I'm allergic to penicillin."
        );
    }
}
