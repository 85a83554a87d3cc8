use serde::{Deserialize, Serialize};

/// A single recognized word with optional timing and speaker label.
///
/// Timing fields may be absent when the ASR engine could not place the
/// word; downstream falls back to segment timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl Word {
    pub fn new(text: impl Into<String>, start: Option<f64>, end: Option<f64>) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            speaker: None,
        }
    }
}

/// A time-stamped stretch of recognized speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds. `start <= end`.
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub words: Vec<Word>,
    /// Mean log-probability over the segment's tokens.
    pub avg_logprob: f64,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// A speaker-homogeneous span from the diarizer. Spans may overlap; the
/// engine resolves overlaps by majority assignment at word level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerSpan {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

impl SpeakerSpan {
    /// Temporal overlap with `[start, end]`, clamped at zero.
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        (end.min(self.end) - start.max(self.start)).max(0.0)
    }
}

/// Raw output of the transcription stage, persisted as the first artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTranscription {
    pub segments: Vec<Segment>,
    pub detected_language: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_overlap() {
        let span = SpeakerSpan {
            start: 1.0,
            end: 3.0,
            speaker: "SPEAKER_00".to_string(),
        };
        assert_eq!(span.overlap(2.0, 4.0), 1.0);
        assert_eq!(span.overlap(0.0, 1.0), 0.0);
        assert_eq!(span.overlap(3.5, 5.0), 0.0);
        assert_eq!(span.overlap(0.0, 10.0), 2.0);
    }
}
