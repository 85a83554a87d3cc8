use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pyannote_rs::{EmbeddingExtractor, EmbeddingManager};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{Segment, SpeakerSpan};

/// Adjacent same-speaker spans closer than this are merged.
const MERGE_GAP_SECS: f64 = 1.0;
/// Cosine threshold for matching an embedding to a known speaker.
const SPEAKER_THRESHOLD: f32 = 0.5;

/// Speaker diarization worker backed by a segmentation model and a
/// speaker-embedding model. Best-effort: callers treat any failure as
/// "no speaker labels".
pub struct Diarizer {
    segmentation_model: PathBuf,
    extractor: Mutex<EmbeddingExtractor>,
    max_speakers: usize,
}

impl Diarizer {
    pub fn new(
        segmentation_model: impl Into<PathBuf>,
        embedding_model: impl Into<PathBuf>,
        max_speakers: usize,
    ) -> Result<Self> {
        let segmentation_model = segmentation_model.into();
        let embedding_model = embedding_model.into();
        for model in [&segmentation_model, &embedding_model] {
            if !model.exists() {
                return Err(PipelineError::Diarize(format!(
                    "diarization model not found: {}",
                    model.display()
                )));
            }
        }

        info!(
            segmentation = %segmentation_model.display(),
            embedding = %embedding_model.display(),
            "loading diarization models"
        );
        let extractor = EmbeddingExtractor::new(&embedding_model)
            .map_err(|e| PipelineError::Diarize(format!("failed to load embedding model: {}", e)))?;

        Ok(Self {
            segmentation_model,
            extractor: Mutex::new(extractor),
            max_speakers: max_speakers.max(1),
        })
    }

    /// Partition the audio timeline into speaker-homogeneous spans.
    pub fn diarize(&self, samples: &[i16], sample_rate: u32) -> Result<Vec<SpeakerSpan>> {
        let segments = pyannote_rs::get_segments(samples, sample_rate, &self.segmentation_model)
            .map_err(|e| PipelineError::Diarize(format!("segmentation failed: {}", e)))?;

        let mut manager = EmbeddingManager::new(self.max_speakers);
        let mut spans = Vec::new();

        for segment in segments {
            let segment = match segment {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable diarization segment");
                    continue;
                }
            };
            if segment.samples.is_empty() {
                continue;
            }

            let embedding: Vec<f32> = {
                let mut extractor = self
                    .extractor
                    .lock()
                    .map_err(|_| PipelineError::Diarize("embedding extractor poisoned".into()))?;
                extractor
                    .compute(&segment.samples)
                    .map_err(|e| PipelineError::Diarize(format!("embedding failed: {}", e)))?
                    .collect()
            };

            let speaker_id = manager
                .search_speaker(embedding.clone(), SPEAKER_THRESHOLD)
                .unwrap_or_else(|| manager.get_best_speaker_match(embedding).unwrap_or(0));

            spans.push(SpeakerSpan {
                start: segment.start,
                end: segment.end.max(segment.start),
                speaker: format!("SPEAKER_{:02}", speaker_id),
            });
        }

        let merged = merge_adjacent_spans(spans);
        debug!(spans = merged.len(), "diarization complete");
        Ok(merged)
    }
}

/// Merge adjacent spans from the same speaker when the gap between them is
/// at most `MERGE_GAP_SECS`.
pub fn merge_adjacent_spans(mut spans: Vec<SpeakerSpan>) -> Vec<SpeakerSpan> {
    if spans.len() <= 1 {
        return spans;
    }

    spans.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut merged: Vec<SpeakerSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some(last) = merged.last_mut() {
            if last.speaker == span.speaker && span.start - last.end <= MERGE_GAP_SECS {
                last.end = last.end.max(span.end);
                continue;
            }
        }
        merged.push(span);
    }
    merged
}

/// Give every word a speaker label by maximal temporal overlap with the
/// diarization spans. Ties break toward the earliest span start; words
/// without their own timing fall back to segment timing; words no span
/// covers stay unlabeled.
pub fn assign_word_speakers(segments: &mut [Segment], spans: &[SpeakerSpan]) {
    if spans.is_empty() {
        return;
    }

    let mut ordered: Vec<&SpeakerSpan> = spans.iter().collect();
    ordered.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for segment in segments.iter_mut() {
        let (seg_start, seg_end) = (segment.start, segment.end);
        for word in segment.words.iter_mut() {
            let ws = word.start.unwrap_or(seg_start);
            let we = word.end.unwrap_or(seg_end).max(ws);

            let mut best: Option<(&SpeakerSpan, f64)> = None;
            for span in &ordered {
                let overlap = span.overlap(ws, we);
                if overlap <= 0.0 {
                    continue;
                }
                // Strictly-greater keeps the earliest span on ties.
                match best {
                    Some((_, best_overlap)) if overlap <= best_overlap => {}
                    _ => best = Some((span, overlap)),
                }
            }

            word.speaker = best.map(|(span, _)| span.speaker.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Word;

    fn span(start: f64, end: f64, speaker: &str) -> SpeakerSpan {
        SpeakerSpan {
            start,
            end,
            speaker: speaker.to_string(),
        }
    }

    fn segment_with_words(start: f64, end: f64, words: Vec<Word>) -> Segment {
        Segment {
            start,
            end,
            text: words
                .iter()
                .map(|w| w.text.clone())
                .collect::<Vec<_>>()
                .join(" "),
            words,
            avg_logprob: -0.2,
        }
    }

    #[test]
    fn test_merge_adjacent_same_speaker() {
        let merged = merge_adjacent_spans(vec![
            span(0.0, 2.0, "SPEAKER_00"),
            span(2.5, 4.0, "SPEAKER_00"),
            span(6.0, 8.0, "SPEAKER_00"),
        ]);
        // Gap 0.5 merges, gap 2.0 does not.
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].end, 4.0);
    }

    #[test]
    fn test_merge_keeps_speaker_changes() {
        let merged = merge_adjacent_spans(vec![
            span(0.0, 2.0, "SPEAKER_00"),
            span(2.1, 4.0, "SPEAKER_01"),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_assign_majority_overlap() {
        let spans = vec![span(0.0, 1.0, "SPEAKER_00"), span(1.0, 5.0, "SPEAKER_01")];
        let mut segments = vec![segment_with_words(
            0.0,
            5.0,
            vec![Word::new("hello", Some(0.2), Some(0.8)), Word::new("there", Some(0.9), Some(2.0))],
        )];

        assign_word_speakers(&mut segments, &spans);

        // First word sits inside SPEAKER_00's span; second overlaps
        // SPEAKER_01 for 1.0s vs 0.1s.
        assert_eq!(segments[0].words[0].speaker.as_deref(), Some("SPEAKER_00"));
        assert_eq!(segments[0].words[1].speaker.as_deref(), Some("SPEAKER_01"));
    }

    #[test]
    fn test_assign_tie_breaks_to_earliest_span() {
        let spans = vec![span(0.0, 1.0, "SPEAKER_00"), span(1.0, 2.0, "SPEAKER_01")];
        let mut segments = vec![segment_with_words(
            0.0,
            2.0,
            vec![Word::new("even", Some(0.5), Some(1.5))],
        )];

        assign_word_speakers(&mut segments, &spans);
        assert_eq!(segments[0].words[0].speaker.as_deref(), Some("SPEAKER_00"));
    }

    #[test]
    fn test_assign_no_overlap_leaves_null() {
        let spans = vec![span(10.0, 12.0, "SPEAKER_00")];
        let mut segments = vec![segment_with_words(
            0.0,
            2.0,
            vec![Word::new("far", Some(0.0), Some(1.0))],
        )];

        assign_word_speakers(&mut segments, &spans);
        assert!(segments[0].words[0].speaker.is_none());
    }

    #[test]
    fn test_assign_word_without_timing_uses_segment_timing() {
        let spans = vec![span(0.0, 3.0, "SPEAKER_01")];
        let mut segments = vec![segment_with_words(
            1.0,
            2.0,
            vec![Word::new("untimed", None, None)],
        )];

        assign_word_speakers(&mut segments, &spans);
        assert_eq!(segments[0].words[0].speaker.as_deref(), Some("SPEAKER_01"));
    }
}
