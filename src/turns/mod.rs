pub mod filters;

pub use filters::{RejectReason, classify_segment};

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::TurnPolicy;
use crate::models::{LeanTranscript, Segment, Turn};

/// Collapse an enriched segment stream into clean speaker turns.
///
/// Four passes: hallucination filtering, speaker smoothing, turn assembly,
/// and minimum-duration enforcement with 1-based renumbering. Deterministic
/// for a given input and policy.
pub fn reconstruct(
    segments: &[Segment],
    languages: &[String],
    policy: &TurnPolicy,
) -> LeanTranscript {
    // Pass 1: hallucination filtering.
    let mut kept: Vec<&Segment> = Vec::with_capacity(segments.len());
    let mut kept_texts: HashSet<String> = HashSet::new();
    let mut dropped = 0usize;
    for segment in segments {
        match classify_segment(segment, &kept_texts, policy) {
            Ok(()) => {
                kept_texts.insert(segment.text.trim().to_string());
                kept.push(segment);
            }
            Err(_) => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!(dropped, kept = kept.len(), "hallucination filter applied");
    }

    // Pass 2: speaker smoothing.
    let speakers = smooth_speakers(&kept, policy);

    // Pass 3: turn assembly.
    let mut turns: Vec<Turn> = Vec::new();
    for (segment, speaker) in kept.iter().zip(speakers.iter()) {
        let text = segment.text.trim();

        let start_new = match turns.last() {
            None => true,
            Some(current) => {
                current.speaker != *speaker
                    || segment.start - current.end_time > policy.max_turn_gap_secs
            }
        };

        if start_new {
            turns.push(Turn {
                turn_id: 0,
                speaker: speaker.clone(),
                text: text.to_string(),
                start_time: segment.start,
                end_time: segment.end,
                duration: 0.0,
            });
        } else if let Some(current) = turns.last_mut() {
            if !text.is_empty() {
                if !current.text.is_empty() {
                    current.text.push(' ');
                }
                current.text.push_str(text);
            }
            current.end_time = current.end_time.max(segment.end);
        }
    }

    // Pass 4: minimum duration and numbering.
    turns.retain(|t| t.end_time - t.start_time >= policy.min_turn_secs);
    for (i, turn) in turns.iter_mut().enumerate() {
        turn.turn_id = i as u32 + 1;
        turn.duration = turn.end_time - turn.start_time;
    }

    let mut languages_detected: Vec<String> = languages.to_vec();
    languages_detected.sort();
    languages_detected.dedup();
    if languages_detected.is_empty() {
        languages_detected.push("en".to_string());
    }

    LeanTranscript {
        languages_detected,
        turns,
    }
}

/// Derive one speaker per segment: majority vote over word labels, with
/// voteless segments inheriting from the nearest preceding voted segment
/// (bounded lookback), and the default id as the last resort.
fn smooth_speakers(segments: &[&Segment], policy: &TurnPolicy) -> Vec<String> {
    let votes: Vec<Option<String>> = segments.iter().map(|s| majority_speaker(s)).collect();

    votes
        .iter()
        .enumerate()
        .map(|(i, vote)| {
            if let Some(speaker) = vote {
                return speaker.clone();
            }
            votes[..i]
                .iter()
                .rev()
                .take(policy.speaker_lookback)
                .find_map(|v| v.clone())
                .unwrap_or_else(|| policy.default_speaker.clone())
        })
        .collect()
}

/// The speaker named by the most words in the segment. Ties resolve to the
/// label seen first in word order.
fn majority_speaker(segment: &Segment) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for word in &segment.words {
        if let Some(speaker) = word.speaker.as_deref() {
            if !counts.contains_key(speaker) {
                order.push(speaker);
            }
            *counts.entry(speaker).or_default() += 1;
        }
    }

    // max_by_key keeps the last maximum, so reverse to favor first-seen.
    order
        .into_iter()
        .rev()
        .max_by_key(|s| counts[s])
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Word;

    fn word(text: &str, speaker: Option<&str>) -> Word {
        Word {
            text: text.to_string(),
            start: None,
            end: None,
            speaker: speaker.map(str::to_string),
        }
    }

    fn seg(start: f64, end: f64, text: &str, speaker: Option<&str>) -> Segment {
        let words = text
            .split_whitespace()
            .map(|w| word(w, speaker))
            .collect();
        Segment {
            start,
            end,
            text: text.to_string(),
            words,
            avg_logprob: -0.2,
        }
    }

    #[test]
    fn test_basic_two_speaker_conversation() {
        let segments = vec![
            seg(0.0, 2.5, "Good morning doctor", Some("SPEAKER_01")),
            seg(3.0, 5.0, "Good morning what brings you in", Some("SPEAKER_00")),
            seg(5.5, 8.0, "I have had chest pain", Some("SPEAKER_01")),
        ];

        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());

        assert_eq!(lean.turns.len(), 3);
        assert_eq!(
            lean.turns.iter().map(|t| t.turn_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(lean.turns.iter().all(|t| t.duration >= 1.0));
        assert_eq!(lean.turns[0].speaker, "SPEAKER_01");
        assert_eq!(lean.turns[1].speaker, "SPEAKER_00");
    }

    #[test]
    fn test_same_speaker_segments_merge() {
        let segments = vec![
            seg(0.0, 2.0, "I have been coughing", Some("SPEAKER_01")),
            seg(2.5, 4.0, "mostly at night", Some("SPEAKER_01")),
        ];

        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());

        assert_eq!(lean.turns.len(), 1);
        assert_eq!(lean.turns[0].text, "I have been coughing mostly at night");
        assert_eq!(lean.turns[0].start_time, 0.0);
        assert_eq!(lean.turns[0].end_time, 4.0);
    }

    #[test]
    fn test_gap_exactly_two_seconds_does_not_split() {
        let segments = vec![
            seg(0.0, 2.0, "first part of the story", Some("SPEAKER_00")),
            seg(4.0, 6.0, "second part of the story", Some("SPEAKER_00")),
        ];

        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());
        assert_eq!(lean.turns.len(), 1);
    }

    #[test]
    fn test_gap_over_two_seconds_splits_same_speaker() {
        let segments = vec![
            seg(0.0, 2.0, "first part of the story", Some("SPEAKER_00")),
            seg(4.1, 6.0, "second part of the story", Some("SPEAKER_00")),
        ];

        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());
        assert_eq!(lean.turns.len(), 2);
        assert_eq!(lean.turns[0].speaker, lean.turns[1].speaker);
    }

    #[test]
    fn test_short_turn_dropped_and_renumbered() {
        let segments = vec![
            seg(0.0, 2.0, "tell me more about it", Some("SPEAKER_00")),
            // 0.8s turn, below the minimum.
            seg(5.0, 5.8, "well you see", Some("SPEAKER_01")),
            seg(9.0, 11.0, "it started two days ago", Some("SPEAKER_00")),
        ];

        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());
        assert_eq!(lean.turns.len(), 2);
        assert_eq!(lean.turns[0].turn_id, 1);
        assert_eq!(lean.turns[1].turn_id, 2);
    }

    #[test]
    fn test_turn_exactly_one_second_kept() {
        let segments = vec![seg(0.0, 1.0, "hello doctor again", Some("SPEAKER_01"))];
        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());
        assert_eq!(lean.turns.len(), 1);
        assert_eq!(lean.turns[0].duration, 1.0);
    }

    #[test]
    fn test_hallucinated_segment_removed_turns_contiguous() {
        let segments = vec![
            seg(0.0, 2.0, "how are you feeling", Some("SPEAKER_00")),
            seg(3.0, 5.0, "totototototo tototo toto", Some("SPEAKER_01")),
            seg(6.0, 8.0, "a bit better than before", Some("SPEAKER_01")),
        ];

        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());

        assert_eq!(lean.turns.len(), 2);
        assert!(lean.turns.iter().all(|t| !t.text.contains("toto")));
        assert_eq!(
            lean.turns.iter().map(|t| t.turn_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_unlabeled_words_inherit_previous_speaker() {
        let segments = vec![
            seg(0.0, 2.0, "please describe the pain", Some("SPEAKER_00")),
            seg(2.5, 4.5, "it burns when I breathe", None),
        ];

        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());

        // The unlabeled segment inherits SPEAKER_00 and merges.
        assert_eq!(lean.turns.len(), 1);
        assert_eq!(lean.turns[0].speaker, "SPEAKER_00");
    }

    #[test]
    fn test_no_labels_anywhere_defaults_single_speaker() {
        let segments = vec![
            seg(0.0, 2.0, "recording without diarization", None),
            seg(2.5, 4.5, "still no speaker labels", None),
        ];

        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());
        assert_eq!(lean.turns.len(), 1);
        assert_eq!(lean.turns[0].speaker, "SPEAKER_00");
    }

    #[test]
    fn test_lookback_is_bounded() {
        let segments = vec![
            seg(0.0, 2.0, "labeled segment here", Some("SPEAKER_01")),
            seg(2.2, 4.0, "first unlabeled stretch", None),
            seg(4.2, 6.0, "second unlabeled stretch", None),
            seg(6.2, 8.0, "third unlabeled stretch", None),
            seg(8.2, 10.0, "fourth unlabeled stretch", None),
        ];

        let lean = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());

        // Segments 2-4 inherit SPEAKER_01; the fifth is past the lookback
        // window and falls back to the default id.
        assert_eq!(lean.turns.len(), 2);
        assert_eq!(lean.turns[0].speaker, "SPEAKER_01");
        assert_eq!(lean.turns[1].speaker, "SPEAKER_00");
    }

    #[test]
    fn test_languages_sorted_unique() {
        let segments = vec![seg(0.0, 2.0, "selamat pagi doktor", Some("SPEAKER_01"))];
        let lean = reconstruct(
            &segments,
            &["ms".to_string(), "en".to_string(), "ms".to_string()],
            &TurnPolicy::default(),
        );
        assert_eq!(lean.languages_detected, vec!["en", "ms"]);
    }

    #[test]
    fn test_determinism() {
        let segments = vec![
            seg(0.0, 2.0, "one two three four", Some("SPEAKER_00")),
            seg(2.5, 4.5, "five six seven eight", Some("SPEAKER_01")),
        ];
        let a = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());
        let b = reconstruct(&segments, &["en".to_string()], &TurnPolicy::default());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_zero_word_segment_never_becomes_turn() {
        let mut empty = seg(0.0, 3.0, "", None);
        empty.words.clear();
        let lean = reconstruct(&[empty], &["en".to_string()], &TurnPolicy::default());
        assert!(lean.turns.is_empty());
    }
}
