use std::collections::{HashMap, HashSet};

use crate::config::TurnPolicy;
use crate::models::Segment;

/// Why a segment was rejected by the hallucination pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    TooShort,
    LowCharDiversity,
    Blocklisted,
    DominantWord,
    LowConfidence,
    InternalRepetition,
    DuplicateText,
}

/// Decide whether a segment survives the hallucination filters.
/// `kept_texts` holds the exact texts of previously kept segments.
pub fn classify_segment(
    segment: &Segment,
    kept_texts: &HashSet<String>,
    policy: &TurnPolicy,
) -> Result<(), RejectReason> {
    let text = segment.text.trim();
    if text.is_empty() {
        return Err(RejectReason::Empty);
    }
    if text.chars().count() < policy.min_segment_chars {
        return Err(RejectReason::TooShort);
    }

    let distinct: HashSet<char> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if distinct.len() < policy.min_distinct_chars && text.chars().count() > policy.low_diversity_len
    {
        return Err(RejectReason::LowCharDiversity);
    }

    let lower = text.to_lowercase();
    if policy.blocklist.iter().any(|b| lower.contains(b.as_str())) {
        return Err(RejectReason::Blocklisted);
    }

    let words: Vec<&str> = lower.split_whitespace().collect();
    if !words.is_empty() {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *counts.entry(word).or_default() += 1;
        }
        let max_count = counts.values().copied().max().unwrap_or(0);
        let total = words.len() as f64;

        // A word must actually repeat before its share means anything.
        if max_count >= 2 && max_count as f64 / total > policy.max_single_word_share {
            return Err(RejectReason::DominantWord);
        }

        if segment.avg_logprob < policy.min_avg_logprob {
            return Err(RejectReason::LowConfidence);
        }

        if max_count >= 2 && max_count as f64 / total > policy.max_repeated_word_share {
            return Err(RejectReason::InternalRepetition);
        }
        if (counts.len() as f64) / total < policy.min_unique_word_share {
            return Err(RejectReason::InternalRepetition);
        }
        if has_consecutive_phrase_repeat(&words, policy.max_phrase_len) {
            return Err(RejectReason::InternalRepetition);
        }
    } else if segment.avg_logprob < policy.min_avg_logprob {
        return Err(RejectReason::LowConfidence);
    }

    if kept_texts.contains(text) {
        return Err(RejectReason::DuplicateText);
    }

    Ok(())
}

/// True when any 2..=max_len word phrase occurs twice back-to-back.
fn has_consecutive_phrase_repeat(words: &[&str], max_len: usize) -> bool {
    for n in 2..=max_len {
        if words.len() < 2 * n {
            continue;
        }
        for i in 0..=(words.len() - 2 * n) {
            if words[i..i + n] == words[i + n..i + 2 * n] {
                return true;
            }
        }
    }
    false
}
