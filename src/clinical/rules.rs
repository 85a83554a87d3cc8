use regex::Regex;

use crate::models::ClinicalRecord;

/// Sentinel placed in `summary` by the rule path.
pub const RULE_SUMMARY_SENTINEL: &str = "rule-based extraction (no model)";

const NEGATION_WORDS: [&str; 8] = [
    "no", "not", "without", "denies", "denied", "never", "absent", "negative",
];

/// How many tokens of preceding context a negation word may sit in.
const NEGATION_WINDOW: usize = 5;

const COMMON_SYMPTOMS: [&str; 21] = [
    "chest pain",
    "pain",
    "headache",
    "fever",
    "cough",
    "nausea",
    "vomiting",
    "dizziness",
    "fatigue",
    "shortness of breath",
    "breathlessness",
    "abdominal pain",
    "back pain",
    "sore throat",
    "runny nose",
    "congestion",
    "migraines",
    "migraine",
    "blurred vision",
    "vision changes",
    "sweating",
];

const DRUG_LEXICON: [&str; 15] = [
    "amlodipine",
    "metformin",
    "paracetamol",
    "ibuprofen",
    "omeprazole",
    "losartan",
    "atorvastatin",
    "salbutamol",
    "nitroglycerin",
    "aspirin",
    "warfarin",
    "insulin",
    "furosemide",
    "lisinopril",
    "simvastatin",
];

/// Deterministic pattern-based extraction. Same input text, same record.
pub struct RuleExtractor {
    symptoms: Vec<(&'static str, Regex)>,
    temporal: Vec<Regex>,
    allergy: Regex,
    diagnosis: Vec<Regex>,
    dose: Regex,
    frequency: Regex,
    duration: Regex,
    follow_up: Vec<Regex>,
    red_flags: Vec<Regex>,
    sentence_break: Regex,
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleExtractor {
    pub fn new() -> Self {
        let rx = |p: &str| Regex::new(p).expect("static extraction pattern");
        Self {
            symptoms: COMMON_SYMPTOMS
                .iter()
                .map(|s| (*s, rx(&format!(r"(?i)\b{}\b", regex::escape(s)))))
                .collect(),
            temporal: vec![
                rx(r"(?i)\b(?:for|since)\s+\d+\s*(?:day|week|month|hour)s?\b"),
                rx(r"(?i)\bsince\s+[a-z]+(?:\s+[a-z]+)?"),
                rx(r"(?i)\byesterday\b"),
                rx(r"(?i)\blast night\b"),
                rx(r"(?i)\bthis morning\b"),
                rx(r"(?i)\btoday\b"),
                rx(r"(?i)\b\d+\s*(?:days?|weeks?|months?|hours?)(?:\s+ago)?\b"),
            ],
            allergy: rx(r"(?i)(?:allergic\s+to|allergy\s+to|allergies?\s*[:\-])\s*([^.,;!?]+)"),
            diagnosis: vec![
                rx(r"(?i)(?:likely\s+diagnosis|diagnosis|impression|assessment|likely|suspect|consistent\s+with)\s*[:\-]?\s+([^.!?]+)"),
                rx(r"(?i)(?:diagnosed\s+with|likely\s+to\s+be)\s+([^.!?]+)"),
                rx(r"(?i)(?:appears\s+to\s+be|seems\s+to\s+be)\s+([^.!?]+)"),
            ],
            dose: rx(r"(?i)\b\d+(?:\.\d+)?\s*(?:mg|mcg|g|ml|puffs?|tablets?|capsules?)\b"),
            frequency: rx(
                r"(?i)\b(?:bid|tid|qid|q\d+h|once\s+daily|twice\s+daily|three\s+times\s+daily|qhs|prn|as\s+needed)\b",
            ),
            duration: rx(r"(?i)\bfor\s+\d+\s+(?:days?|weeks?)\b"),
            follow_up: vec![
                rx(r"(?i)follow[\s\-]?up\s+(?:in|after)\s+[^.!?]+"),
                rx(r"(?i)review\s+(?:in|after)\s+[^.!?]+"),
                rx(r"(?i)see\s+you\s+(?:in|after)\s+[^.!?]+"),
                rx(r"(?i)return\s+(?:in|after)\s+[^.!?]+"),
            ],
            red_flags: vec![
                rx(r"(?i)go to (?:the\s+)?(?:ER|emergency|A&E|hospital)"),
                rx(r"(?i)return immediately"),
                rx(r"(?i)if\s+(?:worse|symptoms\s+worsen|it\s+worsens)"),
                rx(r"(?i)severe\s+(?:chest\s+pain|breathlessness|difficulty\s+breathing)"),
                rx(r"(?i)chest\s+pain\s+at\s+rest"),
            ],
            sentence_break: rx(r"[.!?]+(?:\s+|$)"),
        }
    }

    /// Run every extractor over the flattened transcript text.
    pub fn extract(&self, text: &str) -> ClinicalRecord {
        let (symptoms_present, symptoms_negated) = self.extract_symptoms(text);
        let (rx_drug, rx_dose) = self.extract_rx(text);

        let mut record = ClinicalRecord {
            summary: Some(RULE_SUMMARY_SENTINEL.to_string()),
            chief_complaint: self.extract_chief_complaint(text),
            symptoms_present,
            symptoms_negated,
            onset_or_duration: self.extract_temporal(text),
            allergy_substance: self.extract_allergies(text),
            meds_current: self.extract_medications(text),
            conditions_past: Vec::new(),
            primary_diagnosis: self.extract_diagnosis(text),
            rx_drug,
            rx_dose,
            follow_up: self.extract_follow_up(text),
            red_flags: self.extract_red_flags(text),
            metadata: None,
        };
        record.normalize();
        record
    }

    /// First sentence, truncated to 120 characters with an ellipsis.
    fn extract_chief_complaint(&self, text: &str) -> Option<String> {
        let first = self
            .sentence_break
            .split(text.trim())
            .find(|s| !s.trim().is_empty())?
            .trim();
        if first.is_empty() {
            return None;
        }
        if first.chars().count() > 120 {
            let truncated: String = first.chars().take(117).collect();
            Some(format!("{}...", truncated))
        } else {
            Some(first.to_string())
        }
    }

    fn extract_temporal(&self, text: &str) -> Option<String> {
        self.temporal
            .iter()
            .find_map(|p| p.find(text))
            .map(|m| m.as_str().trim().to_string())
    }

    fn extract_allergies(&self, text: &str) -> Vec<String> {
        let mut allergies = Vec::new();
        for caps in self.allergy.captures_iter(text) {
            if let Some(group) = caps.get(1) {
                for part in group.as_str().split(|c| c == ',').flat_map(|p| p.split(" and ")) {
                    let cleaned = part.trim().trim_end_matches('.').to_lowercase();
                    if !cleaned.is_empty() && !allergies.contains(&cleaned) {
                        allergies.push(cleaned);
                    }
                }
            }
        }
        allergies
    }

    /// Curated keyword sweep with a negation window: a symptom is negated
    /// when a negation word appears in the last few tokens before it.
    fn extract_symptoms(&self, text: &str) -> (Vec<String>, Vec<String>) {
        let mut present = Vec::new();
        let mut negated = Vec::new();

        for (symptom, pattern) in &self.symptoms {
            for m in pattern.find_iter(text) {
                let is_negated = preceding_tokens(text, m.start(), NEGATION_WINDOW)
                    .iter()
                    .any(|t| NEGATION_WORDS.contains(&t.as_str()));

                let target = if is_negated { &mut negated } else { &mut present };
                let name = symptom.to_string();
                if !target.contains(&name) {
                    target.push(name);
                }
            }
        }

        (dedupe_substrings(present), dedupe_substrings(negated))
    }

    fn extract_medications(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        DRUG_LEXICON
            .iter()
            .filter(|drug| lower.contains(*drug))
            .map(|drug| drug.to_string())
            .collect()
    }

    fn extract_diagnosis(&self, text: &str) -> Option<String> {
        for pattern in &self.diagnosis {
            let matches: Vec<_> = pattern.captures_iter(text).collect();
            if let Some(caps) = matches.last() {
                let mut diagnosis = caps.get(1)?.as_str().trim().to_lowercase();
                // Drop trailing clauses after a comma or "and".
                if let Some(idx) = diagnosis.find(", ") {
                    diagnosis.truncate(idx);
                }
                if let Some(idx) = diagnosis.find(" and ") {
                    diagnosis.truncate(idx);
                }
                if !diagnosis.is_empty() {
                    return Some(diagnosis);
                }
            }
        }
        None
    }

    /// Last sentence that names a drug; dose, frequency, and duration are
    /// pulled from that sentence and concatenated.
    fn extract_rx(&self, text: &str) -> (Option<String>, Option<String>) {
        let mut last: Option<(String, &'static str)> = None;
        for sentence in self.sentence_break.split(text) {
            let lower = sentence.to_lowercase();
            for drug in DRUG_LEXICON {
                if lower.contains(drug) {
                    last = Some((sentence.to_string(), drug));
                }
            }
        }

        let Some((sentence, drug)) = last else {
            return (None, None);
        };

        let mut pieces = Vec::new();
        if let Some(m) = self.dose.find(&sentence) {
            pieces.push(m.as_str().to_string());
        }
        if let Some(m) = self.frequency.find(&sentence) {
            pieces.push(m.as_str().to_string());
        }
        if let Some(m) = self.duration.find(&sentence) {
            pieces.push(m.as_str().to_string());
        }

        let dose = if pieces.is_empty() {
            None
        } else {
            Some(pieces.join(" "))
        };
        (Some(drug.to_string()), dose)
    }

    fn extract_follow_up(&self, text: &str) -> Option<String> {
        self.follow_up
            .iter()
            .find_map(|p| p.find(text))
            .map(|m| m.as_str().trim().to_string())
    }

    fn extract_red_flags(&self, text: &str) -> Vec<String> {
        let mut flags: Vec<String> = Vec::new();
        for pattern in &self.red_flags {
            for m in pattern.find_iter(text) {
                let flag = m.as_str().trim().to_string();
                if !flags.iter().any(|f| f.eq_ignore_ascii_case(&flag)) {
                    flags.push(flag);
                }
            }
        }
        flags
    }
}

/// The last `window` whitespace tokens before `pos`, punctuation stripped,
/// lowercased.
fn preceding_tokens(text: &str, pos: usize, window: usize) -> Vec<String> {
    text[..pos]
        .split_whitespace()
        .rev()
        .take(window)
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .collect()
}

/// Remove entries that are strict substrings of a longer entry.
pub fn dedupe_substrings(items: Vec<String>) -> Vec<String> {
    let snapshot = items.clone();
    items
        .into_iter()
        .filter(|item| {
            !snapshot
                .iter()
                .any(|other| other != item && other.contains(item.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONSULTATION: &str = "Patient: I've had chest pain for 2 days, worse on exertion, \
no fever or cough. Doctor: Any allergies? Patient: I'm allergic to penicillin. \
Doctor: Current meds? Patient: Amlodipine at night. Doctor: Likely diagnosis: \
stable angina. I'll prescribe nitroglycerin 0.4 mg sublingual PRN chest pain, \
review in one week. If chest pain at rest or severe breathlessness, go to ER immediately.";

    #[test]
    fn test_clinical_acceptance_case() {
        let record = RuleExtractor::new().extract(CONSULTATION);

        assert!(record.chief_complaint.unwrap().contains("chest pain"));
        assert!(record.symptoms_present.iter().any(|s| s == "chest pain"));
        assert!(record.symptoms_negated.iter().any(|s| s == "fever"));
        assert!(record.symptoms_negated.iter().any(|s| s == "cough"));
        assert!(record.onset_or_duration.unwrap().contains("2 days"));
        assert!(record.allergy_substance.iter().any(|a| a == "penicillin"));
        assert!(record.meds_current.iter().any(|m| m == "amlodipine"));
        assert!(record.primary_diagnosis.unwrap().contains("stable angina"));
        assert_eq!(record.rx_drug.as_deref(), Some("nitroglycerin"));

        let dose = record.rx_dose.unwrap().to_lowercase();
        assert!(dose.contains("0.4 mg"));
        assert!(dose.contains("prn"));

        let follow_up = record.follow_up.unwrap();
        assert!(follow_up.contains("review in"));
        assert!(follow_up.contains("one week"));

        assert!(
            record
                .red_flags
                .iter()
                .any(|f| f.to_lowercase().contains("go to er"))
        );
        assert_eq!(record.summary.as_deref(), Some(RULE_SUMMARY_SENTINEL));
    }

    #[test]
    fn test_rule_path_is_deterministic() {
        let extractor = RuleExtractor::new();
        let a = extractor.extract(CONSULTATION);
        let b = extractor.extract(CONSULTATION);
        assert_eq!(a, b);
    }

    #[test]
    fn test_substring_dedup() {
        let deduped = dedupe_substrings(vec![
            "pain".to_string(),
            "chest pain".to_string(),
            "fever".to_string(),
        ]);
        assert_eq!(deduped, vec!["chest pain", "fever"]);
    }

    #[test]
    fn test_negation_window_is_bounded() {
        let extractor = RuleExtractor::new();
        // "no" sits more than five tokens before "fever".
        let record = extractor
            .extract("There is no sign of anything unusual at all except fever today.");
        assert!(record.symptoms_present.iter().any(|s| s == "fever"));
        assert!(record.symptoms_negated.is_empty());
    }

    #[test]
    fn test_negation_inside_window() {
        let record = RuleExtractor::new().extract("The patient denies any headache.");
        assert!(record.symptoms_negated.iter().any(|s| s == "headache"));
    }

    #[test]
    fn test_allergy_list_splitting() {
        let record =
            RuleExtractor::new().extract("She is allergic to penicillin and sulfa drugs.");
        assert!(record.allergy_substance.contains(&"penicillin".to_string()));
        assert!(record.allergy_substance.contains(&"sulfa drugs".to_string()));
    }

    #[test]
    fn test_rx_takes_last_drug_sentence() {
        let record = RuleExtractor::new().extract(
            "He used to take aspirin 75 mg once daily. \
             Start metformin 500 mg twice daily for 2 weeks.",
        );
        assert_eq!(record.rx_drug.as_deref(), Some("metformin"));
        let dose = record.rx_dose.unwrap();
        assert!(dose.contains("500 mg"));
        assert!(dose.contains("twice daily"));
        assert!(dose.contains("for 2 weeks"));
    }

    #[test]
    fn test_no_drug_no_rx() {
        let record = RuleExtractor::new().extract("Plenty of rest and fluids.");
        assert!(record.rx_drug.is_none());
        assert!(record.rx_dose.is_none());
    }

    #[test]
    fn test_red_flags_deduplicated() {
        let record = RuleExtractor::new()
            .extract("Go to ER if it worsens. I repeat, go to ER without delay.");
        let er_flags = record
            .red_flags
            .iter()
            .filter(|f| f.to_lowercase().contains("go to er"))
            .count();
        assert_eq!(er_flags, 1);
    }

    #[test]
    fn test_chief_complaint_truncation() {
        let long = format!("Patient reports {} and more", "a very long complaint ".repeat(10));
        let record = RuleExtractor::new().extract(&long);
        let complaint = record.chief_complaint.unwrap();
        assert!(complaint.chars().count() <= 120);
        assert!(complaint.ends_with("..."));
    }
}
