use serde::{Deserialize, Serialize};

/// Structured clinical record extracted from a consultation transcript.
///
/// All string fields may be null; list fields default to empty and are
/// de-duplicated. Drug and disease names are lowercase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    pub summary: Option<String>,
    pub chief_complaint: Option<String>,
    #[serde(default)]
    pub symptoms_present: Vec<String>,
    #[serde(default)]
    pub symptoms_negated: Vec<String>,
    pub onset_or_duration: Option<String>,
    #[serde(default)]
    pub allergy_substance: Vec<String>,
    #[serde(default)]
    pub meds_current: Vec<String>,
    #[serde(default)]
    pub conditions_past: Vec<String>,
    pub primary_diagnosis: Option<String>,
    pub rx_drug: Option<String>,
    pub rx_dose: Option<String>,
    pub follow_up: Option<String>,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(rename = "_metadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecordMetadata>,
}

impl ClinicalRecord {
    /// Lowercase drug/disease fields and de-duplicate every list,
    /// preserving first-seen order.
    pub fn normalize(&mut self) {
        self.primary_diagnosis = self.primary_diagnosis.take().map(|d| d.to_lowercase());
        self.rx_drug = self.rx_drug.take().map(|d| d.to_lowercase());

        for list in [
            &mut self.symptoms_present,
            &mut self.symptoms_negated,
            &mut self.allergy_substance,
            &mut self.meds_current,
            &mut self.conditions_past,
            &mut self.red_flags,
        ] {
            let mut seen = std::collections::HashSet::new();
            list.retain(|item| seen.insert(item.to_lowercase()));
        }

        for list in [
            &mut self.allergy_substance,
            &mut self.meds_current,
            &mut self.conditions_past,
        ] {
            for item in list.iter_mut() {
                *item = item.to_lowercase();
            }
        }
    }
}

/// Provenance attached to a persisted clinical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub source_file: String,
    pub model_used: String,
    /// "llm" or "rules".
    pub extraction_method: String,
    pub pipeline_version: String,
    pub extracted_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_dedupes() {
        let mut record = ClinicalRecord {
            primary_diagnosis: Some("Stable Angina".to_string()),
            rx_drug: Some("Nitroglycerin".to_string()),
            meds_current: vec!["Amlodipine".to_string(), "amlodipine".to_string()],
            red_flags: vec!["go to ER".to_string(), "Go to ER".to_string()],
            ..Default::default()
        };

        record.normalize();

        assert_eq!(record.primary_diagnosis.as_deref(), Some("stable angina"));
        assert_eq!(record.rx_drug.as_deref(), Some("nitroglycerin"));
        assert_eq!(record.meds_current, vec!["amlodipine"]);
        assert_eq!(record.red_flags, vec!["go to ER"]);
    }

    #[test]
    fn test_empty_record_serializes_lists() {
        let record = ClinicalRecord::default();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["symptoms_present"], serde_json::json!([]));
        assert_eq!(json["rx_drug"], serde_json::Value::Null);
    }
}
