use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Expected answer for a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CorrectOption {
    Yes,
    No,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl CorrectOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectOption::Yes => "Yes",
            CorrectOption::No => "No",
            CorrectOption::NotApplicable => "N/A",
        }
    }

    /// Whether any answer is acceptable (scope-gate questions).
    pub fn accepts_any(&self) -> bool {
        matches!(self, CorrectOption::NotApplicable)
    }
}

/// One compliance question with its expected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct Control {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub detail_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_option: Option<CorrectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(default)]
    pub source_rules: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Control {
    /// Answer key holding the free-text detail for this control.
    pub fn detail_key(&self) -> String {
        detail_key(&self.id)
    }

    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.mapping_confidence
            .is_some_and(|confidence| confidence < threshold)
    }
}

pub fn detail_key(control_id: &str) -> String {
    format!("{control_id}_detail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn control_round_trips_wire_names() {
        let control: Control = serde_json::from_value(json!({
            "id": "4_2_3_1",
            "label": "Do you collect KYC information?",
            "detail-required": true,
            "correct-option": "N/A",
            "source-rules": ["4.2.3", "4.2.3"],
            "mapping-confidence": 0.8,
            "group": "collection-kyc"
        }))
        .expect("control");
        assert_eq!(control.correct_option, Some(CorrectOption::NotApplicable));
        assert_eq!(control.source_rules.len(), 1);

        let value = serde_json::to_value(&control).expect("encode");
        assert_eq!(value["correct-option"], "N/A");
        assert_eq!(value["detail-required"], true);
        assert!(value.get("detail-label").is_none());
    }

    #[test]
    fn unknown_correct_option_is_rejected() {
        let parsed = serde_json::from_value::<Control>(json!({
            "id": "4_1",
            "label": "x",
            "correct-option": "Maybe"
        }));
        assert!(parsed.is_err());
    }
}
