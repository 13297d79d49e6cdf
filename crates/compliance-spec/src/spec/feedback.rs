use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::spec::control::Control;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSeverity {
    Approved,
    Info,
    Warning,
    Error,
}

impl FeedbackSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackSeverity::Approved => "approved",
            FeedbackSeverity::Info => "info",
            FeedbackSeverity::Warning => "warning",
            FeedbackSeverity::Error => "error",
        }
    }

    /// Whether notes of this severity are forwarded to the next generation pass.
    pub fn is_prompt_guidance(&self) -> bool {
        match self {
            FeedbackSeverity::Approved | FeedbackSeverity::Info => false,
            FeedbackSeverity::Warning | FeedbackSeverity::Error => true,
        }
    }
}

impl std::str::FromStr for FeedbackSeverity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "approved" | "ok" => Ok(FeedbackSeverity::Approved),
            "info" => Ok(FeedbackSeverity::Info),
            "warning" | "warn" => Ok(FeedbackSeverity::Warning),
            "error" => Ok(FeedbackSeverity::Error),
            _ => Err(format!("unknown severity '{}'", value)),
        }
    }
}

/// Reviewer annotation on a single control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ControlNote {
    pub comment: String,
    pub severity: FeedbackSeverity,
}

/// Reviewer feedback for one questionnaire, persisted between regeneration passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeedbackFile {
    pub form_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub control_notes: BTreeMap<String, ControlNote>,
    /// Partial control records keyed by control id; keys use the control wire names.
    #[serde(default)]
    pub control_overrides: BTreeMap<String, Map<String, Value>>,
    #[serde(default)]
    pub additional_controls: Vec<Control>,
}

impl FeedbackFile {
    pub fn new(form_id: impl Into<String>) -> Self {
        Self {
            form_id: form_id.into(),
            last_updated: None,
            notes: Vec::new(),
            control_notes: BTreeMap::new(),
            control_overrides: BTreeMap::new(),
            additional_controls: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
            && self.control_notes.is_empty()
            && self.control_overrides.is_empty()
            && self.additional_controls.is_empty()
    }
}
