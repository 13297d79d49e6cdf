//! Reviewer feedback layered onto generated questionnaires.
//!
//! Notes and warning/error control notes become prompt guidance for the next
//! generation pass. Overrides and additional controls only ever touch a derived
//! copy of the generated questionnaire.

pub mod guidance;
pub mod store;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::spec::control::Control;
use crate::spec::feedback::FeedbackFile;
use crate::spec::form::{Questionnaire, ReviewMetadata};
use crate::validate::{RecordKind, Validator, Violation, ViolationKind};

pub use guidance::PromptGuidance;
pub use store::{FeedbackLoad, FeedbackStore};

/// Result of applying one feedback file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeOutcome {
    pub guidance: PromptGuidance,
    pub questionnaire: Questionnaire,
    pub violations: Vec<Violation>,
    /// Override keys with no matching control.
    pub unknown_overrides: Vec<String>,
}

/// Apply feedback with the default validator.
pub fn apply_feedback(generated: &Questionnaire, feedback: &FeedbackFile) -> MergeOutcome {
    apply_feedback_with(&Validator::default(), generated, feedback)
}

/// Apply `feedback` to a copy of `generated`.
///
/// Additional controls are appended and validated like generated ones, so an
/// addition reusing an existing id is dropped as `DuplicateControlId`; edits to
/// existing controls go through `control_overrides`.
///
/// Re-applying the same feedback to the result yields the same questionnaire:
/// overrides set fields rather than accumulate, and `_review_metadata.last_updated`
/// is the feedback file's own timestamp, not the merge time. Only feedback
/// without a timestamp is stamped with the current time.
pub fn apply_feedback_with(
    validator: &Validator,
    generated: &Questionnaire,
    feedback: &FeedbackFile,
) -> MergeOutcome {
    let guidance = PromptGuidance::from_feedback(feedback);
    let mut violations = Vec::new();
    let mut unknown_overrides = Vec::new();
    let mut controls = generated.controls.clone();

    for (control_id, patch) in &feedback.control_overrides {
        let Some(position) = controls.iter().position(|control| &control.id == control_id) else {
            tracing::warn!(
                form = %feedback.form_id,
                control = %control_id,
                "override targets unknown control"
            );
            unknown_overrides.push(control_id.clone());
            continue;
        };
        match patch_control(&controls[position], patch) {
            Ok(patched) => controls[position] = patched,
            Err(err) => {
                tracing::warn!(
                    form = %feedback.form_id,
                    control = %control_id,
                    "override ignored: {}",
                    err
                );
                violations.push(Violation {
                    record: RecordKind::Control,
                    id: control_id.clone(),
                    kind: ViolationKind::MalformedRecord,
                    message: format!("override for '{}' ignored: {}", control_id, err),
                });
            }
        }
    }

    controls.extend(feedback.additional_controls.iter().cloned());

    let candidate = Questionnaire {
        controls,
        review_metadata: Some(ReviewMetadata {
            form_id: feedback.form_id.clone(),
            last_updated: feedback.last_updated.unwrap_or_else(Utc::now),
            control_notes: feedback.control_notes.clone(),
        }),
        ..generated.clone()
    };
    let mut report = validator.validate(&candidate);
    violations.append(&mut report.violations);

    tracing::debug!(
        form = %feedback.form_id,
        overrides = feedback.control_overrides.len(),
        additions = feedback.additional_controls.len(),
        dropped = violations.len(),
        "feedback applied"
    );

    MergeOutcome {
        guidance,
        questionnaire: report.questionnaire,
        violations,
        unknown_overrides,
    }
}

/// Set each patched field on the control's wire representation; `null` clears a field.
fn patch_control(
    control: &Control,
    patch: &serde_json::Map<String, Value>,
) -> Result<Control, serde_json::Error> {
    let mut value = serde_json::to_value(control)?;
    if let Value::Object(fields) = &mut value {
        for (key, patched) in patch {
            if patched.is_null() {
                fields.remove(key);
            } else {
                fields.insert(key.clone(), patched.clone());
            }
        }
    }
    serde_json::from_value(value)
}

/// How feedback affected a reviewed questionnaire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedbackStatus {
    Absent,
    Applied,
    /// The file exists but could not be parsed; the generated questionnaire is used as-is.
    ParseFailed { message: String },
}

/// Questionnaire ready for display after the optional feedback pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewedQuestionnaire {
    pub questionnaire: Questionnaire,
    pub guidance: PromptGuidance,
    pub status: FeedbackStatus,
    pub violations: Vec<Violation>,
}

/// Merge loaded feedback, or fall back to the untouched questionnaire.
pub fn review(
    validator: &Validator,
    generated: &Questionnaire,
    load: FeedbackLoad,
) -> ReviewedQuestionnaire {
    match load {
        FeedbackLoad::Absent => ReviewedQuestionnaire {
            questionnaire: generated.clone(),
            guidance: PromptGuidance::default(),
            status: FeedbackStatus::Absent,
            violations: Vec::new(),
        },
        FeedbackLoad::Malformed(err) => {
            tracing::warn!("feedback not applied: {}", err);
            ReviewedQuestionnaire {
                questionnaire: generated.clone(),
                guidance: PromptGuidance::default(),
                status: FeedbackStatus::ParseFailed {
                    message: err.to_string(),
                },
                violations: Vec::new(),
            }
        }
        FeedbackLoad::Loaded(feedback) => {
            let outcome = apply_feedback_with(validator, generated, &feedback);
            ReviewedQuestionnaire {
                questionnaire: outcome.questionnaire,
                guidance: outcome.guidance,
                status: FeedbackStatus::Applied,
                violations: outcome.violations,
            }
        }
    }
}
