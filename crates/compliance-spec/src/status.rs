use serde::{Deserialize, Serialize};

use crate::answers::AnswerContext;
use crate::spec::control::Control;

/// Four-state evaluation of a single control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStatus {
    Pending,
    Success,
    Warning,
    Error,
}

impl ControlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlStatus::Pending => "pending",
            ControlStatus::Success => "success",
            ControlStatus::Warning => "warning",
            ControlStatus::Error => "error",
        }
    }
}

/// Derive the status of `control` from the current form answers.
///
/// An out-of-policy answer is an error regardless of detail; detail
/// completeness is only checked once the primary answer is correct.
pub fn control_status(control: &Control, answers: &AnswerContext) -> ControlStatus {
    let Some(answer) = answers.form_answer(&control.id) else {
        return ControlStatus::Pending;
    };

    let expected = match control.correct_option {
        None => return ControlStatus::Success,
        Some(option) if option.accepts_any() => return ControlStatus::Success,
        Some(option) => option,
    };

    if answer != expected.as_str() {
        return ControlStatus::Error;
    }

    if control.detail_required
        && answers
            .detail(&control.id)
            .is_none_or(|detail| detail.trim().is_empty())
    {
        return ControlStatus::Warning;
    }

    ControlStatus::Success
}
