use serde_json::{Map, Value, json};

use crate::{
    answers::AnswerContext,
    scoring::{GroupScore, score_group},
    spec::{
        control::Control,
        feedback::ControlNote,
        form::{Questionnaire, ReviewMetadata},
        group::GroupVariant,
    },
    status::{ControlStatus, control_status},
    visibility::{Visibility, resolve_visibility},
};

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// At least one visible control is unanswered, or no control is visible yet.
    NeedInput,
    /// Everything is answered but some answers are out of policy or lack detail.
    Attention,
    /// All visible controls are in policy.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Attention => "attention",
            RenderStatus::Complete => "complete",
        }
    }
}

/// Progress counters exposed to renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProgress {
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct RenderControl {
    pub id: String,
    pub label: String,
    pub status: ControlStatus,
    pub visible: bool,
    pub correct_option: Option<String>,
    pub detail_required: bool,
    pub detail_label: Option<String>,
    pub current_value: Option<String>,
    pub detail: Option<String>,
    pub review_note: Option<ControlNote>,
}

#[derive(Debug, Clone)]
pub struct RenderGroup {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub variant: GroupVariant,
    pub subprocess_label: Option<String>,
    pub visible: bool,
    pub score: GroupScore,
    pub controls: Vec<RenderControl>,
}

#[derive(Debug, Clone)]
pub struct RenderSubType {
    pub id: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone)]
pub struct RenderLink {
    pub target: String,
    pub label: String,
    pub gated_by: String,
    pub visible: bool,
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub form_id: String,
    pub status: RenderStatus,
    pub next_control_id: Option<String>,
    pub progress: RenderProgress,
    pub sub_types: Vec<RenderSubType>,
    pub groups: Vec<RenderGroup>,
    pub ungrouped: Vec<RenderControl>,
    pub links: Vec<RenderLink>,
    pub review: Option<ReviewMetadata>,
}

/// Build the renderer payload from a questionnaire and the current answers.
pub fn build_render_payload(
    form_id: &str,
    questionnaire: &Questionnaire,
    answers: &AnswerContext,
) -> RenderPayload {
    let visibility = resolve_visibility(questionnaire, answers);
    let review = questionnaire.review_metadata.clone();
    let render_control = |control: &Control| {
        build_control(control, &visibility, answers, review.as_ref())
    };

    let groups = questionnaire
        .groups
        .iter()
        .map(|group| RenderGroup {
            id: group.id.clone(),
            title: group.title.clone(),
            description: group.description.clone(),
            variant: group.variant,
            subprocess_label: group.subprocess_label.clone(),
            visible: visibility.group_visible(&group.id),
            score: score_group(&group.id, questionnaire, &visibility, answers),
            controls: questionnaire
                .controls_in_group(&group.id)
                .map(render_control)
                .collect(),
        })
        .collect::<Vec<_>>();

    let ungrouped = questionnaire
        .ungrouped_controls()
        .map(render_control)
        .collect::<Vec<_>>();

    let sub_types = questionnaire
        .sub_scoping
        .iter()
        .map(|sub_type| RenderSubType {
            id: sub_type.id.clone(),
            label: sub_type.label.clone(),
            selected: answers.is_sub_type_selected(&sub_type.id),
        })
        .collect::<Vec<_>>();

    let links = questionnaire
        .form_links
        .iter()
        .map(|link| RenderLink {
            target: link.target.clone(),
            label: link.label.clone(),
            gated_by: link.gated_by.clone(),
            visible: visibility.link_visible(&link.target),
        })
        .collect::<Vec<_>>();

    let visible_controls = groups
        .iter()
        .flat_map(|group| group.controls.iter())
        .chain(ungrouped.iter())
        .filter(|control| control.visible)
        .collect::<Vec<_>>();
    let total = visible_controls.len();
    let answered = visible_controls
        .iter()
        .filter(|control| control.status != ControlStatus::Pending)
        .count();
    let next_control_id = questionnaire
        .controls
        .iter()
        .find(|control| {
            visibility.control_visible(&control.id)
                && control_status(control, answers) == ControlStatus::Pending
        })
        .map(|control| control.id.clone());
    let needs_attention = visible_controls.iter().any(|control| {
        matches!(
            control.status,
            ControlStatus::Error | ControlStatus::Warning
        )
    });

    let status = if next_control_id.is_some() || total == 0 {
        RenderStatus::NeedInput
    } else if needs_attention {
        RenderStatus::Attention
    } else {
        RenderStatus::Complete
    };

    RenderPayload {
        form_id: form_id.to_string(),
        status,
        next_control_id,
        progress: RenderProgress { answered, total },
        sub_types,
        groups,
        ungrouped,
        links,
        review,
    }
}

fn build_control(
    control: &Control,
    visibility: &Visibility,
    answers: &AnswerContext,
    review: Option<&ReviewMetadata>,
) -> RenderControl {
    RenderControl {
        id: control.id.clone(),
        label: control.label.clone(),
        status: control_status(control, answers),
        visible: visibility.control_visible(&control.id),
        correct_option: control
            .correct_option
            .map(|option| option.as_str().to_string()),
        detail_required: control.detail_required,
        detail_label: control.detail_label.clone(),
        current_value: answers.form_answer(&control.id).map(str::to_string),
        detail: answers.detail(&control.id).map(str::to_string),
        review_note: review.and_then(|review| review.control_notes.get(&control.id).cloned()),
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    let groups = payload
        .groups
        .iter()
        .map(|group| {
            let mut map = Map::new();
            map.insert("id".into(), Value::String(group.id.clone()));
            map.insert("title".into(), Value::String(group.title.clone()));
            map.insert(
                "description".into(),
                group
                    .description
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            map.insert(
                "variant".into(),
                Value::String(group.variant.as_str().to_string()),
            );
            if let Some(label) = &group.subprocess_label {
                map.insert("subprocess_label".into(), Value::String(label.clone()));
            }
            map.insert("visible".into(), Value::Bool(group.visible));
            map.insert("score".into(), score_json(&group.score));
            map.insert(
                "controls".into(),
                Value::Array(group.controls.iter().map(control_json).collect()),
            );
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    let review = payload.review.as_ref().map(|review| {
        json!({
            "form_id": review.form_id,
            "last_updated": review.last_updated.to_rfc3339(),
        })
    });

    json!({
        "form_id": payload.form_id,
        "status": payload.status.as_str(),
        "next_control_id": payload.next_control_id,
        "progress": {
            "answered": payload.progress.answered,
            "total": payload.progress.total,
        },
        "sub_types": payload.sub_types.iter().map(|sub_type| json!({
            "id": sub_type.id,
            "label": sub_type.label,
            "selected": sub_type.selected,
        })).collect::<Vec<_>>(),
        "groups": groups,
        "ungrouped": payload.ungrouped.iter().map(control_json).collect::<Vec<_>>(),
        "form_links": payload.links.iter().map(|link| json!({
            "target": link.target,
            "label": link.label,
            "gated_by": link.gated_by,
            "visible": link.visible,
        })).collect::<Vec<_>>(),
        "review": review,
    })
}

fn control_json(control: &RenderControl) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), Value::String(control.id.clone()));
    map.insert("label".into(), Value::String(control.label.clone()));
    map.insert(
        "status".into(),
        Value::String(control.status.as_str().to_string()),
    );
    map.insert("visible".into(), Value::Bool(control.visible));
    if let Some(option) = &control.correct_option {
        map.insert("correct_option".into(), Value::String(option.clone()));
    }
    map.insert("detail_required".into(), Value::Bool(control.detail_required));
    if let Some(label) = &control.detail_label {
        map.insert("detail_label".into(), Value::String(label.clone()));
    }
    if let Some(value) = &control.current_value {
        map.insert("current_value".into(), Value::String(value.clone()));
    }
    if let Some(detail) = &control.detail {
        map.insert("detail".into(), Value::String(detail.clone()));
    }
    if let Some(note) = &control.review_note {
        map.insert(
            "review_note".into(),
            json!({
                "comment": note.comment,
                "severity": note.severity.as_str(),
            }),
        );
    }
    Value::Object(map)
}

fn score_json(score: &GroupScore) -> Value {
    json!({
        "success": score.success,
        "warning": score.warning,
        "error": score.error,
        "pending": score.pending,
        "hidden": score.hidden,
        "completion": score.completion(),
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {}", payload.form_id));
    lines.push(format!(
        "Status: {} ({}/{})",
        payload.status.as_str(),
        payload.progress.answered,
        payload.progress.total
    ));
    if let Some(review) = &payload.review {
        lines.push(format!("Reviewed: {}", review.last_updated.to_rfc3339()));
    }

    if !payload.sub_types.is_empty() {
        lines.push("Sub-types:".to_string());
        for sub_type in &payload.sub_types {
            let mark = if sub_type.selected { "x" } else { " " };
            lines.push(format!(" [{}] {} ({})", mark, sub_type.label, sub_type.id));
        }
    }

    for group in payload.groups.iter().filter(|group| group.visible) {
        let mut heading = format!("{} [{}]", group.title, group.id);
        if let Some(label) = &group.subprocess_label {
            heading.push_str(&format!(" ({})", label));
        }
        match group.score.completion() {
            Some(completion) => heading.push_str(&format!(
                " {}/{} complete ({:.0}%)",
                group.score.success,
                group.score.visible(),
                completion * 100.0
            )),
            None => heading.push_str(" no applicable controls"),
        }
        lines.push(heading);
        for control in group.controls.iter().filter(|control| control.visible) {
            lines.push(control_line(control));
        }
    }

    let ungrouped = payload
        .ungrouped
        .iter()
        .filter(|control| control.visible)
        .collect::<Vec<_>>();
    if !ungrouped.is_empty() {
        lines.push("Ungrouped:".to_string());
        for control in ungrouped {
            lines.push(control_line(control));
        }
    }

    for link in payload.links.iter().filter(|link| link.visible) {
        lines.push(format!("See also: {} -> {}", link.label, link.target));
    }

    match &payload.next_control_id {
        Some(next) => lines.push(format!("Next control: {}", next)),
        None if payload.progress.total == 0 => {
            lines.push("No visible controls for the current selection.".to_string())
        }
        None => lines.push("All visible controls are answered.".to_string()),
    }

    lines.join("\n")
}

fn control_line(control: &RenderControl) -> String {
    let mut entry = format!(
        " - [{}] {} {}",
        control.status.as_str(),
        control.id,
        control.label
    );
    if let Some(value) = &control.current_value {
        entry.push_str(&format!(" = {}", value));
    }
    if let Some(detail) = &control.detail {
        entry.push_str(&format!(" ({})", detail));
    }
    if let Some(note) = &control.review_note {
        entry.push_str(&format!(
            "\n     review [{}]: {}",
            note.severity.as_str(),
            note.comment
        ));
    }
    entry
}
