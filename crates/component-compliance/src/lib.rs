use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use compliance_spec::{
    AnswerContext, AnswerMap, AuditConfig, FeedbackLoad, FormDefinition, FormError,
    PromptGuidance, Questionnaire, RenderPayload, TextNode, ValidationConfig, Validator,
    Violation, answer_map_from_value, answer_map_to_value, audit_questionnaire,
    build_render_payload, control_status, extract_input_rule_codes, inject_static_fields,
    log_coverage_report, parse_candidate, render_json_ui as spec_render_json_ui,
    render_text as spec_render_text, resolve_visibility, review, score_group,
};

const DEFAULT_FORM_ID: &str = "cdd-companies";
const DEFAULT_ARTIFACT: &str =
    include_str!("../../compliance-spec/tests/fixtures/cdd_companies.json");

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("failed to parse input: {0}")]
    InputParse(#[source] serde_json::Error),
    #[error("form '{0}' is not available")]
    FormUnavailable(String),
    #[error("sub-type '{0}' is not defined on this form")]
    UnknownSubType(String),
    #[error("answer for '{0}' must be a string or null")]
    InvalidAnswer(String),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
    #[error(transparent)]
    Form(#[from] FormError),
}

#[derive(Debug, Deserialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    form_id: Option<String>,
    #[serde(default)]
    artifact_json: Option<String>,
    #[serde(default)]
    validation: ValidationConfig,
    #[serde(default)]
    audit: AuditConfig,
    #[serde(default)]
    intro_answers: Value,
    #[serde(default)]
    definition: Option<FormDefinition>,
}

/// Validated questionnaire plus the host settings that travel with it.
struct LoadedForm {
    form_id: String,
    questionnaire: Questionnaire,
    violations: Vec<Violation>,
    validator: Validator,
    intro: AnswerMap,
    audit: AuditConfig,
    definition: Option<FormDefinition>,
}

impl LoadedForm {
    fn answers(&self, answers_json: &str) -> AnswerContext {
        AnswerContext::new(self.intro.clone(), parse_answers(answers_json))
    }
}

fn load_config(config_json: &str) -> Result<ComponentConfig, ComponentError> {
    if config_json.trim().is_empty() {
        Ok(ComponentConfig::default())
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)
    }
}

fn ensure_form(form_id: &str, config_json: &str) -> Result<LoadedForm, ComponentError> {
    let config = load_config(config_json)?;
    let configured_id = config.form_id.as_deref().unwrap_or(DEFAULT_FORM_ID);
    if configured_id != form_id {
        return Err(ComponentError::FormUnavailable(form_id.to_string()));
    }

    let artifact_json = config.artifact_json.as_deref().unwrap_or(DEFAULT_ARTIFACT);
    let candidate: Value = serde_json::from_str(artifact_json).map_err(FormError::ArtifactParse)?;
    let validator = Validator::new(&config.validation)?;
    let (parsed, mut violations) = parse_candidate(&candidate);
    let parsed = match &config.definition {
        Some(definition) => inject_static_fields(parsed, definition),
        None => parsed,
    };
    let report = validator.validate(&parsed);
    violations.extend(report.violations);

    Ok(LoadedForm {
        form_id: form_id.to_string(),
        questionnaire: report.questionnaire,
        violations,
        validator,
        intro: answer_map_from_value(&config.intro_answers),
        audit: config.audit,
        definition: config.definition,
    })
}

fn parse_answers(answers_json: &str) -> AnswerMap {
    serde_json::from_str::<Value>(answers_json)
        .map(|value| answer_map_from_value(&value))
        .unwrap_or_default()
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn respond_string(result: Result<String, ComponentError>) -> String {
    match result {
        Ok(value) => value,
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ComponentError> {
    serde_json::to_value(value).map_err(ComponentError::JsonEncode)
}

/// The validated questionnaire for `form_id`.
pub fn describe(form_id: &str, config_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|form| to_value(&form.questionnaire)))
}

/// Cleaned questionnaire plus every record dropped while cleaning it.
pub fn validate_artifact(form_id: &str, config_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|form| {
        Ok(json!({
            "form_id": form.form_id,
            "clean": form.violations.is_empty(),
            "violations": to_value(&form.violations)?,
            "questionnaire": to_value(&form.questionnaire)?,
        }))
    }))
}

fn evaluation(form: &LoadedForm, answers: &AnswerContext) -> Value {
    let questionnaire = &form.questionnaire;
    let visibility = resolve_visibility(questionnaire, answers);

    let statuses = questionnaire
        .controls
        .iter()
        .map(|control| {
            (
                control.id.clone(),
                Value::String(control_status(control, answers).as_str().to_string()),
            )
        })
        .collect::<Map<_, _>>();
    let scores = questionnaire
        .groups
        .iter()
        .map(|group| {
            let score = score_group(&group.id, questionnaire, &visibility, answers);
            let value = json!({
                "success": score.success,
                "warning": score.warning,
                "error": score.error,
                "pending": score.pending,
                "hidden": score.hidden,
                "completion": score.completion(),
            });
            (group.id.clone(), value)
        })
        .collect::<Map<_, _>>();
    let payload = build_render_payload(&form.form_id, questionnaire, answers);

    let mut result = json!({
        "form_id": form.form_id,
        "status": payload.status.as_str(),
        "next_control_id": payload.next_control_id,
        "progress": {
            "answered": payload.progress.answered,
            "total": payload.progress.total,
        },
        "statuses": statuses,
        "visibility": {
            "groups": visibility.groups,
            "controls": visibility.controls,
            "form_links": visibility.form_links,
        },
        "scores": scores,
    });
    if let Some(definition) = &form.definition {
        result["form_visible"] = Value::Bool(definition.is_form_visible(answers));
    }
    result
}

/// Statuses, visibility and group scores for one answer snapshot.
pub fn evaluate(form_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(ensure_form(form_id, config_json).map(|form| {
        let answers = form.answers(answers_json);
        evaluation(&form, &answers)
    }))
}

fn render_payload(
    form_id: &str,
    config_json: &str,
    answers_json: &str,
) -> Result<RenderPayload, ComponentError> {
    let form = ensure_form(form_id, config_json)?;
    let answers = form.answers(answers_json);
    Ok(build_render_payload(
        &form.form_id,
        &form.questionnaire,
        &answers,
    ))
}

pub fn render_text(form_id: &str, config_json: &str, answers_json: &str) -> String {
    respond_string(
        render_payload(form_id, config_json, answers_json)
            .map(|payload| spec_render_text(&payload)),
    )
}

pub fn render_json_ui(form_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(
        render_payload(form_id, config_json, answers_json)
            .map(|payload| spec_render_json_ui(&payload)),
    )
}

fn with_answers(form: &LoadedForm, answers: AnswerContext) -> Value {
    let mut response = evaluation(form, &answers);
    response["answers"] = answer_map_to_value(&answers.form);
    response
}

/// Record one answer (`null` clears it) and return the recomputed evaluation.
pub fn submit_patch(
    form_id: &str,
    config_json: &str,
    answers_json: &str,
    key: &str,
    value_json: &str,
) -> String {
    respond(ensure_form(form_id, config_json).and_then(|form| {
        let value: Value = serde_json::from_str(value_json).map_err(ComponentError::InputParse)?;
        let mut answers = form.answers(answers_json);
        match value {
            Value::String(text) => answers.set(key, text),
            Value::Null => answers.clear(key),
            _ => return Err(ComponentError::InvalidAnswer(key.to_string())),
        }
        tracing::debug!(form_id = %form.form_id, key = %key, "answer recorded");
        Ok(with_answers(&form, answers))
    }))
}

/// Toggle a sub-type selection and return the recomputed evaluation.
pub fn select_sub_type(
    form_id: &str,
    config_json: &str,
    answers_json: &str,
    sub_type_id: &str,
    selected: bool,
) -> String {
    respond(ensure_form(form_id, config_json).and_then(|form| {
        if form.questionnaire.sub_type(sub_type_id).is_none() {
            return Err(ComponentError::UnknownSubType(sub_type_id.to_string()));
        }
        let mut answers = form.answers(answers_json);
        answers.select_sub_type(sub_type_id, selected);
        Ok(with_answers(&form, answers))
    }))
}

/// Merge reviewer feedback into the form. Malformed feedback leaves the form untouched.
pub fn apply_feedback(form_id: &str, config_json: &str, feedback_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|form| {
        let load = FeedbackLoad::from_json(form_id, feedback_json);
        let reviewed = review(&form.validator, &form.questionnaire, load);
        to_value(&reviewed)
    }))
}

/// Markdown guidance for the next generation pass.
pub fn prompt_guidance(form_id: &str, config_json: &str, feedback_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|form| {
        let feedback = match FeedbackLoad::from_json(form_id, feedback_json) {
            FeedbackLoad::Absent => None,
            FeedbackLoad::Loaded(feedback) => Some(feedback),
            FeedbackLoad::Malformed(err) => return Err(err.into()),
        };
        let guidance = match (&form.definition, &feedback) {
            (Some(definition), _) => PromptGuidance::for_definition(definition, feedback.as_ref()),
            (None, Some(feedback)) => PromptGuidance::from_feedback(feedback),
            (None, None) => PromptGuidance::default(),
        };
        Ok(json!({
            "form_id": form.form_id,
            "markdown": guidance.render()?,
        }))
    }))
}

/// Coverage of the form against rule-coded text nodes.
pub fn audit(form_id: &str, config_json: &str, nodes_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|form| {
        let nodes: Vec<TextNode> =
            serde_json::from_str(nodes_json).map_err(ComponentError::InputParse)?;
        let input = extract_input_rule_codes(&nodes, &form.audit);
        let report = audit_questionnaire(&form.form_id, &input, &form.questionnaire, &form.audit);
        log_coverage_report(&report);
        to_value(&report)
    }))
}
