use serde_json::Value;

/// Controls which bits of state the fill session prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: control prompts only.
    Clean,
    /// Verbose output: status, visible controls, group scores, parse expectations.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints prompts and progress once the component yields a render payload.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
    show_answers_json: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity, show_answers_json: bool) -> Self {
        Self {
            verbosity,
            header_printed: false,
            show_answers_json,
        }
    }

    pub fn show_header(&mut self, payload: &WizardPayload) {
        if self.header_printed {
            return;
        }
        println!("Form: {}", payload.form_id);
        if let Some(reviewed) = &payload.reviewed_at {
            println!("Reviewed: {}", reviewed);
        }
        if !payload.sub_types.is_empty() {
            println!("Sub-types (toggle with ':sub <id> on|off'):");
            for sub_type in &payload.sub_types {
                println!(" - {} ({})", sub_type.label, sub_type.id);
            }
        }
        println!("Commands: yes/no/n/a, ':comment <severity> <text>', ':sub <id> on|off', 'exit'");
        self.header_printed = true;
    }

    pub fn show_status(&self, payload: &WizardPayload) {
        if self.verbosity.is_verbose() {
            println!(
                "Status: {} ({}/{})",
                payload.status.as_str(),
                payload.progress.answered,
                payload.progress.total
            );
            self.print_visible_controls(payload);
        } else if payload.status == RenderStatus::NeedInput && payload.visible_count() == 0 {
            println!("No visible controls are available; check the sub-type selection and rules.");
        }
    }

    fn print_visible_controls(&self, payload: &WizardPayload) {
        println!("Visible controls:");
        for control in payload.controls.iter().filter(|control| control.visible) {
            let mut entry = format!(" - [{}] {} ({})", control.status, control.id, control.label);
            if control.detail_required {
                entry.push_str(" [detail]");
            }
            println!("{}", entry);
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = if prompt.total > 0 {
            format!("{}/{} {}", prompt.index, prompt.total, prompt.label)
        } else {
            format!("{} {}", prompt.index, prompt.label)
        };
        line.push_str(" (yes/no/n/a)");
        println!("{}", line);
        if let Some(group) = &prompt.group {
            println!("Group: {}", group);
        }
        if let Some(note) = &prompt.review_note {
            println!("Reviewer [{}]: {}", note.severity, note.comment);
        }
        if self.verbosity.is_verbose() {
            println!("Control: {}", prompt.control_id);
            if let Some(expected) = &prompt.expected {
                println!("Expected: {}", expected);
            }
        }
    }

    pub fn show_detail_prompt(&self, control: &WizardControl) {
        let label = control
            .detail_label
            .as_deref()
            .unwrap_or("Supporting detail");
        println!("{} (blank to add later)", label);
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if let Some(debug) = &error.debug_message {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_link(&self, link: &WizardLink, outcome: &str) {
        println!("See also: {} -> {} ({})", link.label, link.target, outcome);
    }

    pub fn show_completion(&self, payload: &WizardPayload, answers: &Value) {
        match payload.status {
            RenderStatus::Attention => {
                println!("All visible controls are answered; some need attention:");
                for control in payload.controls.iter().filter(|control| {
                    control.visible && matches!(control.status.as_str(), "error" | "warning")
                }) {
                    println!(" - [{}] {} ({})", control.status, control.id, control.label);
                }
            }
            RenderStatus::NeedInput if payload.visible_count() == 0 => {
                println!("Nothing to answer for the current selection.")
            }
            _ => println!("Done ✅"),
        }
        if self.show_answers_json {
            match serde_json::to_string_pretty(answers) {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => {
                    eprintln!("Failed to serialize answers to JSON: {}", err);
                }
            }
        }
    }
}

/// Render payload extracted from the component output.
pub struct WizardPayload {
    pub form_id: String,
    pub status: RenderStatus,
    pub next_control_id: Option<String>,
    pub progress: RenderProgress,
    pub reviewed_at: Option<String>,
    pub sub_types: Vec<WizardSubType>,
    pub controls: Vec<WizardControl>,
    pub links: Vec<WizardLink>,
}

impl WizardPayload {
    pub fn from_json(json: &Value) -> Result<Self, String> {
        let form_id = json
            .get("form_id")
            .and_then(Value::as_str)
            .ok_or_else(|| "render payload missing form_id".to_string())?
            .to_string();
        let status_str = json
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("need_input");
        let status = RenderStatus::from_label(status_str);
        let next_control_id = json
            .get("next_control_id")
            .and_then(Value::as_str)
            .map(String::from);
        let progress = json
            .get("progress")
            .and_then(Value::as_object)
            .ok_or_else(|| "render payload missing progress".to_string())?;
        let answered = progress
            .get("answered")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let total = progress.get("total").and_then(Value::as_u64).unwrap_or(0) as usize;
        let reviewed_at = json
            .get("review")
            .and_then(|review| review.get("last_updated"))
            .and_then(Value::as_str)
            .map(String::from);

        let sub_types = json
            .get("sub_types")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(WizardSubType::from_json).collect())
            .unwrap_or_default();

        let mut controls = Vec::new();
        let groups = json
            .get("groups")
            .and_then(Value::as_array)
            .ok_or_else(|| "render payload missing groups".to_string())?;
        for group in groups {
            let title = group
                .get("title")
                .and_then(Value::as_str)
                .map(String::from);
            let group_visible = group
                .get("visible")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            for control in group
                .get("controls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let mut control = WizardControl::from_json(control)?;
                control.group = title.clone();
                control.visible &= group_visible;
                controls.push(control);
            }
        }
        for control in json
            .get("ungrouped")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            controls.push(WizardControl::from_json(control)?);
        }

        let links = json
            .get("form_links")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(WizardLink::from_json).collect())
            .unwrap_or_default();

        Ok(Self {
            form_id,
            status,
            next_control_id,
            progress: RenderProgress { answered, total },
            reviewed_at,
            sub_types,
            controls,
            links,
        })
    }

    pub fn visible_count(&self) -> usize {
        self.controls
            .iter()
            .filter(|control| control.visible)
            .count()
    }

    pub fn control(&self, id: &str) -> Option<&WizardControl> {
        self.controls.iter().find(|control| control.id == id)
    }

    pub fn has_sub_type(&self, id: &str) -> bool {
        self.sub_types.iter().any(|sub_type| sub_type.id == id)
    }

    pub fn visible_links(&self) -> impl Iterator<Item = &WizardLink> {
        self.links.iter().filter(|link| link.visible)
    }
}

/// Progress counters from the render payload.
pub struct RenderProgress {
    pub answered: usize,
    pub total: usize,
}

/// Status returned by the renderer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderStatus {
    NeedInput,
    Attention,
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

    pub fn from_label(label: &str) -> Self {
        match label {
            "complete" => RenderStatus::Complete,
            "attention" => RenderStatus::Attention,
            _ => RenderStatus::NeedInput,
        }
    }
}

pub struct WizardSubType {
    pub id: String,
    pub label: String,
}

impl WizardSubType {
    fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            id: value.get("id")?.as_str()?.to_string(),
            label: value.get("label")?.as_str()?.to_string(),
        })
    }
}

pub struct WizardLink {
    pub target: String,
    pub label: String,
    pub visible: bool,
}

impl WizardLink {
    fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            target: value.get("target")?.as_str()?.to_string(),
            label: value.get("label")?.as_str()?.to_string(),
            visible: value.get("visible")?.as_bool()?,
        })
    }
}

pub struct ReviewNote {
    pub severity: String,
    pub comment: String,
}

/// Minimal view of a control used for rendering prompts.
pub struct WizardControl {
    pub id: String,
    pub label: String,
    pub group: Option<String>,
    pub status: String,
    pub visible: bool,
    pub correct_option: Option<String>,
    pub detail_required: bool,
    pub detail_label: Option<String>,
    pub review_note: Option<ReviewNote>,
}

impl WizardControl {
    fn from_json(value: &Value) -> Result<Self, String> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| "control missing id".to_string())?
            .to_string();
        let label = value
            .get("label")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("control '{}' missing label", id))?
            .to_string();
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("pending")
            .to_string();
        let visible = value
            .get("visible")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let correct_option = value
            .get("correct_option")
            .and_then(Value::as_str)
            .map(String::from);
        let detail_required = value
            .get("detail_required")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let detail_label = value
            .get("detail_label")
            .and_then(Value::as_str)
            .map(String::from);
        let review_note = value.get("review_note").and_then(|note| {
            Some(ReviewNote {
                severity: note.get("severity")?.as_str()?.to_string(),
                comment: note.get("comment")?.as_str()?.to_string(),
            })
        });
        Ok(Self {
            id,
            label,
            group: None,
            status,
            visible,
            correct_option,
            detail_required,
            detail_label,
            review_note,
        })
    }

    /// Whether a detail should be collected after `answer`.
    pub fn wants_detail(&self, answer: &str) -> bool {
        self.detail_required && self.correct_option.as_deref() == Some(answer)
    }
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub control_id: String,
    pub label: String,
    pub group: Option<String>,
    pub expected: Option<String>,
    pub review_note: Option<ReviewNote>,
}

impl PromptContext {
    pub fn new(control: &WizardControl, progress: &RenderProgress) -> Self {
        let index = progress.answered + 1;
        Self {
            index: index.max(1),
            total: progress.total,
            control_id: control.id.clone(),
            label: control.label.clone(),
            group: control.group.clone(),
            expected: control.correct_option.clone(),
            review_note: control.review_note.as_ref().map(|note| ReviewNote {
                severity: note.severity.clone(),
                comment: note.comment.clone(),
            }),
        }
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "form_id": "cdd-companies",
            "status": "attention",
            "next_control_id": null,
            "progress": { "answered": 2, "total": 2 },
            "sub_types": [{ "id": "sub-listed", "label": "Listed company", "selected": false }],
            "groups": [{
                "id": "company-identity",
                "title": "Company identification",
                "visible": true,
                "controls": [
                    {
                        "id": "4_3_1",
                        "label": "Verified the company name?",
                        "status": "warning",
                        "visible": true,
                        "correct_option": "Yes",
                        "detail_required": true,
                        "review_note": { "severity": "error", "comment": "Too broad" }
                    }
                ]
            }, {
                "id": "listed-company-checks",
                "title": "Listed company simplified measures",
                "visible": false,
                "controls": [
                    { "id": "4_3_5", "label": "Listing confirmed?", "status": "pending", "visible": true }
                ]
            }],
            "ungrouped": [],
            "form_links": [{ "target": "cdd-trusts", "label": "Trusts", "gated_by": "4_3_6", "visible": true }],
            "review": { "form_id": "cdd-companies", "last_updated": "2026-03-02T09:30:00+00:00" }
        })
    }

    #[test]
    fn payload_flattens_groups_and_hides_gated_controls() {
        let payload = WizardPayload::from_json(&payload()).expect("payload");
        assert_eq!(payload.status, RenderStatus::Attention);
        assert_eq!(payload.controls.len(), 2);
        assert_eq!(payload.visible_count(), 1);
        let control = payload.control("4_3_1").expect("control");
        assert_eq!(control.group.as_deref(), Some("Company identification"));
        assert!(control.wants_detail("Yes"));
        assert!(!control.wants_detail("No"));
        assert!(payload.has_sub_type("sub-listed"));
        assert_eq!(payload.visible_links().count(), 1);
        assert_eq!(
            payload.reviewed_at.as_deref(),
            Some("2026-03-02T09:30:00+00:00")
        );
    }

    #[test]
    fn payload_requires_groups() {
        let mut value = payload();
        value.as_object_mut().expect("object").remove("groups");
        assert!(WizardPayload::from_json(&value).is_err());
    }

    #[test]
    fn prompt_carries_review_note() {
        let payload = WizardPayload::from_json(&payload()).expect("payload");
        let control = payload.control("4_3_1").expect("control");
        let prompt = PromptContext::new(control, &payload.progress);
        assert_eq!(prompt.index, 3);
        assert_eq!(prompt.expected.as_deref(), Some("Yes"));
        assert_eq!(
            prompt.review_note.as_ref().map(|note| note.comment.as_str()),
            Some("Too broad")
        );
    }
}
