use std::collections::BTreeMap;

use handlebars::{Handlebars, no_escape};
use serde::Serialize;
use serde_json::json;

use crate::error::FormError;
use crate::spec::definition::FormDefinition;
use crate::spec::feedback::{ControlNote, FeedbackFile};

const GUIDANCE_TEMPLATE: &str = "\
{{#if architect_notes}}## Architect Notes (Follow these precisely)
{{#each architect_notes}}- {{this}}
{{/each}}
{{/if}}\
{{#if has_feedback}}## Reviewer Feedback (Follow these precisely)
{{#each notes}}- {{this}}
{{/each}}\
{{#each control_notes}}- [{{this.severity}}] {{@key}}: {{this.comment}}
{{/each}}\
{{/if}}";

/// Feedback forwarded to the next generation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct PromptGuidance {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architect_notes: Vec<String>,
    pub notes: Vec<String>,
    /// Warning and error notes only.
    pub control_notes: BTreeMap<String, ControlNote>,
}

impl PromptGuidance {
    pub fn from_feedback(feedback: &FeedbackFile) -> Self {
        Self {
            architect_notes: Vec::new(),
            notes: feedback.notes.clone(),
            control_notes: feedback
                .control_notes
                .iter()
                .filter(|(_, note)| note.severity.is_prompt_guidance())
                .map(|(id, note)| (id.clone(), note.clone()))
                .collect(),
        }
    }

    /// Guidance for regenerating `definition`, with optional reviewer feedback.
    pub fn for_definition(definition: &FormDefinition, feedback: Option<&FeedbackFile>) -> Self {
        let mut guidance = feedback.map(Self::from_feedback).unwrap_or_default();
        guidance.architect_notes = definition.architect_notes.clone();
        guidance
    }

    pub fn is_empty(&self) -> bool {
        self.architect_notes.is_empty() && self.notes.is_empty() && self.control_notes.is_empty()
    }

    /// Render as a markdown section for the generation prompt.
    pub fn render(&self) -> Result<String, FormError> {
        if self.is_empty() {
            return Ok(String::new());
        }
        let mut engine = Handlebars::new();
        engine.register_escape_fn(no_escape);
        engine
            .register_template_string("guidance", GUIDANCE_TEMPLATE)
            .map_err(|err| FormError::TemplateRegistration(Box::new(err)))?;
        let data = json!({
            "architect_notes": self.architect_notes,
            "has_feedback": !self.notes.is_empty() || !self.control_notes.is_empty(),
            "notes": self.notes,
            "control_notes": self.control_notes,
        });
        Ok(engine.render("guidance", &data)?)
    }
}
