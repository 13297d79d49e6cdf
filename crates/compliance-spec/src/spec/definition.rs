use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::answers::AnswerContext;
use crate::spec::form::{FormLink, Questionnaire, SubType};
use crate::spec::rule::Rule;
use crate::visibility::is_visible;

/// Static description of one process form, owned by the operator rather than the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormDefinition {
    pub id: String,
    pub title: String,
    /// Regulation sections whose text nodes feed this form.
    #[serde(default)]
    pub source_groups: Vec<String>,
    /// Intro answer key that must be `Yes` for the form to apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gated_by: Option<String>,
    #[serde(default)]
    pub sub_types: Vec<SubType>,
    #[serde(default)]
    pub form_links: Vec<FormLink>,
    /// Group slugs the generator is asked to mark as `subprocess`.
    #[serde(default)]
    pub subprocess_groups: Vec<String>,
    #[serde(default)]
    pub architect_notes: Vec<String>,
}

impl FormDefinition {
    /// SHOW rule gating the whole form on its intro answer.
    pub fn gate_rule(&self) -> Option<Rule> {
        self.gated_by
            .as_ref()
            .map(|scope| Rule::show(self.id.clone(), scope.clone(), "Yes"))
    }

    pub fn is_form_visible(&self, answers: &AnswerContext) -> bool {
        let rules = self.gate_rule().into_iter().collect::<Vec<_>>();
        is_visible(&self.id, &rules, answers)
    }
}

/// Replace generator-supplied sub-types and form links with the definition's.
pub fn inject_static_fields(
    mut questionnaire: Questionnaire,
    definition: &FormDefinition,
) -> Questionnaire {
    questionnaire.sub_scoping = definition.sub_types.clone();
    questionnaire.form_links = definition.form_links.clone();
    questionnaire
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cdd_individuals() -> FormDefinition {
        FormDefinition {
            id: "cdd-individuals".into(),
            title: "Customer Due Diligence - Individuals".into(),
            source_groups: vec!["4_2".into()],
            gated_by: Some("4_1_4_1".into()),
            sub_types: vec![SubType {
                id: "sub-individual".into(),
                label: "Individuals".into(),
            }],
            form_links: vec![FormLink {
                target: "verification-documents".into(),
                label: "Documentary Safe Harbour".into(),
                gated_by: "4_2_10".into(),
            }],
            subprocess_groups: vec![],
            architect_notes: vec!["Do not generate a scope gate question.".into()],
        }
    }

    #[test]
    fn static_fields_override_generator_output() {
        let generated = Questionnaire {
            sub_scoping: vec![SubType {
                id: "sub-invented".into(),
                label: "Invented".into(),
            }],
            ..Default::default()
        };
        let injected = inject_static_fields(generated, &cdd_individuals());
        assert_eq!(injected.sub_scoping.len(), 1);
        assert_eq!(injected.sub_scoping[0].id, "sub-individual");
        assert_eq!(injected.form_links[0].target, "verification-documents");
    }

    #[test]
    fn gated_form_follows_intro_answer() {
        let definition = cdd_individuals();
        let mut answers = AnswerContext::default();
        assert!(!definition.is_form_visible(&answers));
        answers.intro.insert("4_1_4_1".into(), "Yes".into());
        assert!(definition.is_form_visible(&answers));
    }

    #[test]
    fn ungated_form_is_always_visible() {
        let definition = FormDefinition {
            gated_by: None,
            ..cdd_individuals()
        };
        assert!(definition.gate_rule().is_none());
        assert!(definition.is_form_visible(&AnswerContext::default()));
    }
}
