use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::control::Control;
use crate::spec::feedback::ControlNote;
use crate::spec::group::Group;
use crate::spec::rule::Rule;

/// Customer-category toggle recorded as a synthetic answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubType {
    pub id: String,
    pub label: String,
}

/// Static reference to another questionnaire, shown when `gated_by` is answered `Yes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FormLink {
    pub target: String,
    pub label: String,
    pub gated_by: String,
}

/// Review state attached to a merged questionnaire. Never forwarded to generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewMetadata {
    pub form_id: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub control_notes: BTreeMap<String, ControlNote>,
}

/// Questionnaire artifact as produced by generation and consumed at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Questionnaire {
    #[serde(default)]
    pub controls: Vec<Control>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_scoping: Vec<SubType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub form_links: Vec<FormLink>,
    #[serde(
        rename = "_review_metadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub review_metadata: Option<ReviewMetadata>,
}

impl Questionnaire {
    pub fn control(&self, id: &str) -> Option<&Control> {
        self.controls.iter().find(|control| control.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == id)
    }

    /// Controls whose `group` equals `group_id` exactly.
    pub fn controls_in_group<'a>(
        &'a self,
        group_id: &'a str,
    ) -> impl Iterator<Item = &'a Control> {
        self.controls
            .iter()
            .filter(move |control| control.group.as_deref() == Some(group_id))
    }

    /// Controls without a group, only present when grouping is not enforced.
    pub fn ungrouped_controls(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter().filter(|control| control.group.is_none())
    }

    pub fn rules_for<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a Rule> {
        self.rules.iter().filter(move |rule| rule.target == target)
    }

    pub fn sub_type(&self, id: &str) -> Option<&SubType> {
        self.sub_scoping.iter().find(|sub_type| sub_type.id == id)
    }

    /// Copy without review metadata, as sent to the generator.
    pub fn without_review_metadata(&self) -> Questionnaire {
        Questionnaire {
            review_metadata: None,
            ..self.clone()
        }
    }
}
