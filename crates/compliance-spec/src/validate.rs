use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FormError;
use crate::spec::control::Control;
use crate::spec::form::{FormLink, Questionnaire, SubType};
use crate::spec::group::Group;
use crate::spec::rule::Rule;

pub const DEFAULT_CONTROL_ID_PATTERN: &str = r"^4(_\d+)+(_[a-z])?$";
pub const DEFAULT_GROUP_ID_PATTERN: &str = r"^[a-z][a-z0-9-]*$";

/// Dependent cleanup passes are bounded by the number of record kinds they touch.
const RECORD_KINDS: usize = 3;

static DEFAULT_CONTROL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_CONTROL_ID_PATTERN).expect("valid control id pattern"));
static DEFAULT_GROUP_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_GROUP_ID_PATTERN).expect("valid group id pattern"));

/// Id patterns and grouping policy applied to generated questionnaires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_control_id_pattern")]
    pub control_id_pattern: String,
    #[serde(default = "default_group_id_pattern")]
    pub group_id_pattern: String,
    /// Process forms require every control to name its group.
    #[serde(default = "default_require_group")]
    pub require_group: bool,
}

fn default_control_id_pattern() -> String {
    DEFAULT_CONTROL_ID_PATTERN.to_string()
}

fn default_group_id_pattern() -> String {
    DEFAULT_GROUP_ID_PATTERN.to_string()
}

fn default_require_group() -> bool {
    true
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            control_id_pattern: default_control_id_pattern(),
            group_id_pattern: default_group_id_pattern(),
            require_group: default_require_group(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Questionnaire,
    Control,
    Group,
    Rule,
    SubType,
    FormLink,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordKind::Questionnaire => "questionnaire",
            RecordKind::Control => "control",
            RecordKind::Group => "group",
            RecordKind::Rule => "rule",
            RecordKind::SubType => "sub_type",
            RecordKind::FormLink => "form_link",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MalformedRecord,
    InvalidControlId,
    DuplicateControlId,
    InvalidGroupId,
    DuplicateGroupId,
    MissingGroup,
    UnknownGroup,
    OrphanGroup,
    DanglingRuleTarget,
    DanglingRuleScope,
    InvalidSubTypeId,
    DuplicateSubTypeId,
    DanglingLinkGate,
}

/// A record dropped during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub record: RecordKind,
    pub id: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    fn new(record: RecordKind, id: &str, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            record,
            id: id.to_string(),
            kind,
            message: message.into(),
        }
    }
}

/// Cleaned questionnaire plus everything that was dropped to get there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub questionnaire: Questionnaire,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn dropped(&self, record: RecordKind) -> usize {
        self.violations
            .iter()
            .filter(|violation| violation.record == record)
            .count()
    }

    pub fn has(&self, kind: ViolationKind, id: &str) -> bool {
        self.violations
            .iter()
            .any(|violation| violation.kind == kind && violation.id == id)
    }
}

/// Compiled validation rules.
#[derive(Debug, Clone)]
pub struct Validator {
    control_id: Regex,
    group_id: Regex,
    require_group: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            control_id: DEFAULT_CONTROL_ID.clone(),
            group_id: DEFAULT_GROUP_ID.clone(),
            require_group: true,
        }
    }
}

impl Validator {
    pub fn new(config: &ValidationConfig) -> Result<Self, FormError> {
        Ok(Self {
            control_id: compile(&config.control_id_pattern)?,
            group_id: compile(&config.group_id_pattern)?,
            require_group: config.require_group,
        })
    }

    pub fn is_control_id(&self, id: &str) -> bool {
        self.control_id.is_match(id)
    }

    pub fn is_group_id(&self, id: &str) -> bool {
        self.group_id.is_match(id) && !is_numeric_code(id)
    }

    /// Validate a raw candidate, dropping records that do not deserialize.
    pub fn validate_value(&self, candidate: &Value) -> ValidationReport {
        let (questionnaire, mut violations) = parse_candidate(candidate);
        let mut report = self.validate(&questionnaire);
        violations.append(&mut report.violations);
        report.violations = violations;
        report
    }

    /// Drop invalid controls, groups and sub-types, then rules and form links
    /// whose references no longer resolve. Never fails.
    pub fn validate(&self, questionnaire: &Questionnaire) -> ValidationReport {
        let mut violations = Vec::new();
        let mut controls = Vec::with_capacity(questionnaire.controls.len());
        let mut groups = Vec::with_capacity(questionnaire.groups.len());
        let mut dropped_controls = BTreeSet::new();

        let mut seen = BTreeSet::new();
        for control in &questionnaire.controls {
            if !self.is_control_id(&control.id) {
                violations.push(Violation::new(
                    RecordKind::Control,
                    &control.id,
                    ViolationKind::InvalidControlId,
                    format!("invalid control id '{}'", control.id),
                ));
                dropped_controls.insert(control.id.clone());
            } else if !seen.insert(control.id.as_str()) {
                violations.push(Violation::new(
                    RecordKind::Control,
                    &control.id,
                    ViolationKind::DuplicateControlId,
                    format!("duplicate control id '{}'; first occurrence kept", control.id),
                ));
            } else {
                controls.push(control.clone());
            }
        }

        let mut seen = BTreeSet::new();
        for group in &questionnaire.groups {
            if !self.is_group_id(&group.id) {
                violations.push(Violation::new(
                    RecordKind::Group,
                    &group.id,
                    ViolationKind::InvalidGroupId,
                    format!("invalid group id '{}' (must be a slug)", group.id),
                ));
            } else if !seen.insert(group.id.as_str()) {
                violations.push(Violation::new(
                    RecordKind::Group,
                    &group.id,
                    ViolationKind::DuplicateGroupId,
                    format!("duplicate group id '{}'; first occurrence kept", group.id),
                ));
            } else {
                groups.push(group.clone());
            }
        }

        for _ in 0..RECORD_KINDS {
            let before = (controls.len(), groups.len());
            self.drop_ungrouped_controls(
                &mut controls,
                &groups,
                &mut dropped_controls,
                &mut violations,
            );
            drop_orphan_groups(&controls, &mut groups, &mut violations);
            if (controls.len(), groups.len()) == before {
                break;
            }
        }

        let sub_types = self.retain_valid_sub_types(&questionnaire.sub_scoping, &mut violations);
        let rules = self.retain_resolvable_rules(
            &questionnaire.rules,
            &controls,
            &groups,
            &sub_types,
            &dropped_controls,
            &mut violations,
        );
        let form_links = self.retain_gated_links(
            &questionnaire.form_links,
            &controls,
            &sub_types,
            &dropped_controls,
            &mut violations,
        );

        for violation in &violations {
            log_violation(violation);
        }
        if !violations.is_empty() {
            tracing::info!(
                dropped = violations.len(),
                controls = controls.len(),
                groups = groups.len(),
                rules = rules.len(),
                form_links = form_links.len(),
                "questionnaire validated with structural drops"
            );
        }

        ValidationReport {
            questionnaire: Questionnaire {
                controls,
                groups,
                rules,
                sub_scoping: sub_types,
                form_links,
                review_metadata: questionnaire.review_metadata.clone(),
            },
            violations,
        }
    }

    fn drop_ungrouped_controls(
        &self,
        controls: &mut Vec<Control>,
        groups: &[Group],
        dropped_controls: &mut BTreeSet<String>,
        violations: &mut Vec<Violation>,
    ) {
        controls.retain(|control| {
            let violation = match control.group.as_deref() {
                None if self.require_group => Some(Violation::new(
                    RecordKind::Control,
                    &control.id,
                    ViolationKind::MissingGroup,
                    format!("control '{}' missing 'group' field", control.id),
                )),
                None => None,
                Some(group) if groups.iter().any(|candidate| candidate.id == group) => None,
                Some(group) => Some(Violation::new(
                    RecordKind::Control,
                    &control.id,
                    ViolationKind::UnknownGroup,
                    format!(
                        "control '{}' references unknown group '{}'",
                        control.id, group
                    ),
                )),
            };
            match violation {
                Some(violation) => {
                    dropped_controls.insert(control.id.clone());
                    violations.push(violation);
                    false
                }
                None => true,
            }
        });
    }

    /// Sub-type ids become synthetic answer keys, so they follow the group slug rules.
    fn retain_valid_sub_types(
        &self,
        sub_types: &[SubType],
        violations: &mut Vec<Violation>,
    ) -> Vec<SubType> {
        let mut seen = BTreeSet::new();
        sub_types
            .iter()
            .filter(|sub_type| {
                if !self.is_group_id(&sub_type.id) {
                    violations.push(Violation::new(
                        RecordKind::SubType,
                        &sub_type.id,
                        ViolationKind::InvalidSubTypeId,
                        format!("invalid sub-type id '{}' (must be a slug)", sub_type.id),
                    ));
                    return false;
                }
                if !seen.insert(sub_type.id.as_str()) {
                    violations.push(Violation::new(
                        RecordKind::SubType,
                        &sub_type.id,
                        ViolationKind::DuplicateSubTypeId,
                        format!("duplicate sub-type id '{}'; first occurrence kept", sub_type.id),
                    ));
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }

    /// Rule scopes and link gates resolve to a retained control or sub-type, or to
    /// a well-formed control id answered elsewhere that was not dropped here.
    fn reference_resolves(
        &self,
        reference: &str,
        control_ids: &BTreeSet<&str>,
        sub_types: &[SubType],
        dropped_controls: &BTreeSet<String>,
    ) -> bool {
        control_ids.contains(reference)
            || sub_types.iter().any(|sub_type| sub_type.id == reference)
            || (self.is_control_id(reference) && !dropped_controls.contains(reference))
    }

    fn retain_resolvable_rules(
        &self,
        rules: &[Rule],
        controls: &[Control],
        groups: &[Group],
        sub_types: &[SubType],
        dropped_controls: &BTreeSet<String>,
        violations: &mut Vec<Violation>,
    ) -> Vec<Rule> {
        let control_ids = controls
            .iter()
            .map(|control| control.id.as_str())
            .collect::<BTreeSet<_>>();
        let group_ids = groups
            .iter()
            .map(|group| group.id.as_str())
            .collect::<BTreeSet<_>>();

        rules
            .iter()
            .filter(|rule| {
                let target = rule.target.as_str();
                if !control_ids.contains(target) && !group_ids.contains(target) {
                    violations.push(Violation::new(
                        RecordKind::Rule,
                        target,
                        ViolationKind::DanglingRuleTarget,
                        format!("rule target '{}' does not resolve", target),
                    ));
                    return false;
                }
                let scope = rule.scope.as_str();
                let resolves =
                    self.reference_resolves(scope, &control_ids, sub_types, dropped_controls);
                if !resolves {
                    violations.push(Violation::new(
                        RecordKind::Rule,
                        target,
                        ViolationKind::DanglingRuleScope,
                        format!("rule scope '{}' for '{}' does not resolve", scope, target),
                    ));
                }
                resolves
            })
            .cloned()
            .collect()
    }

    fn retain_gated_links(
        &self,
        links: &[FormLink],
        controls: &[Control],
        sub_types: &[SubType],
        dropped_controls: &BTreeSet<String>,
        violations: &mut Vec<Violation>,
    ) -> Vec<FormLink> {
        let control_ids = controls
            .iter()
            .map(|control| control.id.as_str())
            .collect::<BTreeSet<_>>();

        links
            .iter()
            .filter(|link| {
                let gate = link.gated_by.as_str();
                let resolves =
                    self.reference_resolves(gate, &control_ids, sub_types, dropped_controls);
                if !resolves {
                    violations.push(Violation::new(
                        RecordKind::FormLink,
                        &link.target,
                        ViolationKind::DanglingLinkGate,
                        format!(
                            "link to '{}' is gated by '{}', which does not resolve",
                            link.target, gate
                        ),
                    ));
                }
                resolves
            })
            .cloned()
            .collect()
    }
}

fn drop_orphan_groups(
    controls: &[Control],
    groups: &mut Vec<Group>,
    violations: &mut Vec<Violation>,
) {
    let referenced = controls
        .iter()
        .filter_map(|control| control.group.as_deref())
        .collect::<BTreeSet<_>>();
    groups.retain(|group| {
        if referenced.contains(group.id.as_str()) {
            return true;
        }
        violations.push(Violation::new(
            RecordKind::Group,
            &group.id,
            ViolationKind::OrphanGroup,
            format!(
                "orphan {} group '{}' has no controls referencing it",
                group.variant.as_str(),
                group.id
            ),
        ));
        false
    });
}

/// Validate with the default id patterns.
pub fn validate(questionnaire: &Questionnaire) -> ValidationReport {
    Validator::default().validate(questionnaire)
}

/// Validate a raw JSON candidate with the default id patterns.
pub fn validate_value(candidate: &Value) -> ValidationReport {
    Validator::default().validate_value(candidate)
}

/// Deserialize each record of a raw candidate on its own. Records that fail are
/// reported as `MalformedRecord` and left out; no structural checks are applied.
pub fn parse_candidate(candidate: &Value) -> (Questionnaire, Vec<Violation>) {
    let mut violations = Vec::new();
    if !candidate.is_object() {
        violations.push(Violation::new(
            RecordKind::Questionnaire,
            "<root>",
            ViolationKind::MalformedRecord,
            "questionnaire must be a JSON object",
        ));
    }

    let questionnaire = Questionnaire {
        controls: parse_records(candidate, "controls", RecordKind::Control, &mut violations),
        groups: parse_records(candidate, "groups", RecordKind::Group, &mut violations),
        rules: parse_records(candidate, "rules", RecordKind::Rule, &mut violations),
        sub_scoping: parse_records(
            candidate,
            "sub_scoping",
            RecordKind::SubType,
            &mut violations,
        ),
        form_links: parse_records(
            candidate,
            "form_links",
            RecordKind::FormLink,
            &mut violations,
        ),
        review_metadata: candidate
            .get("_review_metadata")
            .and_then(|value| serde_json::from_value(value.clone()).ok()),
    };

    for violation in &violations {
        log_violation(violation);
    }
    (questionnaire, violations)
}

fn compile(pattern: &str) -> Result<Regex, FormError> {
    Regex::new(pattern).map_err(|source| FormError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn is_numeric_code(id: &str) -> bool {
    id.chars().any(|ch| ch.is_ascii_digit())
        && id
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, '_' | '.' | '-'))
}

fn parse_records<T: DeserializeOwned>(
    candidate: &Value,
    key: &str,
    record: RecordKind,
    violations: &mut Vec<Violation>,
) -> Vec<T> {
    match candidate.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    violations.push(Violation::new(
                        record,
                        record_label(item),
                        ViolationKind::MalformedRecord,
                        format!("malformed {}: {}", record, err),
                    ));
                    None
                }
            })
            .collect(),
        Some(_) => {
            violations.push(Violation::new(
                RecordKind::Questionnaire,
                key,
                ViolationKind::MalformedRecord,
                format!("'{}' must be an array", key),
            ));
            Vec::new()
        }
    }
}

fn record_label(item: &Value) -> &str {
    item.get("id")
        .or_else(|| item.get("target"))
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
}

fn log_violation(violation: &Violation) {
    tracing::warn!(
        record = %violation.record,
        id = %violation.id,
        kind = ?violation.kind,
        "{}",
        violation.message
    );
}
