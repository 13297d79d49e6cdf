use serde_json::Value;

use compliance_spec::validate::RecordKind;
use compliance_spec::{
    AnswerContext, Questionnaire, ValidationConfig, Validator, ViolationKind, resolve_visibility,
    validate, validate_value,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "cdd_companies" => include_str!("../tests/fixtures/cdd_companies.json"),
        "generated_raw" => include_str!("../tests/fixtures/generated_raw.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

#[test]
fn clean_artifact_passes_untouched() {
    let questionnaire: Questionnaire =
        serde_json::from_str(fixture("cdd_companies")).expect("deserialize");
    let report = validate(&questionnaire);
    assert!(report.is_clean(), "{:?}", report.violations);
    assert_eq!(report.questionnaire, questionnaire);
}

#[test]
fn generated_candidate_is_cleaned_in_dependency_order() {
    let candidate: Value = serde_json::from_str(fixture("generated_raw")).expect("json");
    let report = validate_value(&candidate);

    let cleaned = &report.questionnaire;
    let control_ids = cleaned
        .controls
        .iter()
        .map(|control| control.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(control_ids, vec!["4_1_1"]);
    assert_eq!(cleaned.controls[0].label, "Is the customer's identity verified?");
    let group_ids = cleaned
        .groups
        .iter()
        .map(|group| group.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(group_ids, vec!["intro-checks"]);
    assert_eq!(cleaned.rules.len(), 1);
    assert_eq!(cleaned.rules[0].target, "intro-checks");
    assert_eq!(cleaned.sub_scoping.len(), 1);

    assert!(report.has(ViolationKind::MalformedRecord, "4_1_5"));
    assert!(report.has(ViolationKind::MalformedRecord, "4_1_6"));
    assert!(report.has(ViolationKind::InvalidControlId, "4.1.2"));
    assert!(report.has(ViolationKind::DuplicateControlId, "4_1_1"));
    assert!(report.has(ViolationKind::InvalidGroupId, "4-1"));
    assert!(report.has(ViolationKind::InvalidGroupId, "Bad_Group"));
    assert!(report.has(ViolationKind::UnknownGroup, "4_1_3"));
    assert!(report.has(ViolationKind::MissingGroup, "4_1_4"));
    assert!(report.has(ViolationKind::OrphanGroup, "dotted-only"));
    assert!(report.has(ViolationKind::OrphanGroup, "spare-subprocess"));
    assert!(report.has(ViolationKind::DanglingRuleTarget, "4_1_3"));
    assert!(report.has(ViolationKind::DanglingRuleScope, "4_1_1"));
    assert_eq!(report.dropped(RecordKind::Rule), 3);
    assert_eq!(report.dropped(RecordKind::SubType), 1);
}

#[test]
fn validation_is_stable_on_its_own_output() {
    let candidate: Value = serde_json::from_str(fixture("generated_raw")).expect("json");
    let first = validate_value(&candidate);
    let second = validate(&first.questionnaire);
    assert!(second.is_clean(), "{:?}", second.violations);
    assert_eq!(second.questionnaire, first.questionnaire);
}

#[test]
fn relaxed_grouping_keeps_ungrouped_controls() {
    let candidate: Value = serde_json::from_str(fixture("generated_raw")).expect("json");
    let validator = Validator::new(&ValidationConfig {
        require_group: false,
        ..ValidationConfig::default()
    })
    .expect("validator");
    let report = validator.validate_value(&candidate);
    assert!(report.questionnaire.control("4_1_4").is_some());
    assert!(!report.has(ViolationKind::MissingGroup, "4_1_4"));
    assert!(report.has(ViolationKind::UnknownGroup, "4_1_3"));
}

#[test]
fn invalid_pattern_is_reported() {
    let result = Validator::new(&ValidationConfig {
        control_id_pattern: "^4(".into(),
        ..ValidationConfig::default()
    });
    assert!(result.is_err());
}

#[test]
fn cleaned_artifact_evaluates_without_dangling_references() {
    let candidate: Value = serde_json::from_str(fixture("generated_raw")).expect("json");
    let cleaned = validate_value(&candidate).questionnaire;

    let mut answers = AnswerContext::default();
    let hidden = resolve_visibility(&cleaned, &answers);
    assert!(!hidden.group_visible("intro-checks"));
    assert!(!hidden.control_visible("4_1_1"));

    answers.intro.insert("4_0_1".into(), "Yes".into());
    let shown = resolve_visibility(&cleaned, &answers);
    assert!(shown.group_visible("intro-checks"));
    assert!(shown.control_visible("4_1_1"));
}
