use std::collections::BTreeMap;

use compliance_spec::coverage::RuleCodes;
use compliance_spec::{
    AuditConfig, Questionnaire, TextNode, apply_feedback, audit_questionnaire,
    extract_input_rule_codes, spec::FeedbackFile, summarize,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "cdd_companies" => include_str!("../tests/fixtures/cdd_companies.json"),
        "text_nodes" => include_str!("../tests/fixtures/text_nodes.json"),
        "feedback" => include_str!("../tests/fixtures/feedback_cdd_companies.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn codes(items: &[&str]) -> RuleCodes {
    items.iter().map(|code| code.to_string()).collect()
}

fn input_codes() -> RuleCodes {
    let nodes: Vec<TextNode> = serde_json::from_str(fixture("text_nodes")).expect("nodes");
    extract_input_rule_codes(&nodes, &AuditConfig::default())
}

#[test]
fn headings_and_blank_codes_are_not_rules() {
    assert_eq!(
        input_codes(),
        codes(&["4.3.1", "4.3.2", "4.3.3", "4.3.4", "4.3.7"])
    );
}

#[test]
fn generated_questionnaire_coverage() {
    let questionnaire: Questionnaire =
        serde_json::from_str(fixture("cdd_companies")).expect("deserialize");
    let report = audit_questionnaire(
        "cdd-companies",
        &input_codes(),
        &questionnaire,
        &AuditConfig::default(),
    );

    assert_eq!(report.mapped, codes(&["4.3.1", "4.3.2", "4.3.3", "4.3.4"]));
    assert_eq!(report.unmapped, codes(&["4.3.7"]));
    assert_eq!(report.extra, codes(&["4.3.5", "4.3.6"]));
    assert_eq!(report.coverage_pct, 80.0);
    assert_eq!(report.total_controls, 6);
    assert_eq!(report.low_confidence, vec!["4_3_3".to_string()]);
    assert_eq!(report.low_confidence_detail[0].confidence, 0.4);

    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["low_confidence_detail"][0]["source-rules"][1], "4.3.4");
}

#[test]
fn reviewer_addition_closes_the_gap() {
    let questionnaire: Questionnaire =
        serde_json::from_str(fixture("cdd_companies")).expect("deserialize");
    let feedback: FeedbackFile = serde_json::from_str(fixture("feedback")).expect("feedback");
    let merged = apply_feedback(&questionnaire, &feedback).questionnaire;

    let report = audit_questionnaire(
        "cdd-companies",
        &input_codes(),
        &merged,
        &AuditConfig::default(),
    );
    assert!(report.unmapped.is_empty());
    assert_eq!(report.coverage_pct, 100.0);

    let audit = summarize(BTreeMap::from([("cdd-companies".to_string(), report)]));
    assert_eq!(audit.summary.processes_audited, 1);
    assert_eq!(audit.summary.overall_coverage_pct, 100.0);
    assert_eq!(audit.summary.total_extra_rules, 2);
}
