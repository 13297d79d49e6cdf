use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use compliance_spec::{
    AuditConfig, CoverageAudit, CoverageReport, FeedbackLoad, FormDefinition, FormError,
    Questionnaire, TextNode, Validator, Violation, audit_questionnaire, extract_input_rule_codes,
    feedback::FeedbackStatus, inject_static_fields, log_coverage_report, parse_candidate, review,
    summarize,
};

/// File holding the coverage audit next to the built forms.
pub const COVERAGE_AUDIT_FILE: &str = "_coverage_audit.json";

/// Everything needed to turn one generated candidate into a published form.
pub struct BuildInput {
    pub definition: FormDefinition,
    pub candidate: Value,
    pub nodes: Vec<TextNode>,
    pub feedback: FeedbackLoad,
}

/// Output of the build pipeline for a single form.
pub struct BuiltForm {
    pub form_id: String,
    pub questionnaire: Questionnaire,
    pub violations: Vec<Violation>,
    pub feedback: FeedbackStatus,
    pub coverage: CoverageReport,
}

/// Inject operator-owned fields, validate, merge feedback, then audit coverage.
///
/// Sub-types come from the definition before validation so rules scoped on
/// them resolve.
pub fn build_form(input: BuildInput, validator: &Validator, audit: &AuditConfig) -> BuiltForm {
    let (parsed, mut violations) = parse_candidate(&input.candidate);
    let injected = inject_static_fields(parsed, &input.definition);
    let report = validator.validate(&injected);
    violations.extend(report.violations);

    let reviewed = review(validator, &report.questionnaire, input.feedback);
    violations.extend(reviewed.violations);

    let input_codes = extract_input_rule_codes(&input.nodes, audit);
    let coverage = audit_questionnaire(
        &input.definition.id,
        &input_codes,
        &reviewed.questionnaire,
        audit,
    );
    log_coverage_report(&coverage);

    BuiltForm {
        form_id: input.definition.id,
        questionnaire: reviewed.questionnaire,
        violations,
        feedback: reviewed.status,
        coverage,
    }
}

/// Write `<form_id>.json` and fold its coverage into the directory's audit file.
pub fn write_form(built: &BuiltForm, out_root: &Path) -> Result<PathBuf, FormError> {
    fs::create_dir_all(out_root).map_err(|source| FormError::Io {
        path: out_root.to_path_buf(),
        source,
    })?;
    let artifact_path = form_path(out_root, &built.form_id);
    write_json(&artifact_path, &built.questionnaire)?;

    let audit_path = out_root.join(COVERAGE_AUDIT_FILE);
    let mut processes = read_audit(&audit_path)
        .map(|audit| audit.processes)
        .unwrap_or_default();
    processes.insert(built.form_id.clone(), built.coverage.clone());
    write_json(&audit_path, &summarize(processes))?;

    Ok(artifact_path)
}

/// Where `write_form` puts the artifact for `form_id`.
pub fn form_path(out_root: &Path, form_id: &str) -> PathBuf {
    out_root.join(format!("{}.json", sanitize_file_name(form_id)))
}

/// Previously written audit, if one exists and parses.
pub fn read_audit(path: &Path) -> Option<CoverageAudit> {
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(audit) => Some(audit),
        Err(err) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable coverage audit: {}", err);
            None
        }
    }
}

/// Audit every form in `forms_dir` that has matching text nodes.
pub fn audit_directory(
    forms_dir: &Path,
    nodes: &BTreeMap<String, Vec<TextNode>>,
    audit: &AuditConfig,
    include: impl Fn(&str) -> bool,
) -> Result<CoverageAudit, FormError> {
    let mut processes = BTreeMap::new();
    for (form_id, path) in list_forms(forms_dir)? {
        if !include(&form_id) {
            continue;
        }
        let Some(form_nodes) = nodes.get(&form_id) else {
            tracing::warn!(form_id = %form_id, "no text nodes for form; skipped");
            continue;
        };
        let contents = fs::read_to_string(&path).map_err(|source| FormError::Io {
            path: path.clone(),
            source,
        })?;
        let questionnaire: Questionnaire =
            serde_json::from_str(&contents).map_err(FormError::ArtifactParse)?;
        let input_codes = extract_input_rule_codes(form_nodes, audit);
        let report = audit_questionnaire(&form_id, &input_codes, &questionnaire, audit);
        log_coverage_report(&report);
        processes.insert(form_id, report);
    }
    Ok(summarize(processes))
}

/// `(form_id, path)` for every `*.json` form file, skipping `_`-prefixed reports.
pub fn list_forms(dir: &Path) -> Result<Vec<(String, PathBuf)>, FormError> {
    let entries = fs::read_dir(dir).map_err(|source| FormError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut forms = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?.to_string();
            (!stem.starts_with('_')).then_some((stem, path))
        })
        .collect::<Vec<_>>();
    forms.sort();
    Ok(forms)
}

fn sanitize_file_name(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "form".into()
    } else {
        cleaned
    }
}

pub fn write_json(path: &Path, value: &impl Serialize) -> Result<(), FormError> {
    let contents = serde_json::to_string_pretty(value).map_err(FormError::JsonEncode)?;
    fs::write(path, contents).map_err(|source| FormError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_spec::{
        ViolationKind,
        spec::{FormLink, SubType},
    };
    use tempfile::TempDir;

    const GENERATED: &str = include_str!("../../compliance-spec/tests/fixtures/generated_raw.json");
    const FEEDBACK: &str =
        include_str!("../../compliance-spec/tests/fixtures/feedback_cdd_companies.json");

    fn definition() -> FormDefinition {
        FormDefinition {
            id: "cdd-intro".into(),
            title: "Introductory due diligence".into(),
            source_groups: vec!["4_1".into()],
            gated_by: None,
            sub_types: vec![SubType {
                id: "sub-retail".into(),
                label: "Retail customer".into(),
            }],
            form_links: vec![FormLink {
                target: "cdd-companies".into(),
                label: "Company customers".into(),
                gated_by: "4_1_1".into(),
            }],
            subprocess_groups: vec![],
            architect_notes: vec![],
        }
    }

    fn nodes(codes: &[&str]) -> Vec<TextNode> {
        let nodes = codes
            .iter()
            .map(|code| serde_json::json!({ "rule_code": code, "text": "rule text" }))
            .collect::<Vec<_>>();
        serde_json::from_value(Value::Array(nodes)).expect("nodes")
    }

    fn build(feedback: FeedbackLoad) -> BuiltForm {
        build_form(
            BuildInput {
                definition: definition(),
                candidate: serde_json::from_str(GENERATED).expect("candidate"),
                nodes: nodes(&["4.1.1", "4.1.9"]),
                feedback,
            },
            &Validator::default(),
            &AuditConfig::default(),
        )
    }

    #[test]
    fn definition_sub_types_keep_their_rules() {
        let built = build(FeedbackLoad::Absent);
        let questionnaire = &built.questionnaire;

        assert_eq!(questionnaire.sub_scoping, definition().sub_types);
        assert_eq!(questionnaire.form_links, definition().form_links);
        assert!(
            questionnaire
                .rules
                .iter()
                .any(|rule| rule.target == "4_1_1" && rule.scope == "sub-retail")
        );
        let dangling_scopes = built
            .violations
            .iter()
            .filter(|violation| violation.kind == ViolationKind::DanglingRuleScope)
            .count();
        assert_eq!(dangling_scopes, 1);
        assert!(matches!(built.feedback, FeedbackStatus::Absent));

        assert_eq!(built.coverage.coverage_pct, 50.0);
        assert!(built.coverage.unmapped.contains("4.1.9"));
    }

    #[test]
    fn malformed_feedback_is_reported_not_applied() {
        let built = build(FeedbackLoad::from_json("cdd-intro", "{ not json"));
        assert!(matches!(
            built.feedback,
            FeedbackStatus::ParseFailed { .. }
        ));
        assert!(built.questionnaire.review_metadata.is_none());
    }

    #[test]
    fn write_form_accumulates_audit_entries() {
        let dir = TempDir::new().expect("temp dir");
        let first = build(FeedbackLoad::Absent);
        let path = write_form(&first, dir.path()).expect("write");
        assert_eq!(path, dir.path().join("cdd-intro.json"));

        let mut second = build(FeedbackLoad::Absent);
        second.form_id = "cdd-intro-copy".into();
        second.coverage.process_id = "cdd-intro-copy".into();
        write_form(&second, dir.path()).expect("write");

        let audit = read_audit(&dir.path().join(COVERAGE_AUDIT_FILE)).expect("audit");
        assert_eq!(audit.summary.processes_audited, 2);
        assert_eq!(audit.summary.overall_coverage_pct, 50.0);

        let forms = list_forms(dir.path()).expect("list");
        let ids = forms.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["cdd-intro", "cdd-intro-copy"]);
    }

    #[test]
    fn audit_directory_respects_filter_and_missing_nodes() {
        let dir = TempDir::new().expect("temp dir");
        write_form(&build(FeedbackLoad::Absent), dir.path()).expect("write");
        let feedback_form: Value = serde_json::from_str(FEEDBACK).expect("feedback");
        // Not a questionnaire, but filtered out before it is read.
        write_json(&dir.path().join("skipped.json"), &feedback_form).expect("write");

        let nodes = BTreeMap::from([("cdd-intro".to_string(), nodes(&["4.1.1"]))]);
        let audit = audit_directory(dir.path(), &nodes, &AuditConfig::default(), |id| {
            id.starts_with("cdd-")
        })
        .expect("audit");
        assert_eq!(audit.summary.processes_audited, 1);
        assert_eq!(audit.processes["cdd-intro"].coverage_pct, 100.0);
    }

    #[test]
    fn file_names_are_sanitised() {
        assert_eq!(sanitize_file_name("cdd/companies v2"), "cdd-companies-v2");
        assert_eq!(sanitize_file_name(""), "form");
    }
}
