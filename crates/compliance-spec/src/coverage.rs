use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::spec::control::Control;
use crate::spec::form::Questionnaire;

pub type RuleCodes = BTreeSet<String>;

/// Rule-coded text node as produced by the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TextNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_index: Option<usize>,
    #[serde(default)]
    pub rule_code: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,
    /// Codes starting with any of these are section headings, not rules.
    #[serde(default = "default_ignored_code_prefixes")]
    pub ignored_code_prefixes: Vec<String>,
}

fn default_low_confidence_threshold() -> f64 {
    0.5
}

fn default_ignored_code_prefixes() -> Vec<String> {
    vec!["Part ".to_string()]
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: default_low_confidence_threshold(),
            ignored_code_prefixes: default_ignored_code_prefixes(),
        }
    }
}

/// Rule codes present in the source text.
pub fn extract_input_rule_codes(nodes: &[TextNode], config: &AuditConfig) -> RuleCodes {
    nodes
        .iter()
        .map(|node| node.rule_code.trim())
        .filter(|code| !code.is_empty())
        .filter(|code| {
            !config
                .ignored_code_prefixes
                .iter()
                .any(|prefix| code.starts_with(prefix.as_str()))
        })
        .map(str::to_string)
        .collect()
}

/// Rule codes claimed through `source-rules` by any control.
pub fn extract_output_rule_codes<'a>(
    controls: impl IntoIterator<Item = &'a Control>,
) -> RuleCodes {
    controls
        .into_iter()
        .flat_map(|control| control.source_rules.iter().cloned())
        .collect()
}

/// Set algebra between source and claimed codes. The three sets are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CodeDiff {
    pub mapped: RuleCodes,
    pub unmapped: RuleCodes,
    /// Claimed but absent from the source; the strongest hallucination signal.
    pub extra: RuleCodes,
}

pub fn diff_codes(input: &RuleCodes, output: &RuleCodes) -> CodeDiff {
    CodeDiff {
        mapped: input.intersection(output).cloned().collect(),
        unmapped: input.difference(output).cloned().collect(),
        extra: output.difference(input).cloned().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowConfidenceControl {
    pub id: String,
    pub label: String,
    pub confidence: f64,
    #[serde(rename = "source-rules")]
    pub source_rules: RuleCodes,
}

/// Coverage of one questionnaire against its source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub process_id: String,
    pub input_codes: RuleCodes,
    pub mapped: RuleCodes,
    pub unmapped: RuleCodes,
    pub extra: RuleCodes,
    pub coverage_pct: f64,
    pub total_input: usize,
    pub total_mapped: usize,
    pub total_unmapped: usize,
    pub total_controls: usize,
    pub low_confidence: Vec<String>,
    pub low_confidence_detail: Vec<LowConfidenceControl>,
}

impl CoverageReport {
    /// Codes claimed by the questionnaire's controls.
    pub fn output_codes(&self) -> RuleCodes {
        self.mapped.union(&self.extra).cloned().collect()
    }

    pub fn is_complete(&self) -> bool {
        self.unmapped.is_empty() && self.extra.is_empty()
    }
}

pub fn audit_questionnaire(
    process_id: &str,
    input_codes: &RuleCodes,
    questionnaire: &Questionnaire,
    config: &AuditConfig,
) -> CoverageReport {
    let output_codes = extract_output_rule_codes(&questionnaire.controls);
    let diff = diff_codes(input_codes, &output_codes);

    let mut low_confidence_detail = questionnaire
        .controls
        .iter()
        .filter(|control| control.is_low_confidence(config.low_confidence_threshold))
        .map(|control| LowConfidenceControl {
            id: control.id.clone(),
            label: control.label.clone(),
            confidence: control.mapping_confidence.unwrap_or_default(),
            source_rules: control.source_rules.clone(),
        })
        .collect::<Vec<_>>();
    low_confidence_detail.sort_by(|left, right| left.id.cmp(&right.id));

    CoverageReport {
        process_id: process_id.to_string(),
        input_codes: input_codes.clone(),
        coverage_pct: coverage_pct(diff.mapped.len(), input_codes.len()),
        total_input: input_codes.len(),
        total_mapped: diff.mapped.len(),
        total_unmapped: diff.unmapped.len(),
        total_controls: questionnaire.controls.len(),
        low_confidence: low_confidence_detail
            .iter()
            .map(|entry| entry.id.clone())
            .collect(),
        low_confidence_detail,
        mapped: diff.mapped,
        unmapped: diff.unmapped,
        extra: diff.extra,
    }
}

/// Aggregate over every audited questionnaire; shared codes count once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub overall_coverage_pct: f64,
    pub total_input_rules: usize,
    pub total_mapped_rules: usize,
    pub total_unmapped_rules: usize,
    pub total_extra_rules: usize,
    pub total_low_confidence_controls: usize,
    pub processes_audited: usize,
    pub mapped: RuleCodes,
    pub unmapped: RuleCodes,
    pub extra: RuleCodes,
}

/// Contents of `_coverage_audit.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageAudit {
    pub summary: CoverageSummary,
    pub processes: BTreeMap<String, CoverageReport>,
}

pub fn summarize(processes: BTreeMap<String, CoverageReport>) -> CoverageAudit {
    let input = processes
        .values()
        .flat_map(|report| report.input_codes.iter().cloned())
        .collect::<RuleCodes>();
    let output = processes
        .values()
        .flat_map(|report| report.output_codes())
        .collect::<RuleCodes>();
    let diff = diff_codes(&input, &output);
    let low_confidence = processes
        .values()
        .map(|report| report.low_confidence.len())
        .sum::<usize>();

    CoverageAudit {
        summary: CoverageSummary {
            overall_coverage_pct: coverage_pct(diff.mapped.len(), input.len()),
            total_input_rules: input.len(),
            total_mapped_rules: diff.mapped.len(),
            total_unmapped_rules: diff.unmapped.len(),
            total_extra_rules: diff.extra.len(),
            total_low_confidence_controls: low_confidence,
            processes_audited: processes.len(),
            mapped: diff.mapped,
            unmapped: diff.unmapped,
            extra: diff.extra,
        },
        processes,
    }
}

fn coverage_pct(mapped: usize, input: usize) -> f64 {
    if input == 0 {
        return 100.0;
    }
    (mapped as f64 / input as f64 * 1000.0).round() / 10.0
}

/// Log a report at info when coverage is healthy, warn otherwise.
pub fn log_coverage_report(report: &CoverageReport) {
    let pid = report.process_id.as_str();
    if report.coverage_pct >= 90.0 && report.unmapped.is_empty() {
        tracing::info!(
            process = pid,
            "coverage: {}% ({}/{} rules mapped)",
            report.coverage_pct,
            report.total_mapped,
            report.total_input
        );
    } else {
        tracing::warn!(
            process = pid,
            "coverage: {}% ({}/{} rules mapped)",
            report.coverage_pct,
            report.total_mapped,
            report.total_input
        );
    }
    if !report.unmapped.is_empty() {
        tracing::warn!(
            process = pid,
            "UNMAPPED ({}): {}",
            report.unmapped.len(),
            join(&report.unmapped)
        );
    }
    if !report.extra.is_empty() {
        tracing::warn!(
            process = pid,
            "EXTRA ({}): {}",
            report.extra.len(),
            join(&report.extra)
        );
    }
    for entry in &report.low_confidence_detail {
        tracing::warn!(
            process = pid,
            "LOW CONFIDENCE {} (conf={}): {}",
            entry.id,
            entry.confidence,
            entry.label
        );
    }
}

fn join(codes: &RuleCodes) -> String {
    codes.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::CorrectOption;

    fn codes(values: &[&str]) -> RuleCodes {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn control(id: &str, rules: &[&str], confidence: f64) -> Control {
        Control {
            id: id.into(),
            label: format!("Q {id}?"),
            detail_required: false,
            correct_option: Some(CorrectOption::Yes),
            detail_label: None,
            process_id: None,
            source_rules: codes(rules),
            mapping_confidence: Some(confidence),
            group: Some("collection-kyc".into()),
        }
    }

    #[test]
    fn set_algebra_matches_reference_scenario() {
        let diff = diff_codes(&codes(&["4.1", "4.2", "4.3"]), &codes(&["4.1", "4.4"]));
        assert_eq!(diff.mapped, codes(&["4.1"]));
        assert_eq!(diff.unmapped, codes(&["4.2", "4.3"]));
        assert_eq!(diff.extra, codes(&["4.4"]));
    }

    #[test]
    fn set_algebra_partitions_inputs_and_outputs() {
        let cases = [
            (codes(&[]), codes(&[])),
            (codes(&["4.1"]), codes(&[])),
            (codes(&[]), codes(&["4.1"])),
            (codes(&["4.1", "4.2"]), codes(&["4.2", "4.3"])),
        ];
        for (input, output) in cases {
            let diff = diff_codes(&input, &output);
            let left = diff.mapped.union(&diff.unmapped).cloned().collect::<RuleCodes>();
            let right = diff.mapped.union(&diff.extra).cloned().collect::<RuleCodes>();
            assert_eq!(left, input);
            assert_eq!(right, output);
            assert!(diff.mapped.is_disjoint(&diff.unmapped));
            assert!(diff.mapped.is_disjoint(&diff.extra));
        }
    }

    #[test]
    fn headings_and_blank_codes_are_not_rules() {
        let nodes = ["Part 4.2", "", " 4.2.1 ", "4.2.2", "4.2.2"]
            .into_iter()
            .map(|code| TextNode {
                rule_code: code.into(),
                ..Default::default()
            })
            .collect::<Vec<_>>();
        let input = extract_input_rule_codes(&nodes, &AuditConfig::default());
        assert_eq!(input, codes(&["4.2.1", "4.2.2"]));
    }

    #[test]
    fn partial_coverage_report() {
        let questionnaire = Questionnaire {
            controls: vec![
                control("4_2_1", &["4.2.1", "4.9.9"], 0.9),
                control("4_2_3", &[], 0.4),
            ],
            ..Default::default()
        };
        let report = audit_questionnaire(
            "cdd-individuals",
            &codes(&["4.2.1", "4.2.2", "4.2.3"]),
            &questionnaire,
            &AuditConfig::default(),
        );
        assert_eq!(report.total_mapped, 1);
        assert_eq!(report.total_unmapped, 2);
        assert_eq!(report.coverage_pct, 33.3);
        assert_eq!(report.extra, codes(&["4.9.9"]));
        assert_eq!(report.low_confidence, vec!["4_2_3".to_string()]);
        assert_eq!(report.low_confidence_detail[0].confidence, 0.4);
        assert_eq!(report.total_controls, 2);
    }

    #[test]
    fn empty_source_is_fully_covered() {
        let report = audit_questionnaire(
            "empty",
            &RuleCodes::new(),
            &Questionnaire::default(),
            &AuditConfig::default(),
        );
        assert_eq!(report.coverage_pct, 100.0);
        assert!(report.is_complete());
    }

    #[test]
    fn report_is_byte_identical_regardless_of_control_order() {
        let forward = Questionnaire {
            controls: vec![
                control("4_2_1", &["4.2.1"], 0.3),
                control("4_2_2", &["4.2.2"], 0.2),
            ],
            ..Default::default()
        };
        let mut reversed = forward.clone();
        reversed.controls.reverse();
        let input = codes(&["4.2.2", "4.2.1"]);
        let config = AuditConfig::default();
        let first = serde_json::to_string(&audit_questionnaire("f", &input, &forward, &config))
            .expect("encode");
        let second = serde_json::to_string(&audit_questionnaire("f", &input, &reversed, &config))
            .expect("encode");
        assert_eq!(first, second);
    }

    #[test]
    fn summary_counts_shared_codes_once() {
        let config = AuditConfig::default();
        let a = audit_questionnaire(
            "a",
            &codes(&["4.1.1", "4.1.2"]),
            &Questionnaire {
                controls: vec![control("4_1_1", &["4.1.1"], 0.9)],
                ..Default::default()
            },
            &config,
        );
        let b = audit_questionnaire(
            "b",
            &codes(&["4.1.2", "4.1.3"]),
            &Questionnaire {
                controls: vec![control("4_1_2", &["4.1.2", "4.7.7"], 0.45)],
                ..Default::default()
            },
            &config,
        );
        let audit = summarize(BTreeMap::from([("a".to_string(), a), ("b".to_string(), b)]));
        assert_eq!(audit.summary.total_input_rules, 3);
        assert_eq!(audit.summary.mapped, codes(&["4.1.1", "4.1.2"]));
        assert_eq!(audit.summary.unmapped, codes(&["4.1.3"]));
        assert_eq!(audit.summary.extra, codes(&["4.7.7"]));
        assert_eq!(audit.summary.total_low_confidence_controls, 1);
        assert_eq!(audit.summary.processes_audited, 2);
        assert_eq!(audit.summary.overall_coverage_pct, 66.7);
    }
}
