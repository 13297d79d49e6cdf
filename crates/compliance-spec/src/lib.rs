#![allow(missing_docs)]

pub mod answers;
pub mod autosave;
pub mod coverage;
pub mod error;
pub mod feedback;
pub mod links;
pub mod render;
pub mod schema;
pub mod scoring;
pub mod spec;
pub mod status;
pub mod validate;
pub mod visibility;

pub use answers::{AnswerContext, AnswerMap, answer_map_from_value, answer_map_to_value};
pub use autosave::{AutosaveConfig, Debouncer, FeedbackAutosave, FlushReport};
pub use coverage::{
    AuditConfig, CoverageAudit, CoverageReport, TextNode, audit_questionnaire,
    extract_input_rule_codes, log_coverage_report, summarize,
};
pub use error::FormError;
pub use feedback::{
    FeedbackLoad, FeedbackStatus, FeedbackStore, MergeOutcome, PromptGuidance,
    ReviewedQuestionnaire, apply_feedback, apply_feedback_with, review,
};
pub use links::{DirectoryLoader, FetchDecision, LinkCache, LinkLoader, LinkState};
pub use render::{
    RenderControl, RenderGroup, RenderPayload, RenderProgress, RenderStatus,
    build_render_payload, render_json_ui, render_text,
};
pub use schema::{SchemaKind, generate as artifact_schema};
pub use scoring::{GroupScore, score_group};
pub use spec::{
    Control, CorrectOption, FeedbackFile, FeedbackSeverity, FormDefinition, Group,
    GroupVariant, Questionnaire, Rule, RuleEffect, inject_static_fields,
};
pub use status::{ControlStatus, control_status};
pub use validate::{
    ValidationConfig, ValidationReport, Validator, Violation, ViolationKind, parse_candidate,
    validate, validate_value,
};
pub use visibility::{Visibility, VisibilityMap, is_visible, resolve_visibility};
