pub mod builder;

mod logging;
mod wizard;

use builder::{
    BuildInput, COVERAGE_AUDIT_FILE, audit_directory, build_form, form_path, write_form,
    write_json,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use component_compliance::{render_json_ui, render_text, select_sub_type, submit_patch};
use compliance_spec::{
    AuditConfig, AutosaveConfig, CoverageAudit, DirectoryLoader, FeedbackAutosave, FeedbackLoad,
    FeedbackStatus, FeedbackStore, FlushReport, FormDefinition, LinkCache, LinkState,
    SchemaKind, TextNode, Validator, Violation, artifact_schema, review,
    spec::{Control, ControlNote, FeedbackFile, FeedbackSeverity, detail_key},
};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use wizard::{AnswerParseError, PromptContext, Verbosity, WizardPayload, WizardPresenter};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const OUTPUT_DIR_ENV: &str = "COMPLIANCE_QA_OUTPUT_DIR";
const ALLOWED_ROOTS_ENV: &str = "COMPLIANCE_QA_ALLOWED_ROOTS";
const FEEDBACK_DIR_ENV: &str = "COMPLIANCE_QA_FEEDBACK_DIR";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Compliance questionnaire review CLI",
    long_about = "Validates generated questionnaires, audits rule coverage, merges reviewer feedback and runs fill sessions backed by the compliance component"
)]
struct Cli {
    /// Debug-level logs on stderr (COMPLIANCE_QA_LOG overrides).
    #[arg(long, global = true, alias = "debug")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a questionnaire artifact and list every dropped record.
    Validate {
        #[arg(long, value_name = "ARTIFACT")]
        artifact: PathBuf,
        /// Fail when any record was dropped.
        #[arg(long)]
        strict: bool,
        /// Write the cleaned artifact here.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Validate a generated candidate, inject static fields, merge feedback and audit coverage.
    Build {
        /// Raw generator output (JSON).
        #[arg(long, value_name = "CANDIDATE")]
        input: PathBuf,
        /// Process form definition (JSON).
        #[arg(long, value_name = "DEFINITION")]
        definition: PathBuf,
        /// JSON array of text nodes for this form.
        #[arg(long, value_name = "NODES")]
        nodes: Option<PathBuf>,
        /// Output directory (defaults to COMPLIANCE_QA_OUTPUT_DIR or the current directory).
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
        /// Feedback directory (defaults to COMPLIANCE_QA_FEEDBACK_DIR).
        #[arg(long, value_name = "DIR")]
        feedback_dir: Option<PathBuf>,
        /// Overwrite an existing artifact.
        #[arg(long)]
        force: bool,
    },
    /// Audit every form in a directory against its text nodes.
    Audit {
        #[arg(long, value_name = "DIR")]
        forms: PathBuf,
        /// JSON object mapping form id to its text nodes.
        #[arg(long, value_name = "NODES")]
        nodes: PathBuf,
        /// Only audit form ids matching these globs.
        #[arg(long, value_name = "GLOB")]
        only: Vec<String>,
        /// Audit file to write (defaults to `<forms>/_coverage_audit.json`).
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Merge reviewer feedback into an artifact.
    Merge {
        #[arg(long, value_name = "ARTIFACT")]
        artifact: PathBuf,
        /// Form id (defaults to the artifact file stem).
        #[arg(long)]
        form_id: Option<String>,
        /// Feedback file to apply.
        #[arg(long, value_name = "FILE", conflicts_with = "feedback_dir")]
        feedback: Option<PathBuf>,
        /// Feedback directory (defaults to COMPLIANCE_QA_FEEDBACK_DIR).
        #[arg(long, value_name = "DIR")]
        feedback_dir: Option<PathBuf>,
        /// Write the merged artifact here instead of stdout.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Render an artifact for a given answer snapshot.
    Render {
        #[arg(long, value_name = "ARTIFACT")]
        artifact: PathBuf,
        #[arg(long)]
        form_id: Option<String>,
        /// Current-form answers (JSON object).
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Intro answers (JSON object).
        #[arg(long, value_name = "INTRO")]
        intro: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Answer a questionnaire interactively; everything is recomputed after each answer.
    Fill {
        #[arg(long, value_name = "ARTIFACT")]
        artifact: PathBuf,
        #[arg(long)]
        form_id: Option<String>,
        /// Intro answers (JSON object).
        #[arg(long, value_name = "INTRO")]
        intro: Option<PathBuf>,
        /// Answers to resume from (JSON object).
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Where reviewer comments are autosaved (defaults to COMPLIANCE_QA_FEEDBACK_DIR).
        #[arg(long, value_name = "DIR")]
        feedback_dir: Option<PathBuf>,
        /// Directory holding linked artifacts (defaults to the artifact's directory).
        #[arg(long, value_name = "DIR")]
        links_dir: Option<PathBuf>,
        /// Also emit answer JSON on completion.
        #[arg(long)]
        answers_json: bool,
    },
    /// Edit the reviewer feedback file for a form.
    Feedback {
        #[command(subcommand)]
        action: FeedbackAction,
    },
    /// Print the JSON Schema for an artifact, feedback file or form definition.
    Schema {
        #[arg(long, default_value = "artifact")]
        kind: SchemaKind,
    },
}

#[derive(Args)]
struct FeedbackTarget {
    #[arg(long)]
    form_id: String,
    /// Feedback directory (defaults to COMPLIANCE_QA_FEEDBACK_DIR).
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum FeedbackAction {
    /// Append a free-text note for the next generation pass.
    Note {
        #[command(flatten)]
        target: FeedbackTarget,
        #[arg(long)]
        text: String,
    },
    /// Comment on one control.
    Comment {
        #[command(flatten)]
        target: FeedbackTarget,
        #[arg(long)]
        control: String,
        #[arg(long)]
        severity: FeedbackSeverity,
        #[arg(long)]
        comment: String,
    },
    /// Override one field of a control (value is JSON, bare text is taken as a string).
    Override {
        #[command(flatten)]
        target: FeedbackTarget,
        #[arg(long)]
        control: String,
        #[arg(long)]
        field: String,
        #[arg(long)]
        value: String,
    },
    /// Add or replace a reviewer-authored control.
    AddControl {
        #[command(flatten)]
        target: FeedbackTarget,
        /// Control record as JSON.
        #[arg(long)]
        control: String,
    },
    /// Print the stored feedback file.
    Show {
        #[command(flatten)]
        target: FeedbackTarget,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    match cli.command {
        Command::Validate {
            artifact,
            strict,
            out,
        } => run_validate(artifact, strict, out),
        Command::Build {
            input,
            definition,
            nodes,
            out,
            feedback_dir,
            force,
        } => run_build(input, definition, nodes, out, feedback_dir, force),
        Command::Audit {
            forms,
            nodes,
            only,
            out,
        } => run_audit(forms, nodes, only, out),
        Command::Merge {
            artifact,
            form_id,
            feedback,
            feedback_dir,
            out,
        } => run_merge(artifact, form_id, feedback, feedback_dir, out),
        Command::Render {
            artifact,
            form_id,
            answers,
            intro,
            format,
        } => run_render(artifact, form_id, answers, intro, format),
        Command::Fill {
            artifact,
            form_id,
            intro,
            answers,
            feedback_dir,
            links_dir,
            answers_json,
        } => run_fill(FillOptions {
            artifact,
            form_id,
            intro,
            answers,
            feedback_dir,
            links_dir,
            verbose: cli.verbose,
            answers_json,
        }),
        Command::Feedback { action } => run_feedback(action),
        Command::Schema { kind } => run_schema(kind),
    }
}

fn run_validate(artifact: PathBuf, strict: bool, out: Option<PathBuf>) -> CliResult<()> {
    let candidate: Value = read_json(&artifact)?;
    let report = Validator::default().validate_value(&candidate);
    println!(
        "Validation result: {}",
        if report.is_clean() {
            "clean"
        } else {
            "records dropped"
        }
    );
    describe_violations(&report.violations);

    if let Some(out) = out {
        ensure_allowed_root(&out)?;
        write_json(&out, &report.questionnaire)?;
        println!("Cleaned artifact written to {}", out.display());
    }

    if strict && !report.is_clean() {
        Err(format!("{} record(s) dropped", report.violations.len()).into())
    } else {
        Ok(())
    }
}

fn describe_violations(violations: &[Violation]) {
    for line in violation_lines(violations) {
        println!("{}", line);
    }
}

fn violation_lines(violations: &[Violation]) -> Vec<String> {
    if violations.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["Dropped records:".to_string()];
    lines.extend(violations.iter().map(|violation| {
        format!(
            "  {} {} - {}",
            violation.record, violation.id, violation.message
        )
    }));
    lines
}

fn run_build(
    input_path: PathBuf,
    definition_path: PathBuf,
    nodes_path: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    feedback_dir: Option<PathBuf>,
    force: bool,
) -> CliResult<()> {
    let definition: FormDefinition = read_json(&definition_path)?;
    let candidate: Value = read_json(&input_path)?;
    let nodes: Vec<TextNode> = match nodes_path {
        Some(path) => read_json(&path)?,
        None => Vec::new(),
    };

    let out_root = resolve_output_root(out_dir)?;
    let target = form_path(&out_root, &definition.id);
    ensure_allowed_root(&target)?;
    if target.exists() && !force {
        return Err(format!(
            "artifact {} already exists; rerun with --force to overwrite",
            target.display()
        )
        .into());
    }

    let feedback = match resolve_feedback_dir(feedback_dir) {
        Some(dir) => FeedbackStore::new(dir).load(&definition.id),
        None => FeedbackLoad::Absent,
    };

    let built = build_form(
        BuildInput {
            definition,
            candidate,
            nodes,
            feedback,
        },
        &Validator::default(),
        &AuditConfig::default(),
    );
    println!(
        "Built {}: {} control(s), {} group(s), {} rule(s)",
        built.form_id,
        built.questionnaire.controls.len(),
        built.questionnaire.groups.len(),
        built.questionnaire.rules.len()
    );
    describe_violations(&built.violations);
    describe_feedback_status(&built.feedback);
    println!(
        "Coverage: {}% ({} of {} rule(s) mapped)",
        built.coverage.coverage_pct, built.coverage.total_mapped, built.coverage.total_input
    );

    let path = write_form(&built, &out_root)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn describe_feedback_status(status: &FeedbackStatus) {
    println!("{}", feedback_status_line(status));
}

fn run_audit(
    forms_dir: PathBuf,
    nodes_path: PathBuf,
    only: Vec<String>,
    out: Option<PathBuf>,
) -> CliResult<()> {
    let nodes: BTreeMap<String, Vec<TextNode>> = read_json(&nodes_path)?;
    let filter = build_form_filter(&only)?;
    let audit = audit_directory(&forms_dir, &nodes, &AuditConfig::default(), |form_id| {
        filter.as_ref().is_none_or(|set| set.is_match(form_id))
    })?;
    describe_audit(&audit);

    let out = out.unwrap_or_else(|| forms_dir.join(COVERAGE_AUDIT_FILE));
    ensure_allowed_root(&out)?;
    write_json(&out, &audit)?;
    println!("Audit written to {}", out.display());
    Ok(())
}

fn build_form_filter(patterns: &[String]) -> CliResult<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

fn describe_audit(audit: &CoverageAudit) {
    for (form_id, report) in &audit.processes {
        println!(
            "{}: {}% ({}/{})",
            form_id, report.coverage_pct, report.total_mapped, report.total_input
        );
        if !report.unmapped.is_empty() {
            println!("  unmapped: {}", join_codes(&report.unmapped));
        }
        if !report.extra.is_empty() {
            println!("  extra: {}", join_codes(&report.extra));
        }
        if !report.low_confidence.is_empty() {
            println!("  low confidence: {}", report.low_confidence.join(", "));
        }
    }
    println!(
        "Overall: {}% across {} form(s)",
        audit.summary.overall_coverage_pct, audit.summary.processes_audited
    );
}

fn join_codes(codes: &BTreeSet<String>) -> String {
    codes.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn run_merge(
    artifact: PathBuf,
    form_id: Option<String>,
    feedback_path: Option<PathBuf>,
    feedback_dir: Option<PathBuf>,
    out: Option<PathBuf>,
) -> CliResult<()> {
    let form_id = resolve_form_id(form_id, &artifact)?;
    let candidate: Value = read_json(&artifact)?;
    let validator = Validator::default();
    let report = validator.validate_value(&candidate);

    let load = match (feedback_path, resolve_feedback_dir(feedback_dir)) {
        (Some(path), _) => FeedbackLoad::from_json(&form_id, &fs::read_to_string(path)?),
        (None, Some(dir)) => FeedbackStore::new(dir).load(&form_id),
        (None, None) => {
            return Err(format!(
                "pass --feedback or --feedback-dir (or set {})",
                FEEDBACK_DIR_ENV
            )
            .into());
        }
    };
    let reviewed = review(&validator, &report.questionnaire, load);
    // stdout may carry the merged artifact
    for line in violation_lines(&report.violations)
        .into_iter()
        .chain(violation_lines(&reviewed.violations))
    {
        eprintln!("{}", line);
    }

    match out {
        Some(out) => {
            ensure_allowed_root(&out)?;
            write_json(&out, &reviewed.questionnaire)?;
            describe_feedback_status(&reviewed.status);
            println!("Merged artifact written to {}", out.display());
        }
        None => {
            eprintln!("{}", feedback_status_line(&reviewed.status));
            println!(
                "{}",
                serde_json::to_string_pretty(&reviewed.questionnaire)?
            );
        }
    }
    Ok(())
}

fn feedback_status_line(status: &FeedbackStatus) -> String {
    match status {
        FeedbackStatus::Absent => "Feedback: none".into(),
        FeedbackStatus::Applied => "Feedback: applied".into(),
        FeedbackStatus::ParseFailed { message } => {
            format!("Feedback: NOT applied (could not parse: {})", message)
        }
    }
}

/// Component config for one artifact on disk.
struct FormSession {
    form_id: String,
    config_json: String,
}

impl FormSession {
    fn load(artifact: &Path, form_id: Option<String>, intro: Option<PathBuf>) -> CliResult<Self> {
        let form_id = resolve_form_id(form_id, artifact)?;
        let artifact_json = fs::read_to_string(artifact)?;
        let intro_answers = match intro {
            Some(path) => read_json::<Value>(&path)?,
            None => json!({}),
        };
        let config_json = json!({
            "form_id": form_id,
            "artifact_json": artifact_json,
            "intro_answers": intro_answers,
        })
        .to_string();
        Ok(Self {
            form_id,
            config_json,
        })
    }

    fn render_ui(&self, answers: &Value) -> CliResult<Value> {
        parse_component_result(&render_json_ui(
            &self.form_id,
            &self.config_json,
            &answers.to_string(),
        ))
    }

    fn render_text(&self, answers: &Value) -> CliResult<String> {
        parse_component_text(render_text(
            &self.form_id,
            &self.config_json,
            &answers.to_string(),
        ))
    }

    fn submit(&self, answers: &Value, key: &str, value: &str) -> CliResult<Value> {
        let value_json = serde_json::to_string(value)?;
        let response = parse_component_result(&submit_patch(
            &self.form_id,
            &self.config_json,
            &answers.to_string(),
            key,
            &value_json,
        ))?;
        Ok(response["answers"].clone())
    }

    fn select_sub_type(&self, answers: &Value, sub_type: &str, selected: bool) -> CliResult<Value> {
        let response = parse_component_result(&select_sub_type(
            &self.form_id,
            &self.config_json,
            &answers.to_string(),
            sub_type,
            selected,
        ))?;
        Ok(response["answers"].clone())
    }
}

fn run_render(
    artifact: PathBuf,
    form_id: Option<String>,
    answers: Option<PathBuf>,
    intro: Option<PathBuf>,
    format: RenderMode,
) -> CliResult<()> {
    let session = FormSession::load(&artifact, form_id, intro)?;
    let answers = match answers {
        Some(path) => read_json::<Value>(&path)?,
        None => json!({}),
    };
    match format {
        RenderMode::Text => print!("{}", session.render_text(&answers)?),
        RenderMode::Json => println!(
            "{}",
            serde_json::to_string_pretty(&session.render_ui(&answers)?)?
        ),
    }
    Ok(())
}

struct FillOptions {
    artifact: PathBuf,
    form_id: Option<String>,
    intro: Option<PathBuf>,
    answers: Option<PathBuf>,
    feedback_dir: Option<PathBuf>,
    links_dir: Option<PathBuf>,
    verbose: bool,
    answers_json: bool,
}

/// Input accepted at a fill prompt.
#[derive(Debug, PartialEq)]
enum FillInput {
    Answer(&'static str),
    SubType { id: String, selected: bool },
    Comment {
        severity: FeedbackSeverity,
        comment: String,
    },
    Exit,
}

/// Reviewer comments captured during a fill session, saved once the edits go quiet.
struct CommentSink {
    feedback: FeedbackFile,
    autosave: FeedbackAutosave,
}

impl CommentSink {
    fn open(dir: PathBuf, form_id: &str) -> Option<Self> {
        let store = FeedbackStore::new(dir);
        let feedback = match store.load(form_id) {
            FeedbackLoad::Absent => FeedbackFile::new(form_id),
            FeedbackLoad::Loaded(feedback) => feedback,
            FeedbackLoad::Malformed(err) => {
                eprintln!("Reviewer comments disabled: {}", err);
                return None;
            }
        };
        Some(Self {
            feedback,
            autosave: FeedbackAutosave::new(store, &AutosaveConfig::default()),
        })
    }

    fn comment(&mut self, control_id: &str, severity: FeedbackSeverity, comment: String) {
        self.feedback
            .control_notes
            .insert(control_id.to_string(), ControlNote { comment, severity });
        self.autosave.record(self.feedback.clone(), Instant::now());
    }

    fn flush_due(&mut self) {
        report_flush(self.autosave.flush_due(Instant::now()), self.autosave.store());
    }

    fn flush_all(&mut self) {
        report_flush(self.autosave.flush_all(), self.autosave.store());
    }
}

fn report_flush(report: FlushReport, store: &FeedbackStore) {
    for saved in &report.saved {
        println!(
            "Feedback saved to {}",
            store.path_for(&saved.form_id).display()
        );
    }
    for (form_id, err) in &report.failed {
        eprintln!("Failed to save feedback for {}: {}", form_id, err);
    }
}

fn run_fill(options: FillOptions) -> CliResult<()> {
    let session = FormSession::load(&options.artifact, options.form_id, options.intro)?;
    let answers = match &options.answers {
        Some(path) => read_json::<Value>(path)?,
        None => json!({}),
    };
    let links_root = options
        .links_dir
        .or_else(|| options.artifact.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let loader = DirectoryLoader::new(links_root);
    let mut comments = resolve_feedback_dir(options.feedback_dir)
        .and_then(|dir| CommentSink::open(dir, &session.form_id));
    let mut presenter =
        WizardPresenter::new(Verbosity::from_verbose(options.verbose), options.answers_json);

    let outcome = fill_until_done(&session, answers, &mut presenter, &loader, comments.as_mut());

    if let Some(sink) = comments.as_mut() {
        sink.flush_all();
    }
    outcome
}

fn fill_until_done(
    session: &FormSession,
    mut answers: Value,
    presenter: &mut WizardPresenter,
    loader: &DirectoryLoader,
    mut comments: Option<&mut CommentSink>,
) -> CliResult<()> {
    let mut links = LinkCache::new();
    let mut shown_links = BTreeSet::new();

    loop {
        if let Some(sink) = comments.as_deref_mut() {
            sink.flush_due();
        }

        let ui = session.render_ui(&answers)?;
        let payload =
            WizardPayload::from_json(&ui).map_err(|err| format!("fill UI error: {}", err))?;
        presenter.show_header(&payload);
        presenter.show_status(&payload);

        for link in payload.visible_links() {
            if !shown_links.insert(link.target.clone()) {
                continue;
            }
            let outcome = match links.expand(&link.target, loader) {
                Some(LinkState::Loaded(linked)) => {
                    format!("{} control(s)", linked.controls.len())
                }
                Some(LinkState::Failed(message)) => format!("unavailable: {}", message),
                Some(LinkState::InFlight) | None => "loading".to_string(),
            };
            presenter.show_link(link, &outcome);
        }

        let Some(control_id) = payload.next_control_id.clone() else {
            presenter.show_completion(&payload, &answers);
            return Ok(());
        };
        let control = payload
            .control(&control_id)
            .ok_or_else(|| format!("render payload missing control '{}'", control_id))?;
        let prompt = PromptContext::new(control, &payload.progress);

        match prompt_fill_input(&prompt, presenter)? {
            FillInput::Exit => return Err("fill aborted by user".into()),
            FillInput::Answer(value) => {
                answers = session.submit(&answers, &control_id, value)?;
                if control.wants_detail(value) {
                    presenter.show_detail_prompt(control);
                    let detail = prompt_line("Detail", None)?;
                    if !detail.is_empty() {
                        answers = session.submit(&answers, &detail_key(&control_id), &detail)?;
                    }
                }
            }
            FillInput::SubType { id, selected } => {
                if !payload.has_sub_type(&id) {
                    println!("Unknown sub-type '{}'.", id);
                    continue;
                }
                answers = session.select_sub_type(&answers, &id, selected)?;
            }
            FillInput::Comment { severity, comment } => match comments.as_deref_mut() {
                Some(sink) => {
                    sink.comment(&control_id, severity, comment);
                    println!("Comment on {} recorded.", control_id);
                }
                None => println!(
                    "Comments need --feedback-dir or {}; nothing recorded.",
                    FEEDBACK_DIR_ENV
                ),
            },
        }
    }
}

fn prompt_fill_input(prompt: &PromptContext, presenter: &WizardPresenter) -> CliResult<FillInput> {
    loop {
        presenter.show_prompt(prompt);
        print!("> ");
        io::stdout().flush()?;
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(FillInput::Exit);
        }

        match parse_fill_input(&input) {
            Ok(value) => return Ok(value),
            Err(err) => presenter.show_parse_error(&err),
        }
    }
}

fn parse_fill_input(raw: &str) -> Result<FillInput, AnswerParseError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("exit") {
        return Ok(FillInput::Exit);
    }
    if let Some(rest) = trimmed.strip_prefix(":sub") {
        return parse_sub_type_command(rest);
    }
    if let Some(rest) = trimmed.strip_prefix(":comment") {
        return parse_comment_command(rest);
    }
    parse_choice(trimmed).map(FillInput::Answer)
}

fn parse_choice(raw: &str) -> Result<&'static str, AnswerParseError> {
    match raw.to_lowercase().as_str() {
        "yes" | "y" => Ok("Yes"),
        "no" | "n" => Ok("No"),
        "n/a" | "na" => Ok("N/A"),
        "" => Err(AnswerParseError::new(
            "This control requires an answer.",
            None,
        )),
        _ => Err(AnswerParseError::new(
            "Please answer yes, no or n/a.",
            Some("expected Yes, No or N/A".to_string()),
        )),
    }
}

fn parse_sub_type_command(rest: &str) -> Result<FillInput, AnswerParseError> {
    let usage = || {
        AnswerParseError::new(
            "Usage: :sub <id> on|off",
            Some("expected a sub-type id followed by on or off".to_string()),
        )
    };
    let mut parts = rest.split_whitespace();
    let id = parts.next().ok_or_else(usage)?;
    let selected = match parts.next().map(str::to_lowercase).as_deref() {
        Some("on") | Some("yes") => true,
        Some("off") | Some("no") => false,
        _ => return Err(usage()),
    };
    if parts.next().is_some() {
        return Err(usage());
    }
    Ok(FillInput::SubType {
        id: id.to_string(),
        selected,
    })
}

fn parse_comment_command(rest: &str) -> Result<FillInput, AnswerParseError> {
    let rest = rest.trim();
    let (severity, comment) = rest.split_once(char::is_whitespace).ok_or_else(|| {
        AnswerParseError::new(
            "Usage: :comment <severity> <text>",
            Some("severity is one of approved, info, warning, error".to_string()),
        )
    })?;
    let severity = severity
        .parse::<FeedbackSeverity>()
        .map_err(|err| AnswerParseError::new(err, None))?;
    let comment = comment.trim();
    if comment.is_empty() {
        return Err(AnswerParseError::new("Comment text cannot be empty.", None));
    }
    Ok(FillInput::Comment {
        severity,
        comment: comment.to_string(),
    })
}

fn run_feedback(action: FeedbackAction) -> CliResult<()> {
    match action {
        FeedbackAction::Note { target, text } => {
            let store = feedback_store(target.dir)?;
            let saved = store.update(&target.form_id, |feedback| feedback.notes.push(text))?;
            report_saved(&store, &saved);
        }
        FeedbackAction::Comment {
            target,
            control,
            severity,
            comment,
        } => {
            let store = feedback_store(target.dir)?;
            let incoming = json!({
                "control_notes": {
                    control: { "comment": comment, "severity": severity.as_str() }
                }
            });
            let saved = store.write(&target.form_id, &incoming)?;
            report_saved(&store, &saved);
        }
        FeedbackAction::Override {
            target,
            control,
            field,
            value,
        } => {
            let store = feedback_store(target.dir)?;
            let value = parse_override_value(&value);
            let saved = store.update(&target.form_id, |feedback| {
                feedback
                    .control_overrides
                    .entry(control)
                    .or_default()
                    .insert(field, value);
            })?;
            report_saved(&store, &saved);
        }
        FeedbackAction::AddControl { target, control } => {
            let store = feedback_store(target.dir)?;
            let control: Control = serde_json::from_str(&control)?;
            let saved = store.update(&target.form_id, |feedback| {
                feedback
                    .additional_controls
                    .retain(|existing| existing.id != control.id);
                feedback.additional_controls.push(control);
            })?;
            report_saved(&store, &saved);
        }
        FeedbackAction::Show { target } => {
            let store = feedback_store(target.dir)?;
            match store.load(&target.form_id) {
                FeedbackLoad::Absent => println!("No feedback for {}", target.form_id),
                FeedbackLoad::Loaded(feedback) => {
                    println!("{}", serde_json::to_string_pretty(&feedback)?)
                }
                FeedbackLoad::Malformed(err) => return Err(err.into()),
            }
        }
    }
    Ok(())
}

fn feedback_store(dir: Option<PathBuf>) -> CliResult<FeedbackStore> {
    let dir = resolve_feedback_dir(dir)
        .ok_or_else(|| format!("pass --dir or set {}", FEEDBACK_DIR_ENV))?;
    ensure_allowed_root(&dir)?;
    Ok(FeedbackStore::new(dir))
}

fn report_saved(store: &FeedbackStore, saved: &FeedbackFile) {
    println!(
        "Feedback for {} saved to {}",
        saved.form_id,
        store.path_for(&saved.form_id).display()
    );
}

/// JSON literal when it parses, otherwise the raw text as a string.
fn parse_override_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn run_schema(kind: SchemaKind) -> CliResult<()> {
    let schema = artifact_schema(kind)?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    serde_json::from_str(&contents)
        .map_err(|err| format!("failed to parse {}: {}", path.display(), err).into())
}

fn resolve_form_id(form_id: Option<String>, artifact: &Path) -> CliResult<String> {
    match form_id {
        Some(id) => Ok(id),
        None => artifact
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(String::from)
            .ok_or_else(|| "cannot derive a form id from the artifact path; pass --form-id".into()),
    }
}

fn resolve_feedback_dir(dir: Option<PathBuf>) -> Option<PathBuf> {
    dir.or_else(|| env::var_os(FEEDBACK_DIR_ENV).map(PathBuf::from))
}

fn resolve_output_root(out: Option<PathBuf>) -> CliResult<PathBuf> {
    let candidate = match out {
        Some(path) => path,
        None => env::var_os(OUTPUT_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    if candidate.as_os_str().is_empty() {
        return Err("output directory cannot be empty".into());
    }
    ensure_allowed_root(&candidate)?;
    Ok(candidate)
}

fn ensure_allowed_root(target: &Path) -> CliResult<()> {
    let target = canonicalize_target(target)?;
    let roots = allowed_roots()?;
    if roots.iter().any(|root| target.starts_with(root)) || path_is_writable(&target) {
        Ok(())
    } else {
        Err(format!(
            "path '{}' is outside allowed roots {:?}",
            target.display(),
            roots
        )
        .into())
    }
}

fn allowed_roots() -> CliResult<Vec<PathBuf>> {
    let roots = env::var(ALLOWED_ROOTS_ENV)
        .ok()
        .map(|value| {
            value
                .split(':')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(PathBuf::from)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut canonical_roots = roots
        .into_iter()
        .map(|root| root.canonicalize().unwrap_or(root))
        .collect::<Vec<_>>();

    if canonical_roots.is_empty() {
        let cwd = env::current_dir()?;
        canonical_roots.push(cwd.canonicalize().unwrap_or(cwd));
    }

    Ok(canonical_roots)
}

fn path_is_writable(target: &Path) -> bool {
    let mut candidate = Some(target);
    while let Some(path) = candidate {
        if path.exists() {
            return fs::metadata(path)
                .map(|metadata| !metadata.permissions().readonly())
                .unwrap_or(false);
        }
        candidate = path.parent();
    }
    false
}

fn canonicalize_target(path: &Path) -> CliResult<PathBuf> {
    if path.exists() {
        return Ok(path.canonicalize()?);
    }

    if let Some(parent) = path.parent()
        && let Ok(parent_canon) = parent.canonicalize()
    {
        return Ok(match path.file_name() {
            Some(file_name) => parent_canon.join(file_name),
            None => parent_canon,
        });
    }

    let cwd = env::current_dir()?;
    Ok(cwd.join(path))
}

fn parse_component_result(response: &str) -> CliResult<Value> {
    let value: Value = serde_json::from_str(response)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        Err(error.into())
    } else {
        Ok(value)
    }
}

/// Text responses are plain text unless the component reported an error object.
fn parse_component_text(response: String) -> CliResult<String> {
    if let Ok(value) = serde_json::from_str::<Value>(&response)
        && let Some(error) = value.get("error").and_then(Value::as_str)
    {
        return Err(error.into());
    }
    Ok(response)
}

fn prompt_line(prompt: &str, default: Option<&str>) -> CliResult<String> {
    if let Some(default_value) = default {
        print!("{} [{}]: ", prompt, default_value);
    } else {
        print!("{}: ", prompt);
    }
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Ok(default.map(String::from).unwrap_or_default())
    } else {
        Ok(trimmed.to_string())
    }
}
