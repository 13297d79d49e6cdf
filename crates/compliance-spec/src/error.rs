use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("failed to parse questionnaire: {0}")]
    ArtifactParse(#[source] serde_json::Error),
    #[error("failed to parse feedback for '{form_id}': {source}")]
    FeedbackParse {
        form_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid id pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),
    #[error("template registration error: {0}")]
    TemplateRegistration(#[from] Box<handlebars::TemplateError>),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
    #[error("linked form '{target}' failed to load: {message}")]
    LinkLoad { target: String, message: String },
}
