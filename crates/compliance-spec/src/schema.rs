use std::str::FromStr;

use schemars::schema_for;
use serde_json::Value;

use crate::error::FormError;
use crate::spec::{FeedbackFile, FormDefinition, Questionnaire};

/// Documents whose JSON Schema is published to external producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Artifact,
    Feedback,
    Definition,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Artifact => "artifact",
            SchemaKind::Feedback => "feedback",
            SchemaKind::Definition => "definition",
        }
    }
}

impl FromStr for SchemaKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "artifact" => Ok(SchemaKind::Artifact),
            "feedback" => Ok(SchemaKind::Feedback),
            "definition" => Ok(SchemaKind::Definition),
            other => Err(format!("unknown schema kind '{}'", other)),
        }
    }
}

/// JSON Schema for the requested document kind.
pub fn generate(kind: SchemaKind) -> Result<Value, FormError> {
    let schema = match kind {
        SchemaKind::Artifact => schema_for!(Questionnaire),
        SchemaKind::Feedback => schema_for!(FeedbackFile),
        SchemaKind::Definition => schema_for!(FormDefinition),
    };
    serde_json::to_value(&schema).map_err(FormError::JsonEncode)
}
