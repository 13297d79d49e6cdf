use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Rendering path of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupVariant {
    #[default]
    Main,
    /// Optional or secondary path, rendered nested.
    Subprocess,
}

impl GroupVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupVariant::Main => "main",
            GroupVariant::Subprocess => "subprocess",
        }
    }
}

/// Named container of related controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct Group {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub variant: GroupVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subprocess_label: Option<String>,
}
