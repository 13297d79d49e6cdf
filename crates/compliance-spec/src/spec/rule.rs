use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleEffect {
    Show,
    /// Producers currently only emit `SHOW`; `HIDE` is evaluated but unexercised upstream.
    Hide,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleSchema {
    #[serde(rename = "const")]
    pub constant: String,
}

/// Gating rule tying a target's visibility to another answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Rule {
    pub target: String,
    pub scope: String,
    pub effect: RuleEffect,
    pub schema: RuleSchema,
}

impl Rule {
    pub fn show(
        target: impl Into<String>,
        scope: impl Into<String>,
        constant: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            scope: scope.into(),
            effect: RuleEffect::Show,
            schema: RuleSchema {
                constant: constant.into(),
            },
        }
    }

    pub fn hide(
        target: impl Into<String>,
        scope: impl Into<String>,
        constant: impl Into<String>,
    ) -> Self {
        Self {
            effect: RuleEffect::Hide,
            ..Self::show(target, scope, constant)
        }
    }

    /// True when the scope answer equals the rule constant.
    pub fn is_satisfied_by(&self, answer: Option<&str>) -> bool {
        answer == Some(self.schema.constant.as_str())
    }
}
