use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::spec::control::detail_key;

/// Answer key to answer value. Empty strings count as unanswered.
pub type AnswerMap = BTreeMap<String, String>;

/// Value recorded for a selected sub-type toggle.
pub const SUB_TYPE_SELECTED: &str = "Yes";

/// Snapshot of both answer scopes for one evaluation pass.
///
/// `intro` holds session-wide answers supplied by the host; `form` holds the
/// current questionnaire's answers including sub-type selections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AnswerContext {
    #[serde(default)]
    pub intro: AnswerMap,
    #[serde(default)]
    pub form: AnswerMap,
}

impl AnswerContext {
    pub fn new(intro: AnswerMap, form: AnswerMap) -> Self {
        Self { intro, form }
    }

    pub fn from_form(form: AnswerMap) -> Self {
        Self {
            intro: AnswerMap::new(),
            form,
        }
    }

    /// Answer used for rule scopes: intro first, then the current form.
    pub fn lookup_scope(&self, key: &str) -> Option<&str> {
        non_empty(self.intro.get(key)).or_else(|| non_empty(self.form.get(key)))
    }

    /// Answer recorded on the current form only.
    pub fn form_answer(&self, key: &str) -> Option<&str> {
        non_empty(self.form.get(key))
    }

    pub fn detail(&self, control_id: &str) -> Option<&str> {
        self.form_answer(&detail_key(control_id))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.form.insert(key.into(), value.into());
    }

    pub fn clear(&mut self, key: &str) {
        self.form.remove(key);
    }

    pub fn set_detail(&mut self, control_id: &str, text: impl Into<String>) {
        self.form.insert(detail_key(control_id), text.into());
    }

    /// Record or remove the synthetic answer for a sub-type toggle.
    pub fn select_sub_type(&mut self, sub_type_id: &str, selected: bool) {
        if selected {
            self.form
                .insert(sub_type_id.to_string(), SUB_TYPE_SELECTED.to_string());
        } else {
            self.form.remove(sub_type_id);
        }
    }

    pub fn is_sub_type_selected(&self, sub_type_id: &str) -> bool {
        self.form_answer(sub_type_id) == Some(SUB_TYPE_SELECTED)
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|text| !text.is_empty())
}

/// Convert a JSON answers object into an [`AnswerMap`], keeping string values only.
pub fn answer_map_from_value(value: &Value) -> AnswerMap {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter_map(|(key, value)| {
                    value
                        .as_str()
                        .map(|text| (key.clone(), text.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn answer_map_to_value(answers: &AnswerMap) -> Value {
    let map = answers
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect::<Map<_, _>>();
    Value::Object(map)
}
