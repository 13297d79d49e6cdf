use std::collections::BTreeMap;

use crate::answers::AnswerContext;
use crate::spec::form::Questionnaire;
use crate::spec::rule::{Rule, RuleEffect};

pub type VisibilityMap = BTreeMap<String, bool>;

/// Decide whether `id` is shown under the given rules and answers.
///
/// Targets without rules are always visible. Otherwise the target needs a
/// satisfied SHOW rule (when any SHOW rule exists) and no satisfied HIDE rule.
/// Unknown scopes are never satisfied.
pub fn is_visible(id: &str, rules: &[Rule], answers: &AnswerContext) -> bool {
    let mut has_show = false;
    let mut show_satisfied = false;

    for rule in rules.iter().filter(|rule| rule.target == id) {
        let satisfied = rule.is_satisfied_by(answers.lookup_scope(&rule.scope));
        match rule.effect {
            RuleEffect::Show => {
                has_show = true;
                show_satisfied |= satisfied;
            }
            RuleEffect::Hide => {
                if satisfied {
                    return false;
                }
            }
        }
    }

    !has_show || show_satisfied
}

/// Visibility of every group, control and form link for one answer snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Visibility {
    pub groups: VisibilityMap,
    /// Effective control visibility: own rules and the enclosing group.
    pub controls: VisibilityMap,
    pub form_links: VisibilityMap,
}

impl Visibility {
    pub fn group_visible(&self, id: &str) -> bool {
        self.groups.get(id).copied().unwrap_or(true)
    }

    pub fn control_visible(&self, id: &str) -> bool {
        self.controls.get(id).copied().unwrap_or(true)
    }

    pub fn link_visible(&self, target: &str) -> bool {
        self.form_links.get(target).copied().unwrap_or(false)
    }

    pub fn visible_control_count(&self) -> usize {
        self.controls.values().filter(|visible| **visible).count()
    }
}

/// Recompute the full visibility snapshot. Called after every answer change.
pub fn resolve_visibility(questionnaire: &Questionnaire, answers: &AnswerContext) -> Visibility {
    let rules = &questionnaire.rules;

    let groups = questionnaire
        .groups
        .iter()
        .map(|group| (group.id.clone(), is_visible(&group.id, rules, answers)))
        .collect::<VisibilityMap>();

    let controls = questionnaire
        .controls
        .iter()
        .map(|control| {
            let group_visible = control
                .group
                .as_deref()
                .map(|group| groups.get(group).copied().unwrap_or(true))
                .unwrap_or(true);
            let visible = group_visible && is_visible(&control.id, rules, answers);
            (control.id.clone(), visible)
        })
        .collect::<VisibilityMap>();

    let form_links = questionnaire
        .form_links
        .iter()
        .map(|link| {
            let gate = [Rule::show(link.target.clone(), link.gated_by.clone(), "Yes")];
            (link.target.clone(), is_visible(&link.target, &gate, answers))
        })
        .collect::<VisibilityMap>();

    Visibility {
        groups,
        controls,
        form_links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::AnswerMap;

    fn answers(pairs: &[(&str, &str)]) -> AnswerContext {
        AnswerContext::from_form(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<AnswerMap>(),
        )
    }

    #[test]
    fn target_without_rules_is_always_visible() {
        let rules = vec![Rule::show("other", "4_1", "Yes")];
        assert!(is_visible("g1", &[], &AnswerContext::default()));
        assert!(is_visible("g1", &rules, &AnswerContext::default()));
        assert!(is_visible("g1", &rules, &answers(&[("4_1", "No")])));
    }

    #[test]
    fn show_rule_gates_on_sub_type_selection() {
        let rules = vec![Rule::show("g1", "sub-domestic", "Yes")];
        assert!(!is_visible("g1", &rules, &AnswerContext::default()));
        assert!(is_visible("g1", &rules, &answers(&[("sub-domestic", "Yes")])));
        assert!(!is_visible("g1", &rules, &answers(&[("sub-domestic", "No")])));
    }

    #[test]
    fn any_satisfied_show_rule_is_enough() {
        let rules = vec![
            Rule::show("4_3_2", "sub-domestic", "Yes"),
            Rule::show("4_3_2", "sub-reg-foreign", "Yes"),
        ];
        assert!(is_visible("4_3_2", &rules, &answers(&[("sub-reg-foreign", "Yes")])));
    }

    #[test]
    fn satisfied_hide_rule_wins_over_show() {
        let rules = vec![
            Rule::show("4_3_2", "sub-domestic", "Yes"),
            Rule::hide("4_3_2", "4_3_1", "No"),
        ];
        let both = answers(&[("sub-domestic", "Yes"), ("4_3_1", "No")]);
        assert!(!is_visible("4_3_2", &rules, &both));
        let show_only = answers(&[("sub-domestic", "Yes"), ("4_3_1", "Yes")]);
        assert!(is_visible("4_3_2", &rules, &show_only));
    }

    #[test]
    fn hide_only_rules_default_to_visible() {
        let rules = vec![Rule::hide("4_3_2", "4_3_1", "No")];
        assert!(is_visible("4_3_2", &rules, &AnswerContext::default()));
        assert!(!is_visible("4_3_2", &rules, &answers(&[("4_3_1", "No")])));
    }

    #[test]
    fn intro_scope_is_consulted_first() {
        let rules = vec![Rule::show("collection-kyc", "4_1_4_1", "Yes")];
        let ctx = AnswerContext::new(
            AnswerMap::from([("4_1_4_1".into(), "Yes".into())]),
            AnswerMap::from([("4_1_4_1".into(), "No".into())]),
        );
        assert!(is_visible("collection-kyc", &rules, &ctx));
    }

    #[test]
    fn visibility_is_monotonic_in_matching_answers() {
        let show = vec![Rule::show("t", "s", "Yes")];
        let hide = vec![Rule::hide("t", "s", "Yes")];
        for before in ["", "No", "Maybe"] {
            let non_matching = answers(&[("s", before)]);
            let matching = answers(&[("s", "Yes")]);
            assert!(is_visible("t", &show, &matching) >= is_visible("t", &show, &non_matching));
            assert!(is_visible("t", &hide, &matching) <= is_visible("t", &hide, &non_matching));
        }
    }
}
