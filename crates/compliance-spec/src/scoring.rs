use serde::Serialize;

use crate::answers::AnswerContext;
use crate::spec::form::Questionnaire;
use crate::status::{ControlStatus, control_status};
use crate::visibility::Visibility;

/// Completion counters for one group. Hidden controls are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GroupScore {
    pub success: usize,
    pub warning: usize,
    pub error: usize,
    pub pending: usize,
    pub hidden: usize,
}

impl GroupScore {
    pub fn visible(&self) -> usize {
        self.success + self.warning + self.error + self.pending
    }

    pub fn answered(&self) -> usize {
        self.success + self.warning + self.error
    }

    /// Share of visible controls in `success`; `None` when nothing is visible.
    pub fn completion(&self) -> Option<f64> {
        match self.visible() {
            0 => None,
            total => Some(self.success as f64 / total as f64),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.visible() > 0 && self.success == self.visible()
    }

    fn record(&mut self, status: ControlStatus) {
        match status {
            ControlStatus::Pending => self.pending += 1,
            ControlStatus::Success => self.success += 1,
            ControlStatus::Warning => self.warning += 1,
            ControlStatus::Error => self.error += 1,
        }
    }
}

/// Score the controls assigned to `group_id` under the given visibility snapshot.
pub fn score_group(
    group_id: &str,
    questionnaire: &Questionnaire,
    visibility: &Visibility,
    answers: &AnswerContext,
) -> GroupScore {
    let mut score = GroupScore::default();
    for control in questionnaire.controls_in_group(group_id) {
        if visibility.control_visible(&control.id) {
            score.record(control_status(control, answers));
        } else {
            score.hidden += 1;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Control, CorrectOption, Group, GroupVariant, Rule};
    use crate::visibility::resolve_visibility;

    fn control(id: &str, group: &str) -> Control {
        Control {
            id: id.into(),
            label: format!("Control {id}"),
            detail_required: false,
            correct_option: Some(CorrectOption::Yes),
            detail_label: None,
            process_id: None,
            source_rules: Default::default(),
            mapping_confidence: None,
            group: Some(group.into()),
        }
    }

    fn questionnaire() -> Questionnaire {
        Questionnaire {
            controls: vec![
                control("4_3_1", "collection-kyc"),
                control("4_3_2", "collection-kyc"),
                control("4_3_3", "collection-kyc"),
                control("4_3_10", "collection-kyc-extra"),
            ],
            groups: vec![
                Group {
                    id: "collection-kyc".into(),
                    title: "Collection".into(),
                    description: None,
                    variant: GroupVariant::Main,
                    subprocess_label: None,
                },
                Group {
                    id: "collection-kyc-extra".into(),
                    title: "Extra".into(),
                    description: None,
                    variant: GroupVariant::Subprocess,
                    subprocess_label: Some("Extra".into()),
                },
            ],
            rules: vec![Rule::show("4_3_3", "sub-domestic", "Yes")],
            ..Default::default()
        }
    }

    #[test]
    fn hidden_controls_do_not_count() {
        let questionnaire = questionnaire();
        let mut answers = AnswerContext::default();
        answers.set("4_3_1", "Yes");
        answers.set("4_3_2", "No");
        let visibility = resolve_visibility(&questionnaire, &answers);
        let score = score_group("collection-kyc", &questionnaire, &visibility, &answers);
        assert_eq!(score.success, 1);
        assert_eq!(score.error, 1);
        assert_eq!(score.hidden, 1);
        assert_eq!(score.visible(), 2);
        assert_eq!(score.completion(), Some(0.5));
    }

    #[test]
    fn group_membership_is_exact_not_prefix() {
        let questionnaire = questionnaire();
        let answers = AnswerContext::default();
        let visibility = resolve_visibility(&questionnaire, &answers);
        let score = score_group("collection-kyc", &questionnaire, &visibility, &answers);
        assert_eq!(score.visible() + score.hidden, 3);
    }

    #[test]
    fn empty_group_is_indeterminate() {
        let questionnaire = questionnaire();
        let answers = AnswerContext::default();
        let visibility = resolve_visibility(&questionnaire, &answers);
        let score = score_group("unknown-group", &questionnaire, &visibility, &answers);
        assert_eq!(score.completion(), None);
        assert!(!score.is_complete());
    }

    #[test]
    fn group_with_only_hidden_controls_is_indeterminate() {
        let mut questionnaire = questionnaire();
        questionnaire
            .rules
            .push(Rule::show("collection-kyc-extra", "sub-unreg-foreign", "Yes"));
        let answers = AnswerContext::default();
        let visibility = resolve_visibility(&questionnaire, &answers);
        let score = score_group("collection-kyc-extra", &questionnaire, &visibility, &answers);
        assert_eq!(score.hidden, 1);
        assert_eq!(score.completion(), None);
    }
}
