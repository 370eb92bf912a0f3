use std::collections::BTreeMap;

use crate::content::{Revision, Workflow};
use crate::transition::ScheduledTransition;

pub const TOKEN_TYPE: &str = "scheduled-transitions";

/// Label used when a state id does not resolve in the workflow.
pub const MISSING_STATE: &str = "- Missing state -";

/// Values substituted into revision log templates, e.g.
/// `[scheduled-transitions:from-state]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenReplacements {
    pub from_state: String,
    pub to_state: String,
    pub from_revision_id: String,
    pub latest_state: String,
    pub latest_revision_id: String,
}

impl TokenReplacements {
    pub fn new(
        transition: &ScheduledTransition,
        new_revision: &Revision,
        latest: &Revision,
        workflow: Option<&Workflow>,
    ) -> Self {
        Self {
            from_state: state_label(workflow, new_revision.moderation_state.as_deref()),
            to_state: state_label(workflow, Some(&transition.state)),
            from_revision_id: new_revision.revision_id.to_string(),
            latest_state: state_label(workflow, latest.moderation_state.as_deref()),
            latest_revision_id: latest.revision_id.to_string(),
        }
    }

    pub fn get_replacements(&self) -> BTreeMap<&'static str, &str> {
        BTreeMap::from([
            ("from-state", self.from_state.as_str()),
            ("to-state", self.to_state.as_str()),
            ("from-revision-id", self.from_revision_id.as_str()),
            ("latest-state", self.latest_state.as_str()),
            ("latest-revision-id", self.latest_revision_id.as_str()),
        ])
    }

    /// Replace every known token in `template`. Unknown tokens are left as is.
    pub fn replace(&self, template: &str) -> String {
        self.get_replacements()
            .into_iter()
            .fold(template.to_string(), |text, (name, value)| {
                text.replace(&format!("[{TOKEN_TYPE}:{name}]"), value)
            })
    }
}

fn state_label(workflow: Option<&Workflow>, state: Option<&str>) -> String {
    workflow
        .zip(state)
        .and_then(|(workflow, state)| workflow.state(state))
        .map(|state| state.label.clone())
        .unwrap_or_else(|| MISSING_STATE.to_string())
}
