use conform_domain::ResourceKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionOutcome::Succeeded => "ok",
            ActionOutcome::Failed => "failed",
            ActionOutcome::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// One decision point of a fixup, in application order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub summary: String,
    pub outcome: ActionOutcome,
}

/// Everything a single resource's fixup did, skipped or failed to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub kind: ResourceKind,
    pub key: String,
    pub actions: Vec<Action>,
}

impl Report {
    pub fn new(kind: ResourceKind, key: impl Into<String>) -> Self {
        Report { kind, key: key.into(), actions: Vec::new() }
    }

    pub fn action(&mut self, summary: impl Into<String>, outcome: ActionOutcome) {
        self.actions.push(Action { summary: summary.into(), outcome });
    }

    /// No action failed.
    pub fn compliant(&self) -> bool {
        !self.actions.iter().any(|a| a.outcome == ActionOutcome::Failed)
    }

    /// At least one action actually changed the host.
    pub fn fixed(&self) -> bool {
        self.actions.iter().any(|a| a.outcome == ActionOutcome::Succeeded)
    }

    pub fn summaries(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.summary.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compliant_and_fixed_derivations() {
        let mut report = Report::new(ResourceKind::User, "alice");
        assert!(report.compliant());
        assert!(!report.fixed());

        report.action("create user", ActionOutcome::Succeeded);
        assert!(report.compliant());
        assert!(report.fixed());

        report.action("set uid to 1001", ActionOutcome::Failed);
        assert!(!report.compliant());
        assert!(report.fixed());
    }

    #[test]
    fn skipped_actions_are_neither_fixes_nor_failures() {
        let mut report = Report::new(ResourceKind::File, "/etc/motd");
        report.action("update content from master copy", ActionOutcome::Skipped);
        assert!(report.compliant());
        assert!(!report.fixed());
    }

    #[test]
    fn actions_keep_application_order() {
        let mut report = Report::new(ResourceKind::Group, "admins");
        report.action("add x", ActionOutcome::Succeeded);
        report.action("remove b", ActionOutcome::Succeeded);
        assert_eq!(report.summaries(), ["add x", "remove b"]);
    }
}
