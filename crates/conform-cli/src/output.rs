use conform_engine::RunOutcome;
use conform_policy::Policy;
use conform_report::ActionOutcome;

/// Render a run outcome as human-readable text.
pub fn render_outcome(outcome: &RunOutcome) -> String {
    let mut out = String::new();

    for report in &outcome.reports {
        if report.actions.is_empty() {
            continue;
        }
        out.push_str(&format!("{} {}\n", report.kind, report.key));
        for action in &report.actions {
            let marker = match action.outcome {
                ActionOutcome::Succeeded => "+",
                ActionOutcome::Failed => "!",
                ActionOutcome::Skipped => "~",
            };
            out.push_str(&format!("  {} {}\n", marker, action.summary));
        }
    }

    if out.is_empty() {
        out.push_str("Nothing to do.\n");
    }

    let failures = outcome.reports.iter().filter(|r| !r.compliant()).count();
    out.push_str(&format!(
        "{} resources, {} fixed, {} failed{}\n",
        outcome.reports.len(),
        outcome.fixes(),
        failures,
        if outcome.dry_run { " (dry run)" } else { "" },
    ));
    out
}

/// Render the reconcile order and dependency edges as plain text.
pub fn render_graph(policy: &Policy, order: &[usize]) -> String {
    let mut out = String::from("Reconcile order:\n");
    for (pos, &index) in order.iter().enumerate() {
        out.push_str(&format!("  {:>3}. {}\n", pos + 1, policy.resource(index).id()));
    }

    if !policy.dependencies().is_empty() {
        out.push_str("\nDependencies:\n");
        for dep in policy.dependencies() {
            out.push_str(&format!("  {} requires {}\n", dep.dependent, dep.provider));
        }
    }

    out
}
