use chrono::{DateTime, Utc};
use conform_policy::Policy;
use conform_provider::{ResourceEnv, TemplateRenderer};
use conform_report::{ActionOutcome, HostId, Report, RunRecord};
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Everything one reconcile run produced, in application order.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub reports: Vec<Report>,
}

impl RunOutcome {
    /// Whether any report contains a failed action. Drives the agent's
    /// exit code.
    pub fn failed(&self) -> bool {
        self.reports.iter().any(|r| !r.compliant())
    }

    /// How many resources were actually changed.
    pub fn fixes(&self) -> usize {
        self.reports.iter().filter(|r| r.fixed()).count()
    }

    pub fn record(&self, host: Option<HostId>) -> RunRecord {
        RunRecord {
            host,
            dry_run: self.dry_run,
            started_at: self.started_at,
            ended_at: self.ended_at,
            reports: self.reports.clone(),
        }
    }
}

/// Reconcile a policy against the host behind `env`.
///
/// Resources are walked strictly in topological order, one `stat`+`fixup`
/// pair in flight at a time, so a dependent always sees its providers
/// already reconciled. When a fixup actually changed something, its
/// dependents are notified synchronously, before their own `stat` runs.
pub fn reconcile(
    policy: &mut Policy,
    env: &mut ResourceEnv,
    templates: &dyn TemplateRenderer,
    dry_run: bool,
) -> Result<RunOutcome, EngineError> {
    let started_at = Utc::now();
    info!(dry_run, resources = policy.len(), "starting reconciliation");

    let order = policy.normalize(env.facts, templates)?;

    let mut reports = Vec::with_capacity(order.len());
    for index in order {
        let id = policy.resource(index).id();
        debug!(resource = %id, "inspecting");

        let report = match policy.resource_mut(index).stat(env) {
            Ok(()) => policy.resource_mut(index).fixup(dry_run, env),
            Err(e) => {
                // the resource cannot be reconciled this run; record the
                // gap and keep going
                warn!(resource = %id, error = %e, "inspection failed");
                let resource = policy.resource(index);
                let mut report = Report::new(resource.kind(), resource.key());
                report.action(format!("inspect: {}", e), ActionOutcome::Failed);
                report
            }
        };

        if report.fixed() {
            for dependent in policy.dependents_of(&id) {
                debug!(provider = %id, dependent = %dependent, "notifying dependent");
                if let Some(dep_index) = policy.index_of(&dependent) {
                    policy.resource_mut(dep_index).notify(&id);
                }
            }
        }

        reports.push(report);
    }

    let outcome = RunOutcome {
        dry_run,
        started_at,
        ended_at: Utc::now(),
        reports,
    };
    info!(
        resources = outcome.reports.len(),
        fixes = outcome.fixes(),
        failed = outcome.failed(),
        "reconciliation complete"
    );
    Ok(outcome)
}
