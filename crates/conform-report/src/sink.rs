use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::report::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

/// One reconcile run: the ordered resource reports plus timing. The
/// central (master) variant ties the run to a host id; the agent-local
/// variant leaves `host` unset and the duration stands on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub host: Option<HostId>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub reports: Vec<Report>,
}

impl RunRecord {
    pub fn duration(&self) -> Duration {
        self.ended_at - self.started_at
    }

    /// Whether any report in the run contains a failed action.
    pub fn failed(&self) -> bool {
        self.reports.iter().any(|r| !r.compliant())
    }
}

pub trait ReportSink {
    /// Get or create the id for `hostname`.
    fn record_host(&mut self, hostname: &str) -> Result<HostId, SinkError>;

    /// Append a run; reports and their actions keep insertion order.
    fn record_run(&mut self, run: &RunRecord) -> Result<RunId, SinkError>;
}
