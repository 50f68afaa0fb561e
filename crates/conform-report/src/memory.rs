use crate::error::SinkError;
use crate::sink::{HostId, ReportSink, RunId, RunRecord};

/// In-memory report sink. All data is lost on drop; suitable for tests
/// and runs without a `--report-db`.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    hosts: Vec<String>,
    runs: Vec<RunRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

impl ReportSink for MemorySink {
    fn record_host(&mut self, hostname: &str) -> Result<HostId, SinkError> {
        if let Some(i) = self.hosts.iter().position(|h| h == hostname) {
            return Ok(HostId(i as u64 + 1));
        }
        self.hosts.push(hostname.to_string());
        Ok(HostId(self.hosts.len() as u64))
    }

    fn record_run(&mut self, run: &RunRecord) -> Result<RunId, SinkError> {
        self.runs.push(run.clone());
        Ok(RunId(self.runs.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conform_domain::ResourceKind;
    use crate::report::{ActionOutcome, Report};

    fn run_for(host: Option<HostId>) -> RunRecord {
        let mut report = Report::new(ResourceKind::Package, "nginx");
        report.action("install package (latest version)", ActionOutcome::Succeeded);
        let now = Utc::now();
        RunRecord { host, dry_run: false, started_at: now, ended_at: now, reports: vec![report] }
    }

    #[test]
    fn record_host_is_get_or_create() {
        let mut sink = MemorySink::new();
        let a = sink.record_host("web01").unwrap();
        let b = sink.record_host("db01").unwrap();
        let again = sink.record_host("web01").unwrap();

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(sink.hosts().len(), 2);
    }

    #[test]
    fn runs_are_appended_in_order() {
        let mut sink = MemorySink::new();
        let host = sink.record_host("web01").unwrap();

        let first = sink.record_run(&run_for(Some(host))).unwrap();
        let second = sink.record_run(&run_for(None)).unwrap();

        assert_eq!(first, RunId(1));
        assert_eq!(second, RunId(2));
        assert_eq!(sink.runs().len(), 2);
        assert_eq!(sink.runs()[0].host, Some(host));
        assert_eq!(sink.runs()[1].host, None);
    }
}
