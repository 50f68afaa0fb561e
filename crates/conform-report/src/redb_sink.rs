use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::SinkError;
use crate::sink::{HostId, ReportSink, RunId, RunRecord};

const HOSTS: TableDefinition<&str, u64> = TableDefinition::new("hosts");
const RUNS: TableDefinition<u64, &[u8]> = TableDefinition::new("runs");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Persistent report sink backed by a redb database file.
///
/// Runs survive process restarts; host ids are stable across runs.
pub struct RedbSink {
    db: Database,
}

impl RedbSink {
    /// Open (or create) a report database at `path`.
    ///
    /// Parent directories are created automatically.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::Storage(e.to_string()))?;
        }
        let db = Database::create(path).map_err(|e| SinkError::Storage(e.to_string()))?;

        // Ensure tables exist
        {
            let wtxn = db.begin_write().map_err(|e| SinkError::Storage(e.to_string()))?;
            wtxn.open_table(HOSTS).map_err(|e| SinkError::Storage(e.to_string()))?;
            wtxn.open_table(RUNS).map_err(|e| SinkError::Storage(e.to_string()))?;
            wtxn.open_table(META).map_err(|e| SinkError::Storage(e.to_string()))?;
            wtxn.commit().map_err(|e| SinkError::Storage(e.to_string()))?;
        }

        Ok(Self { db })
    }

    pub fn run(&self, id: RunId) -> Result<Option<RunRecord>, SinkError> {
        let rtxn = self.db.begin_read().map_err(|e| SinkError::Storage(e.to_string()))?;
        let table = rtxn.open_table(RUNS).map_err(|e| SinkError::Storage(e.to_string()))?;
        match table.get(id.0).map_err(|e| SinkError::Storage(e.to_string()))? {
            Some(guard) => {
                let run: RunRecord = serde_json::from_slice(guard.value())?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    pub fn list_runs(&self) -> Result<Vec<(RunId, RunRecord)>, SinkError> {
        let rtxn = self.db.begin_read().map_err(|e| SinkError::Storage(e.to_string()))?;
        let table = rtxn.open_table(RUNS).map_err(|e| SinkError::Storage(e.to_string()))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(|e| SinkError::Storage(e.to_string()))? {
            let (k, v) = entry.map_err(|e| SinkError::Storage(e.to_string()))?;
            let run: RunRecord = serde_json::from_slice(v.value())?;
            results.push((RunId(k.value()), run));
        }
        Ok(results)
    }
}

impl ReportSink for RedbSink {
    fn record_host(&mut self, hostname: &str) -> Result<HostId, SinkError> {
        {
            let rtxn = self.db.begin_read().map_err(|e| SinkError::Storage(e.to_string()))?;
            let table = rtxn.open_table(HOSTS).map_err(|e| SinkError::Storage(e.to_string()))?;
            if let Some(guard) = table.get(hostname).map_err(|e| SinkError::Storage(e.to_string()))? {
                return Ok(HostId(guard.value()));
            }
        }

        let wtxn = self.db.begin_write().map_err(|e| SinkError::Storage(e.to_string()))?;
        let id = {
            let mut meta = wtxn.open_table(META).map_err(|e| SinkError::Storage(e.to_string()))?;
            let seq = meta
                .get("host_seq")
                .map_err(|e| SinkError::Storage(e.to_string()))?
                .map(|g| g.value())
                .unwrap_or(0);
            let new_seq = seq + 1;
            meta.insert("host_seq", new_seq).map_err(|e| SinkError::Storage(e.to_string()))?;

            let mut hosts = wtxn.open_table(HOSTS).map_err(|e| SinkError::Storage(e.to_string()))?;
            hosts.insert(hostname, new_seq).map_err(|e| SinkError::Storage(e.to_string()))?;
            new_seq
        };
        wtxn.commit().map_err(|e| SinkError::Storage(e.to_string()))?;
        Ok(HostId(id))
    }

    fn record_run(&mut self, run: &RunRecord) -> Result<RunId, SinkError> {
        let bytes = serde_json::to_vec(run)?;
        let wtxn = self.db.begin_write().map_err(|e| SinkError::Storage(e.to_string()))?;
        let id = {
            let mut meta = wtxn.open_table(META).map_err(|e| SinkError::Storage(e.to_string()))?;
            let seq = meta
                .get("run_seq")
                .map_err(|e| SinkError::Storage(e.to_string()))?
                .map(|g| g.value())
                .unwrap_or(0);
            let new_seq = seq + 1;
            meta.insert("run_seq", new_seq).map_err(|e| SinkError::Storage(e.to_string()))?;

            let mut runs = wtxn.open_table(RUNS).map_err(|e| SinkError::Storage(e.to_string()))?;
            runs.insert(new_seq, bytes.as_slice()).map_err(|e| SinkError::Storage(e.to_string()))?;
            new_seq
        };
        wtxn.commit().map_err(|e| SinkError::Storage(e.to_string()))?;
        Ok(RunId(id))
    }
}
