pub mod error;
pub mod memory;
pub mod redb_sink;
pub mod report;
pub mod sink;

pub use error::SinkError;
pub use memory::MemorySink;
pub use redb_sink::RedbSink;
pub use report::{Action, ActionOutcome, Report};
pub use sink::{HostId, ReportSink, RunId, RunRecord};
