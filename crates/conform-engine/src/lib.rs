mod engine;
mod error;

pub use engine::{reconcile, RunOutcome};
pub use error::EngineError;
