use conform_policy::PolicyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
}
