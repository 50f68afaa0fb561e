use thiserror::Error;

/// An OS-facing provider call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{op}: {detail}")]
pub struct ProviderError {
    pub op: &'static str,
    pub detail: String,
}

impl ProviderError {
    pub fn new(op: &'static str, detail: impl Into<String>) -> Self {
        ProviderError { op, detail: detail.into() }
    }
}
