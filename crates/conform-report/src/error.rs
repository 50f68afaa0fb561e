use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("report store error: {0}")]
    Storage(String),
}
