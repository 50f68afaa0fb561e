use conform_domain::{CodecError, ResourceKind};
use conform_provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("unknown attribute '{name}' for {kind} resources")]
    InvalidAttribute { kind: ResourceKind, name: String },

    #[error("invalid value '{value}' for attribute '{name}'")]
    InvalidValue { name: String, value: String },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
