use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("wire tag mismatch: expected '{expected}'")]
    Tag { expected: String },

    #[error("truncated encoding while reading {what}")]
    Truncated { what: &'static str },

    #[error("malformed {what}: '{found}'")]
    Malformed { what: &'static str, found: String },

    #[error("trailing data after closing brace")]
    Trailing,
}
