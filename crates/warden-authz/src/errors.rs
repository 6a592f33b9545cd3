use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid {kind}: {value:?}")]
    InvalidName { kind: &'static str, value: String },
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error("invalid binding: {0}")]
    InvalidBinding(String),
    #[error("invalid policy definition: {0}")]
    InvalidDefinition(String),
    #[error("invalid role reference: {0}")]
    InvalidReference(String),
    #[error("bundle digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("bundle encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type AuthzResult<T> = Result<T, AuthzError>;
