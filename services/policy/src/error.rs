//! Error taxonomy shared by the registries, the resolver and the bundle
//! compiler.
//!
//! # Notes
//! Each variant maps to exactly one HTTP status in `api::error`. Store and
//! model errors convert losslessly into this type so registry code can use `?`.
use crate::store::StoreError;
use thiserror::Error;
use warden_authz::AuthzError;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

impl PolicyError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Stable machine-readable code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::Conflict(_) => "conflict",
            Self::InvalidReference(_) => "invalid_reference",
            Self::ValidationFailed(_) => "validation_error",
            Self::Unavailable(_) => "unavailable",
            Self::Unexpected(_) => "internal",
        }
    }
}

impl From<StoreError> for PolicyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => Self::NotFound(message),
            StoreError::AlreadyExists(message) => Self::AlreadyExists(message),
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::InvalidReference(message) => Self::InvalidReference(message),
            StoreError::Unavailable(message) => Self::Unavailable(message),
            StoreError::Unexpected(err) => Self::Unexpected(err),
        }
    }
}

impl From<AuthzError> for PolicyError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::InvalidReference(message) => Self::InvalidReference(message),
            AuthzError::Encoding(err) => Self::Unexpected(err.into()),
            mismatch @ AuthzError::DigestMismatch { .. } => {
                Self::Unexpected(anyhow::Error::new(mismatch))
            }
            other => Self::ValidationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_one_to_one() {
        let cases = [
            (StoreError::NotFound("x".into()), "not_found"),
            (StoreError::AlreadyExists("x".into()), "already_exists"),
            (StoreError::Conflict("x".into()), "conflict"),
            (StoreError::InvalidReference("x".into()), "invalid_reference"),
            (StoreError::Unavailable("x".into()), "unavailable"),
            (StoreError::Unexpected(anyhow::anyhow!("boom")), "internal"),
        ];
        for (store_err, code) in cases {
            assert_eq!(PolicyError::from(store_err).code(), code);
        }
    }

    #[test]
    fn authz_errors_become_validation_failures() {
        let err = PolicyError::from(AuthzError::InvalidRole("no namespace".into()));
        assert!(matches!(err, PolicyError::ValidationFailed(_)));
        let err = PolicyError::from(AuthzError::InvalidReference("viewer".into()));
        assert!(matches!(err, PolicyError::InvalidReference(_)));
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(PolicyError::Unavailable("timeout".into()).is_retryable());
        assert!(!PolicyError::Conflict("race".into()).is_retryable());
    }
}
