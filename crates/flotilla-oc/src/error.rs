//!
//! # Errors
//!
//! [`ApiError`] is what the admin surface returns to embedding layers;
//! every variant maps onto a stable [`StatusCode`]. Control-loop failures
//! do not surface here: reconcilers record them as Degraded conditions and
//! retry with backoff.

use flotilla_metadata::extended::ObjectType;
use flotilla_metadata::key::ObjectKey;
use flotilla_types::Generation;

/// admin result codes, stable across embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    NotFound,
    Conflict,
    ValidationError,
    Unavailable,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} '{key}' not found")]
    NotFound { kind: ObjectType, key: ObjectKey },

    #[error("stale write to '{key}': presented {presented:?}, current generation {current}")]
    Conflict {
        key: ObjectKey,
        presented: Option<Generation>,
        current: Generation,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::ValidationError,
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::Conflict { .. } => StatusCode::Conflict,
            Self::Unavailable(_) => StatusCode::Unavailable,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: ObjectType, key: ObjectKey) -> Self {
        Self::NotFound { kind, key }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_api_error_codes() {
        assert_eq!(
            ApiError::validation("image must not be empty").code(),
            StatusCode::ValidationError
        );
        assert_eq!(
            ApiError::not_found(ObjectType::Deployment, ObjectKey::named("web")).code(),
            StatusCode::NotFound
        );
        assert_eq!(
            ApiError::Conflict {
                key: ObjectKey::named("web"),
                presented: Some(1),
                current: 2,
            }
            .code(),
            StatusCode::Conflict
        );
        assert_eq!(
            ApiError::Unavailable("dispatcher stopped".to_owned()).code(),
            StatusCode::Unavailable
        );
    }
}
