//! Domain-level error type shared across crates.
//!
//! HTTP-specific mapping lives in `stillpoint_api::error`; worker retry
//! classification lives in `stillpoint_worker`. This enum only carries
//! the domain meaning.

use crate::types::DbId;

/// Domain error for repository and service layers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup failed.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"GenerationRequest"`.
        entity: &'static str,
        id: DbId,
    },

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// A credit reservation could not be satisfied.
    #[error("Insufficient credits")]
    InsufficientCredits {
        /// The amount the operation required.
        required: i64,
    },

    /// The caller is not authenticated.
    #[error("{0}")]
    Unauthorized(String),

    /// The caller is authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// A conflicting state change (e.g. duplicate insert).
    #[error("{0}")]
    Conflict(String),

    /// Anything unexpected. The message is logged, never shown to users.
    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        Self::NotFound { entity, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_the_entity() {
        let err = CoreError::not_found("GenerationRequest", 42);
        assert_eq!(err.to_string(), "GenerationRequest with id 42 not found");
    }

    #[test]
    fn insufficient_credits_carries_required_amount() {
        let err = CoreError::InsufficientCredits { required: 8 };
        match err {
            CoreError::InsufficientCredits { required } => assert_eq!(required, 8),
            _ => panic!("wrong variant"),
        }
    }
}
