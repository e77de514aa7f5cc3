//! Error taxonomy for the reconciliation core
//!
//! Error definitions with retryable/terminal classification. Every
//! sub-operation error a reconcile pass produces is captured and combined
//! into an [`CoreError::Aggregate`]; nothing is silently dropped.

use thiserror::Error;

/// Result type alias used throughout the reconciliation core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error that can occur during a reconcile or sync pass.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record or external object does not exist.
    ///
    /// Treated as success for delete idempotence and as non-existence for
    /// existence checks.
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    /// An optimistic-concurrency write lost the race.
    ///
    /// The caller retries the entire reconcile pass, not the failed sub-step.
    #[error("conflict writing {kind} {name}: record changed since it was read")]
    Conflict { kind: String, name: String },

    /// The external provider is temporarily unreachable.
    #[error("provider unavailable: {message}")]
    ProviderUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The desired state can never converge as specified.
    ///
    /// Not retryable; surfaced as a False/Error condition on the resource.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// The pass was cancelled cooperatively.
    ///
    /// Partially applied operations remain applied; convergence resumes on
    /// the next pass.
    #[error("operation cancelled")]
    Cancelled,

    /// Multiple sub-operation failures combined into one.
    #[error("{} errors occurred: [{}]", .0.len(), join_errors(.0))]
    Aggregate(Vec<CoreError>),

    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

fn join_errors(errors: &[CoreError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CoreError {
    /// Check if retrying the pass may resolve this error.
    ///
    /// Conflicts and provider outages are transient; an aggregate is
    /// retryable as a whole. Validation failures require a spec change.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Conflict { .. } | CoreError::ProviderUnavailable { .. } => true,
            CoreError::NotFound { .. } => true,
            CoreError::Aggregate(_) => true,
            CoreError::Validation { .. } | CoreError::Cancelled | CoreError::Internal { .. } => {
                false
            }
        }
    }

    /// Check if this error (or any error inside an aggregate) is NotFound.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }

    /// Check if this error is an optimistic-concurrency conflict, directly
    /// or anywhere inside an aggregate.
    pub fn is_conflict(&self) -> bool {
        match self {
            CoreError::Conflict { .. } => true,
            CoreError::Aggregate(errors) => errors.iter().any(CoreError::is_conflict),
            _ => false,
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Conflict { .. } => "CONFLICT",
            CoreError::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            CoreError::Validation { .. } => "VALIDATION_FAILED",
            CoreError::Cancelled => "CANCELLED",
            CoreError::Aggregate(_) => "PARTIAL_FAILURE",
            CoreError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Combine collected sub-operation errors into a single result.
    ///
    /// An empty list is success, a single error is returned as-is, and
    /// multiple errors become [`CoreError::Aggregate`]. Nested aggregates
    /// are flattened.
    pub fn aggregate(errors: Vec<CoreError>) -> Result<()> {
        let mut flat = Vec::new();
        for err in errors {
            match err {
                CoreError::Aggregate(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.is_empty() {
            Ok(())
        } else if flat.len() == 1 {
            Err(flat.remove(0))
        } else {
            Err(CoreError::Aggregate(flat))
        }
    }

    // Convenience constructors

    /// Create a NotFound error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a Conflict error.
    pub fn conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        CoreError::Conflict {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a ProviderUnavailable error.
    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        CoreError::ProviderUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        CoreError::Internal {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_ok() {
        assert!(CoreError::aggregate(Vec::new()).is_ok());
    }

    #[test]
    fn test_aggregate_carrying_conflict_is_conflict() {
        let err = CoreError::aggregate(vec![
            CoreError::provider_unavailable("volume service down"),
            CoreError::conflict("ManagedResource", "default/vm-1"),
        ])
        .unwrap_err();
        assert!(err.is_conflict());

        let err = CoreError::aggregate(vec![
            CoreError::provider_unavailable("volume service down"),
            CoreError::internal("boom"),
        ])
        .unwrap_err();
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_aggregate_single_is_unwrapped() {
        let err = CoreError::aggregate(vec![CoreError::not_found("CatalogItem", "img-1")])
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_aggregate_flattens_nested() {
        let inner = CoreError::Aggregate(vec![
            CoreError::not_found("CatalogItem", "a"),
            CoreError::not_found("CatalogItem", "b"),
        ]);
        let err =
            CoreError::aggregate(vec![inner, CoreError::validation("bad spec")]).unwrap_err();
        match err {
            CoreError::Aggregate(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected aggregate, got {other}"),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CoreError::conflict("ManagedResource", "vm").is_retryable());
        assert!(CoreError::provider_unavailable("timeout").is_retryable());
        assert!(!CoreError::validation("bad").is_retryable());
        assert!(!CoreError::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            CoreError::Aggregate(Vec::new()).error_code(),
            "PARTIAL_FAILURE"
        );
    }

    #[test]
    fn test_aggregate_display_joins_messages() {
        let err = CoreError::Aggregate(vec![
            CoreError::validation("one"),
            CoreError::validation("two"),
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("2 errors occurred"));
        assert!(rendered.contains("one"));
        assert!(rendered.contains("two"));
    }
}
