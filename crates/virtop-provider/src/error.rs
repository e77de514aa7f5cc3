//! Provider error types
//!
//! Error definitions with transient/permanent classification, plus the
//! mapping into the core reconciliation taxonomy.

use thiserror::Error;

use virtop_core::CoreError;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Error that can occur when talking to the external provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    // Connection errors (usually transient)
    /// Failed to establish a connection to the platform.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Platform is temporarily unavailable.
    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    // Authentication errors (permanent)
    /// Invalid credentials.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration errors (permanent)
    /// Provider configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Operation errors
    /// Object not found on the platform (delete/update target missing).
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Object already exists on the platform (create conflict).
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Operation failed on the platform.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request was rejected as invalid by the platform.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Internal errors
    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ProviderError {
    /// Check if this error is transient and the operation should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::ConnectionFailed { .. }
                | ProviderError::ConnectionTimeout { .. }
                | ProviderError::Unavailable { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Check if this error means the target object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::ObjectNotFound { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProviderError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ProviderError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ProviderError::Unavailable { .. } => "UNAVAILABLE",
            ProviderError::AuthenticationFailed => "AUTH_FAILED",
            ProviderError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ProviderError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ProviderError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ProviderError::OperationFailed { .. } => "OPERATION_FAILED",
            ProviderError::InvalidData { .. } => "INVALID_DATA",
            ProviderError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ProviderError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        ProviderError::Unavailable {
            message: message.into(),
        }
    }

    /// Create an object-not-found error.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        ProviderError::ObjectNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ProviderError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ProviderError::InvalidData {
            message: message.into(),
        }
    }
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ObjectNotFound { identifier } => CoreError::NotFound {
                kind: "ProviderObject".to_string(),
                name: identifier,
            },
            ProviderError::InvalidData { message }
            | ProviderError::InvalidConfiguration { message } => CoreError::Validation { message },
            err if err.is_transient() => CoreError::ProviderUnavailable {
                message: err.to_string(),
                source: Some(Box::new(err)),
            },
            err => CoreError::Internal {
                message: err.to_string(),
                source: Some(Box::new(err)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::connection_failed("refused").is_transient());
        assert!(ProviderError::unavailable("maintenance").is_transient());
        assert!(ProviderError::not_found("vm-1").is_permanent());
        assert!(ProviderError::AuthenticationFailed.is_permanent());
    }

    #[test]
    fn test_not_found_maps_to_core_not_found() {
        let core: CoreError = ProviderError::not_found("vm-1").into();
        assert!(core.is_not_found());
    }

    #[test]
    fn test_transient_maps_to_provider_unavailable() {
        let core: CoreError = ProviderError::unavailable("down").into();
        assert_eq!(core.error_code(), "PROVIDER_UNAVAILABLE");
        assert!(core.is_retryable());
    }

    #[test]
    fn test_invalid_data_maps_to_validation() {
        let core: CoreError = ProviderError::invalid_data("bad shape").into();
        assert_eq!(core.error_code(), "VALIDATION_FAILED");
        assert!(!core.is_retryable());
    }
}
