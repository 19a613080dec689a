//! Provider error types.
//!
//! This module defines the errors a provider adapter can report back to the harness.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur while talking to a managed-resource provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ProviderError {
    /// The requested resource does not exist on the remote side.
    #[error("Resource not found: {id}")]
    NotFound {
        /// The identifier that was looked up.
        id: String,
    },

    /// The provider refused to perform the requested change.
    #[error("Change rejected: {message}")]
    Rejected {
        /// Description of why the change was rejected.
        message: String,
    },

    /// The provider asked the caller to slow down.
    #[error("Request throttled: {message}")]
    Throttled {
        /// Description returned by the provider.
        message: String,
    },

    /// Failed to reach the provider.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// A provider-specific error identified by a remote error code.
    ///
    /// Adapters classify these through [`crate::ProviderAdapter::is_not_found`].
    #[error("Remote error {code}: {message}")]
    Remote {
        /// The provider's error code, e.g. `DBClusterNotFoundFault`.
        code: String,
        /// Message attached to the error.
        message: String,
    },

    /// An internal adapter error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl ProviderError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a new `Rejected` error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates a new `Throttled` error.
    #[must_use]
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Throttled {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Remote` error carrying a provider error code.
    #[must_use]
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is the generic not found error.
    ///
    /// Provider-specific codes (`Remote`) are never classified here.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a throttling error.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Returns the remote error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Rejected { .. } => ErrorCategory::Rejected,
            Self::Throttled { .. } => ErrorCategory::Transient,
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Remote { .. } => ErrorCategory::Remote,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of provider errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Resource not found.
    NotFound,
    /// The provider refused the change.
    Rejected,
    /// Throttling or other condition expected to clear on its own.
    Transient,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Unclassified provider-specific error.
    Remote,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Rejected => write!(f, "rejected"),
            Self::Transient => write!(f, "transient"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Remote => write!(f, "remote"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::not_found("tf-aurora-cluster-42");
        assert_eq!(err.to_string(), "Resource not found: tf-aurora-cluster-42");

        let err = ProviderError::remote("DBClusterNotFoundFault", "cluster gone");
        assert_eq!(
            err.to_string(),
            "Remote error DBClusterNotFoundFault: cluster gone"
        );

        let err = ProviderError::rejected("invalid parameter group");
        assert_eq!(err.to_string(), "Change rejected: invalid parameter group");
    }

    #[test]
    fn test_error_predicates() {
        assert!(ProviderError::not_found("x").is_not_found());
        assert!(!ProviderError::remote("DBClusterNotFoundFault", "").is_not_found());
        assert!(ProviderError::throttled("slow down").is_throttled());
        assert_eq!(
            ProviderError::remote("Throttling", "").code(),
            Some("Throttling")
        );
        assert_eq!(ProviderError::internal("boom").code(), None);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            ProviderError::not_found("x").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            ProviderError::throttled("x").category(),
            ErrorCategory::Transient
        );
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
