//! Error types for the Grafana provider.

use thiserror::Error;

use crate::client::GrafanaError;

/// Errors returned by provider operations.
///
/// At the gRPC boundary every error is turned into an error diagnostic, so
/// the message should read well on its own.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider is not configured or its configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource already exists (create conflict).
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Quota or rate limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Grafana is temporarily unavailable or unreachable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation failed due to current remote state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Operation not supported for this type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Any other error reported by the Grafana API.
    #[error("Grafana API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },
}

impl ProviderError {
    /// Get the error message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::AlreadyExists(msg)
            | Self::PermissionDenied(msg)
            | Self::ResourceExhausted(msg)
            | Self::Unavailable(msg)
            | Self::FailedPrecondition(msg)
            | Self::Unimplemented(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Api { message, .. } => message,
        }
    }

    /// Whether this error means the remote object is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<GrafanaError> for ProviderError {
    fn from(err: GrafanaError) -> Self {
        match err {
            GrafanaError::Api { status, message } => match status {
                404 => ProviderError::NotFound(message),
                401 | 403 => ProviderError::PermissionDenied(message),
                409 => ProviderError::AlreadyExists(message),
                412 => ProviderError::FailedPrecondition(message),
                429 => ProviderError::ResourceExhausted(message),
                500..=599 => ProviderError::Unavailable(format!("{} ({})", message, status)),
                _ => ProviderError::Api { status, message },
            },
            GrafanaError::Network(e) => ProviderError::Unavailable(e.to_string()),
            GrafanaError::Decode { what, message } => {
                ProviderError::Validation(format!("unexpected {} payload: {}", what, message))
            },
            GrafanaError::InvalidConfig(msg) => ProviderError::Configuration(msg),
        }
    }
}
