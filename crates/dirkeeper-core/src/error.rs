//! Error types for directory operations.
//!
//! Every DirKeeper operation reports failures through [`Error`]. Each variant carries a stable
//! error code so that tool hosts can branch on the failure kind without parsing messages.

use serde::Serialize;
use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration could not be resolved or is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The directory server could not be reached or the bind was rejected
    #[error("Failed to connect to directory server: {0}")]
    ConnectionFailed(String),

    /// Requested entry or base does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Search filter was rejected by the client parser or the server
    #[error("Invalid LDAP filter syntax: {0}")]
    InvalidFilter(String),

    /// Unknown search scope name
    #[error("Invalid scope: {0} (expected BASE, ONELEVEL or SUBTREE)")]
    InvalidScope(String),

    /// Operation timed out
    #[error("Timeout waiting for directory server: {0}")]
    Timeout(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// External service error
    #[error("External service error: {service}: {message}")]
    ExternalServiceError {
        /// Service name that failed
        service: String,
        /// Error message
        message: String,
    },

    /// Response could not be serialized
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
    /// Name of the tool that produced the error, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidFilter(_) => "INVALID_FILTER",
            Self::InvalidScope(_) => "INVALID_SCOPE",
            Self::Timeout(_) => "TIMEOUT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        self.into_error_response_for(None)
    }

    /// Converts the error into an `ErrorResponse` attributed to a tool.
    #[must_use]
    pub fn into_error_response_for(self, tool: Option<String>) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details: None,
            },
            tool,
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::InternalError(_)
                | Self::ConfigError(_)
                | Self::ConnectionFailed(_)
                | Self::ExternalServiceError { .. }
                | Self::SerializationError(_)
        )
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            Error::ConnectionFailed("test".to_string()).error_code(),
            "CONNECTION_FAILED"
        );
        assert_eq!(
            Error::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            Error::InvalidRequest("test".to_string()).error_code(),
            "INVALID_REQUEST"
        );
        assert_eq!(
            Error::InvalidFilter("test".to_string()).error_code(),
            "INVALID_FILTER"
        );
        assert_eq!(
            Error::InvalidScope("test".to_string()).error_code(),
            "INVALID_SCOPE"
        );
        assert_eq!(Error::Timeout("test".to_string()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::ValidationError("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            Error::ExternalServiceError {
                service: "test".to_string(),
                message: "msg".to_string()
            }
            .error_code(),
            "EXTERNAL_SERVICE_ERROR"
        );
        assert_eq!(
            Error::SerializationError("test".to_string()).error_code(),
            "SERIALIZATION_ERROR"
        );
        assert_eq!(
            Error::InternalError("test".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidScope("INVALID".to_string());
        assert!(err.to_string().contains("Invalid scope"));
        assert!(err.to_string().contains("INVALID"));

        let err = Error::ExternalServiceError {
            service: "ldap".to_string(),
            message: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "External service error: ldap: busy");

        let err = Error::InvalidFilter("(uid=x".to_string());
        assert!(err.to_string().contains("filter syntax"));
    }

    #[test]
    fn test_into_error_response() {
        let err = Error::NotFound("User 'ghost' not found".to_string());
        let response = err.clone().into_error_response();

        assert_eq!(response.error.code, "NOT_FOUND");
        assert_eq!(response.error.message, "Not found: User 'ghost' not found");
        assert!(response.tool.is_none());

        let response = err.into_error_response_for(Some("get_user_details".to_string()));
        assert_eq!(response.tool.as_deref(), Some("get_user_details"));
    }

    #[test]
    fn test_should_log() {
        assert!(Error::InternalError("test".to_string()).should_log());
        assert!(Error::ConnectionFailed("test".to_string()).should_log());
        assert!(Error::ExternalServiceError {
            service: "test".to_string(),
            message: "msg".to_string()
        }
        .should_log());

        assert!(!Error::NotFound("test".to_string()).should_log());
        assert!(!Error::InvalidFilter("test".to_string()).should_log());
        assert!(!Error::InvalidScope("test".to_string()).should_log());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ConfigError(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::SerializationError(_)));
    }

    #[test]
    fn test_error_response_serialization_no_tool() {
        let response = Error::Timeout("search".to_string()).into_error_response();
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("TIMEOUT"));
        assert!(!json.contains("tool"));
    }
}
