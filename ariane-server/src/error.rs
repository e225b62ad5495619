//! API error handling module
//!
//! Provides a unified error type for all API endpoints. Token and ceremony
//! failures are deliberately collapsed into a couple of generic client messages
//! so a response never tells an attacker which check failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use ariane_core::ArianeError;

use crate::credentials::StorageError;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthorized - missing or invalid authentication
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden - authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - required service is not configured or available
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Bad gateway - an upstream provider answered with an error
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Identity-layer error
    #[error("Ariane error: {0}")]
    Ariane(#[from] ArianeError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Create a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Create a bad gateway error
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::BadGateway(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Ariane(ref e) => match e {
                ArianeError::InvalidSignature
                | ArianeError::Expired
                | ArianeError::ChallengeReplayed
                | ArianeError::UnknownCredential => StatusCode::BAD_REQUEST,

                ArianeError::CounterRegression { .. } | ArianeError::CeremonyRejected(_) => {
                    StatusCode::UNAUTHORIZED
                }

                ArianeError::RegistrationClosed => StatusCode::FORBIDDEN,

                ArianeError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

                ArianeError::MissingConfiguration(_)
                | ArianeError::Storage(_)
                | ArianeError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::BadGateway(_) => "UPSTREAM_ERROR",
            Self::Ariane(ref e) => match e {
                ArianeError::InvalidSignature
                | ArianeError::Expired
                | ArianeError::ChallengeReplayed => "INVALID_TOKEN",
                ArianeError::UnknownCredential => "UNKNOWN_CREDENTIAL",
                ArianeError::CounterRegression { .. } | ArianeError::CeremonyRejected(_) => {
                    "VERIFICATION_FAILED"
                }
                ArianeError::RegistrationClosed => "REGISTRATION_CLOSED",
                ArianeError::MissingConfiguration(_) => "NOT_CONFIGURED",
                ArianeError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
                ArianeError::Storage(_) => "STORAGE_ERROR",
                ArianeError::Serialization(_) => "SERIALIZATION_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    pub fn client_message(&self) -> String {
        match self {
            Self::Ariane(ref e) => match e {
                ArianeError::InvalidSignature
                | ArianeError::Expired
                | ArianeError::ChallengeReplayed => "Invalid or expired challenge".to_string(),
                ArianeError::UnknownCredential => "Unknown credential".to_string(),
                ArianeError::CounterRegression { .. } | ArianeError::CeremonyRejected(_) => {
                    "Verification failed".to_string()
                }
                ArianeError::RegistrationClosed => "Registration is closed".to_string(),
                ArianeError::MissingConfiguration(_) => "Server not configured".to_string(),
                ArianeError::UpstreamUnavailable(_) => "Upstream service unavailable".to_string(),
                ArianeError::Storage(_) => "Credential storage error".to_string(),
                ArianeError::Serialization(_) => "Serialization error".to_string(),
            },
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::BadGateway(_) => "bad_gateway",
            Self::Ariane(_) => "identity",
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::Ariane(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_failures_are_indistinguishable() {
        let errors = [
            ApiError::from(ArianeError::InvalidSignature),
            ApiError::from(ArianeError::Expired),
            ApiError::from(ArianeError::ChallengeReplayed),
        ];
        for err in &errors {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert_eq!(err.error_code(), "INVALID_TOKEN");
            assert_eq!(err.client_message(), "Invalid or expired challenge");
        }
    }

    #[test]
    fn test_verification_failures_hide_detail() {
        let regression = ApiError::from(ArianeError::CounterRegression {
            stored: 5,
            received: 5,
        });
        let rejected = ApiError::from(ArianeError::CeremonyRejected("bad origin".into()));

        for err in [&regression, &rejected] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert_eq!(err.client_message(), "Verification failed");
        }
        // Internal detail is still available for logs
        assert!(regression.to_string().contains("stored=5"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(ArianeError::UnknownCredential).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ArianeError::RegistrationClosed).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(ArianeError::MissingConfiguration("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ArianeError::UpstreamUnavailable("idp".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(StorageError::Query("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bad_gateway() {
        let err = ApiError::bad_gateway("token exchange failed");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.error_code(), "UPSTREAM_ERROR");
    }

    #[test]
    fn test_internal_message_not_leaked() {
        let err = ApiError::internal("connection string postgres://secret");
        assert_eq!(err.client_message(), "Internal server error");
    }
}
