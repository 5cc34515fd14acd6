use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::payment_provider::PaymentGatewayError;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Payment amount mismatch: expected 29900, charged 19900",
    "code": "amount_mismatch",
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Human-readable error description
    #[schema(example = "Payment not completed")]
    pub error: String,
    /// Machine-readable error code
    #[schema(example = "payment_not_completed")]
    pub code: String,
    /// Unique request identifier for support and reconciliation
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    #[schema(example = "2024-12-09T10:30:00.000Z")]
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Checkout session not found: {0}")]
    SessionNotFound(String),

    #[error("Payment not completed")]
    PaymentNotCompleted,

    #[error("Malformed session: {0}")]
    MalformedSession(String),

    #[error("User mismatch")]
    UserMismatch,

    #[error("Payment amount mismatch: expected {expected}, charged {actual}")]
    AmountMismatch { expected: i64, actual: i64 },

    #[error("Payment provider error: {0}")]
    PaymentProviderError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::ValidationError(rejection.body_text())
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        ServiceError::Unauthenticated(err.to_string())
    }
}

impl From<PaymentGatewayError> for ServiceError {
    fn from(err: PaymentGatewayError) -> Self {
        ServiceError::PaymentProviderError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::ProductUnavailable(_) | Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::PaymentNotCompleted => StatusCode::PAYMENT_REQUIRED,
            Self::MalformedSession(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UserMismatch => StatusCode::FORBIDDEN,
            Self::AmountMismatch { .. } => StatusCode::CONFLICT,
            Self::PaymentProviderError(_) => StatusCode::BAD_GATEWAY,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code carried in the error body
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::ProductUnavailable(_) => "product_unavailable",
            Self::SessionNotFound(_) => "session_not_found",
            Self::PaymentNotCompleted => "payment_not_completed",
            Self::MalformedSession(_) => "malformed_session",
            Self::UserMismatch => "user_mismatch",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::PaymentProviderError(_) => "payment_provider_error",
            Self::DatabaseError(_) => "store_error",
            Self::ValidationError(_) => "validation_error",
            Self::RequestTimeout => "request_timeout",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Provider and store failures return generic messages; details stay in the logs.
    pub fn response_message(&self) -> String {
        match self {
            Self::PaymentProviderError(_) => {
                "Payment provider is temporarily unavailable, please retry".to_string()
            }
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::Unauthenticated(_) => "User not authenticated".to_string(),
            _ => self.to_string(),
        }
    }

    /// True for outcomes the client is expected to hit while polling
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::PaymentNotCompleted)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: self.response_message(),
            code: self.code().to_string(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
