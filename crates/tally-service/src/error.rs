//! API error types and responses.
//!
//! Every error renders as `{"error": <message>, "code": <code>}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tally_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Webhook signature missing or invalid.
    #[error("{0}")]
    Authentication(String),

    /// Bad request - invalid input.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid admin credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// The ledger has no credits left.
    #[error("insufficient credits: balance={balance}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
    },

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Conflict - resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// An upstream provider failed.
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    /// HTTP status of the error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Authentication(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication_failed",
            Self::Validation(_) => "validation_error",
            Self::Unauthorized => "unauthorized",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
            Self::Upstream(_) => "upstream_error",
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                "An internal error occurred".to_string()
            }
            Self::Upstream(msg) => {
                tracing::warn!(error = %msg, "Upstream provider error");
                msg.clone()
            }
            Self::InsufficientCredits { .. } => "Insufficient credits".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            code: self.code(),
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::AlreadyExists { entity, id } => {
                Self::Conflict(format!("{entity} already exists: {id}"))
            }
            StoreError::InsufficientBalance { balance, .. } => Self::InsufficientCredits { balance },
            StoreError::DuplicateEvent { event_id } => {
                Self::Conflict(format!("event {event_id} already processed"))
            }
            StoreError::Database(msg)
            | StoreError::Serialization(msg)
            | StoreError::InvalidDelta(msg) => Self::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Authentication("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InsufficientCredits { balance: 0 }.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::Upstream("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn store_errors_map_to_api_errors() {
        let err: ApiError = StoreError::InsufficientBalance {
            balance: 0,
            requested: -1,
        }
        .into();
        assert!(matches!(err, ApiError::InsufficientCredits { balance: 0 }));

        let err: ApiError = StoreError::ledger_not_found("u1").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = StoreError::Database("disk".into()).into();
        assert_eq!(err.code(), "internal_error");
    }
}
