//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mailcast_core::{DispatchError, SendError, TrackingError};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

/// Error body: `{ "error": code, "message": text }`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// An error that renders as an [`ErrorResponse`]
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{} not found", what))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.code.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return ApiError::conflict("A record with these values already exists");
            }
            if db.is_foreign_key_violation() {
                return ApiError::validation("A referenced record does not exist");
            }
        }
        error!("Database error: {}", e);
        ApiError::internal("Database error")
    }
}

impl From<mailcast_common::Error> for ApiError {
    fn from(e: mailcast_common::Error) -> Self {
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("{}", e);
        }
        ApiError {
            status,
            code: match e.code() {
                "NOT_FOUND" => "not_found",
                "VALIDATION_ERROR" => "validation_error",
                "CONFLICT" => "conflict",
                "UNAUTHORIZED" => "unauthorized",
                "SMTP_ERROR" => "smtp_error",
                _ => "internal_error",
            },
            message: e.to_string(),
        }
    }
}

impl From<SendError> for ApiError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::SenderNotFound(_) => ApiError::validation(e.to_string()),
            SendError::SenderInactive(_) => ApiError::validation(e.to_string()),
            SendError::NoTransportConfigured => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "no_transport", e.to_string())
            }
            SendError::Transport(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "smtp_error", e.to_string())
            }
            SendError::Database(db) => db.into(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NotFound(_) => ApiError::not_found("Campaign"),
            DispatchError::InvalidStatus(_) => {
                ApiError::new(StatusCode::CONFLICT, "invalid_status", e.to_string())
            }
            DispatchError::NoTargetGroup | DispatchError::EmptyAudience => {
                ApiError::validation(e.to_string())
            }
            DispatchError::Send(send) => send.into(),
            DispatchError::Database(db) => db.into(),
            DispatchError::Internal(msg) => {
                error!("Dispatch failed: {}", msg);
                ApiError::internal(msg)
            }
        }
    }
}

impl From<TrackingError> for ApiError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::Malformed | TrackingError::InvalidSignature => {
                ApiError::not_found("Tracking token")
            }
            TrackingError::EmailNotFound(_) => ApiError::not_found("Email"),
            TrackingError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dispatch_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(DispatchError::EmptyAudience).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(DispatchError::InvalidStatus("sending".into())).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(DispatchError::NotFound(uuid::Uuid::now_v7())).code,
            "not_found"
        );
        assert_eq!(
            ApiError::from(DispatchError::Send(SendError::NoTransportConfigured)).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_common_error_mapping() {
        let err = ApiError::from(mailcast_common::Error::Validation("bad url".into()));
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "validation_error");
    }
}
