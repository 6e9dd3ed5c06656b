//! Error handling for the supply ledger server
//!
//! Every failure leaves the server as `{ "error": { "code", "message", "field"? } }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::LedgerError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Ledger rule violations
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Authentication errors
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient permissions: requires {0}")]
    InsufficientPermissions(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|field| field.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }
}

/// HTTP status for a ledger rule violation
pub fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::RecordNotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::DuplicateSerial { .. }
        | LedgerError::ProposalNotPending { .. }
        | LedgerError::AlreadyApplied { .. } => StatusCode::CONFLICT,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl AppError {
    /// Machine-readable code sent to clients
    pub fn code(&self) -> String {
        self.status_and_detail().1.code
    }

    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Ledger(err) => (ledger_status(err), ErrorDetail::new(err.code(), err.to_string())),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("TOKEN_EXPIRED", "Token has expired"),
            ),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, ErrorDetail::new("INVALID_TOKEN", "Invalid token")),
            AppError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, ErrorDetail::new("UNAUTHORIZED", message.clone())),
            AppError::InsufficientPermissions(permission) => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    format!("Permission denied: requires {}", permission),
                ),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::Conflict(message) => (StatusCode::CONFLICT, ErrorDetail::new("CONFLICT", message.clone())),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", message.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!(code = %detail.code, "Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// A unique-index violation means a concurrent writer got there first
pub fn map_unique_violation(err: sqlx::Error, what: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            AppError::Conflict(format!("{} was changed concurrently", what))
        }
        _ => AppError::DatabaseError(err),
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use shared::RecordKind;

    #[test]
    fn test_ledger_status_mapping() {
        assert_eq!(
            ledger_status(&LedgerError::not_found(RecordKind::Location, "x")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ledger_status(&LedgerError::AlreadyApplied {
                request_id: uuid::Uuid::nil()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ledger_status(&LedgerError::MissingDocument {
                proposal_id: uuid::Uuid::nil()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_ledger_detail_carries_code() {
        let (status, detail) = AppError::from(LedgerError::Validation("bad".into())).status_and_detail();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(detail.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_response_body_is_structured() {
        let response = AppError::from(LedgerError::ProposalNotPending {
            proposal_id: uuid::Uuid::nil(),
            status: shared::ProposalStatus::Accepted,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = tokio_test::block_on(axum::body::to_bytes(response.into_body(), usize::MAX)).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "PROPOSAL_NOT_PENDING");
    }

    #[test]
    fn test_validator_errors_name_the_field() {
        use validator::Validate;

        #[derive(Validate)]
        struct Remark {
            #[validate(length(max = 3))]
            remark: String,
        }

        let errors = Remark {
            remark: "too long".into(),
        }
        .validate()
        .unwrap_err();
        let (status, detail) = AppError::from(errors).status_and_detail();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(detail.code, "VALIDATION_ERROR");
        assert_eq!(detail.field.as_deref(), Some("remark"));
    }
}
