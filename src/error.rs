//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::engine::EngineError;
use crate::gateway::GatewayError;
use crate::reconcile::ReconcileError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Order not found: {0}")]
    OrderNotFound(uuid::Uuid),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Domain(e) => AppError::Domain(e),
            EngineError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Domain(e) => AppError::Domain(e),
            ReconcileError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<crate::domain::MoneyError> for AppError {
    fn from(err: crate::domain::MoneyError) -> Self {
        AppError::Domain(DomainError::InvalidAmount(err.to_string()))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 403 Forbidden
            AppError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone()))
            }

            // 404 Not Found
            AppError::OrderNotFound(id) => {
                (StatusCode::NOT_FOUND, "order_not_found", Some(id.to_string()))
            }

            // Domain errors: 400 for malformed input, 422 for rule
            // rejections, 404 for missing references, 409 for exhausted
            // write-conflict retries
            AppError::Domain(ref domain_err) => {
                let detail = Some(domain_err.to_string());
                match domain_err {
                    _ if domain_err.is_validation_error() => {
                        (StatusCode::BAD_REQUEST, "invalid_order", detail)
                    }
                    _ if domain_err.is_business_rule() => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "order_rejected", detail)
                    }
                    DomainError::WalletNotFound { .. } => {
                        (StatusCode::NOT_FOUND, "wallet_not_found", detail)
                    }
                    DomainError::UnknownPayment(_) => {
                        (StatusCode::NOT_FOUND, "unknown_payment", detail)
                    }
                    DomainError::Contention => {
                        (StatusCode::CONFLICT, "write_conflict", detail)
                    }
                    _ => (StatusCode::UNPROCESSABLE_ENTITY, "order_rejected", detail),
                }
            }

            // 502 Bad Gateway
            AppError::Gateway(e) => {
                tracing::error!("Payment gateway error: {:?}", e);
                (StatusCode::BAD_GATEWAY, "payment_gateway_error", None)
            }

            // 404 for dangling references, 500 for everything else
            AppError::Store(StoreError::NotFound { entity, id }) => (
                StatusCode::NOT_FOUND,
                "not_found",
                Some(format!("{} {}", entity, id)),
            ),
            AppError::Store(e) => {
                tracing::error!("Storage error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
