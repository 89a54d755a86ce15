//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{ErrorKind, StockError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Stock operation error.
    Stock(StockError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg),
            ApiError::Stock(err) => {
                let kind = err.kind();
                let status = status_for(kind);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %err, "internal server error");
                }
                (status, kind.as_str(), err.to_string())
            }
        };

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidQuantity | ErrorKind::InvalidTransfer | ErrorKind::InvalidQuery => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::ItemNotFound => StatusCode::NOT_FOUND,
        ErrorKind::WarehouseUnavailable => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InsufficientStock
        | ErrorKind::NegativeStockViolation
        | ErrorKind::ConcurrentModification => StatusCode::CONFLICT,
        ErrorKind::DependencyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        ApiError::Stock(err)
    }
}
