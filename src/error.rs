use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Shared user-facing error messages.
pub mod msg {
    pub const ORDER_NOT_FOUND: &str = "Order not found";
    pub const CONCERT_NOT_FOUND: &str = "Concert not found";
    pub const TIER_NOT_FOUND: &str = "Ticket tier not found";
    pub const TICKET_NOT_FOUND: &str = "Ticket not found";
    pub const TICKET_NOT_REDEEMED: &str = "Ticket has not been redeemed";
    pub const RESERVATION_NOT_FOUND: &str = "Reservation not found";
    pub const ORDER_NOT_PAYABLE: &str = "Order is no longer awaiting payment";
    pub const ORDER_NOT_CANCELLABLE: &str = "Only pending orders can be cancelled";
    pub const EMPTY_ORDER: &str = "Order must contain at least one item";
    pub const INVALID_QUANTITY: &str = "Quantity must be greater than zero";
    pub const ALREADY_AGENT: &str = "User is already an active agent";
    pub const INVALID_CALLBACK_TOKEN: &str = "Invalid callback token";
    pub const MISSING_CALLBACK_TOKEN: &str = "Missing x-callback-token header";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient inventory for tier {tier_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        tier_id: String,
        requested: i64,
        available: i64,
    },

    #[error("Invalid payment request: {0}")]
    InvalidPaymentRequest(String),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::InsufficientInventory { .. } => (
                StatusCode::CONFLICT,
                "Insufficient inventory",
                Some(self.to_string()),
            ),
            AppError::InvalidPaymentRequest(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid payment request",
                Some(msg.clone()),
            ),
            AppError::GatewayUnavailable(msg) => {
                tracing::warn!("Payment gateway unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Payment gateway unavailable",
                    None,
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Converts `Option<T>` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
