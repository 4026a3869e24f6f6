use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use junket_booking::BookingError;
use junket_core::repository::StoreError;
use junket_core::session::SessionStoreError;
use serde::Serialize;
use serde_json::json;

/// Success envelope shared by every JSON route.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Booking(e.into())
    }
}

impl From<SessionStoreError> for AppError {
    fn from(e: SessionStoreError) -> Self {
        AppError::InternalServerError(e.to_string())
    }
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::AttendeeNotFound { .. }
        | BookingError::EventNotFound(_)
        | BookingError::ItineraryNotFound(_) => StatusCode::NOT_FOUND,
        BookingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        BookingError::OfferNotBookable { .. } | BookingError::MissingBudgetSnapshot(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        BookingError::InvalidTransition { .. }
        | BookingError::QuoteExpired(_)
        | BookingError::CancellationNotConfirmed(_)
        | BookingError::NoProviderOrder(_)
        | BookingError::PaymentInProgress(_) => StatusCode::CONFLICT,
        BookingError::HoldExpired(_) => StatusCode::GONE,
        BookingError::Provider(_)
        | BookingError::BookingFailed(_)
        | BookingError::PaymentFailed(_)
        | BookingError::CancellationFailed(_) => StatusCode::BAD_GATEWAY,
        BookingError::BookingPersistenceFailed { .. } | BookingError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Booking(err) => {
                let status = booking_status(&err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(kind = err.kind(), error = %err, "Booking request failed");
                    (status, "Internal Server Error".to_string())
                } else if status == StatusCode::BAD_GATEWAY {
                    tracing::warn!(kind = err.kind(), error = %err, "Flight provider call failed");
                    (status, "Flight provider request failed".to_string())
                } else {
                    (status, err.to_string())
                }
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}
