//! Error types and API response structures

use super::codes::ErrorCode;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Structured context attached to an error (offending product, winning courier, ...)
///
/// Ordered so that response bodies are stable.
pub type ErrorDetails = BTreeMap<String, Value>;

/// Error crossing the API boundary
///
/// Component errors (`StorageError`, `PlacementError`, `DispatchError`) are
/// converted into this at the edge; handlers only ever return `AppError`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<ErrorDetails>,
}

impl AppError {
    /// Error with the code's default message
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.message())
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach one detail entry; repeated keys overwrite
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// A missing record, with its id under `key`
    ///
    /// `AppError::not_found(ErrorCode::OrderNotFound, "order_id", "o-1")`
    /// reads "Order not found: o-1" and carries `{"order_id": "o-1"}`.
    pub fn not_found(code: ErrorCode, key: &str, id: impl Into<String>) -> Self {
        let id = id.into();
        Self::with_message(code, format!("{}: {id}", code.message())).with_detail(key, id)
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    pub fn location_required(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::LocationRequired, msg)
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::DatabaseError, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }
}

/// Response envelope for every HTTP endpoint
///
/// `code` is 0 on success; on failure it is the [`ErrorCode`] and `details`
/// carries the error's structured context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::success_with_message("OK", data)
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            code: Some(ErrorCode::Success.code()),
            message: message.into(),
            data: Some(data),
            details: None,
        }
    }

    fn status(&self) -> StatusCode {
        match self.code {
            None | Some(0) => StatusCode::OK,
            Some(code) => ErrorCode::try_from(code)
                .map(|c| c.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl<T> From<AppError> for ApiResponse<T> {
    fn from(err: AppError) -> Self {
        Self {
            code: Some(err.code.code()),
            message: err.message,
            data: None,
            details: err.details,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

// ===== Axum Integration =====

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self.code.category().log_level() {
            Some(level) if level == tracing::Level::ERROR => {
                tracing::error!(code = %self.code, message = %self.message, "System error occurred");
            }
            Some(_) => {
                tracing::debug!(code = %self.code, message = %self.message, "Request refused");
            }
            None => {}
        }
        ApiResponse::<()>::from(self).into_response()
    }
}

impl<T: Serialize> axum::response::IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        (self.status(), axum::Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_the_default_message() {
        let err = AppError::new(ErrorCode::InsufficientStock);
        assert_eq!(err.message, ErrorCode::InsufficientStock.message());
        assert!(err.details.is_none());
    }

    #[test]
    fn details_accumulate() {
        let err = AppError::new(ErrorCode::InsufficientStock)
            .with_detail("product_id", "p-1")
            .with_detail("requested", 3);

        let details = err.details.unwrap();
        assert_eq!(details["product_id"], "p-1");
        assert_eq!(details["requested"], 3);
    }

    #[test]
    fn not_found_names_the_record() {
        let err = AppError::not_found(ErrorCode::OrderNotFound, "order_id", "o-1");
        assert_eq!(err.message, format!("{}: o-1", ErrorCode::OrderNotFound.message()));
        assert_eq!(err.details.unwrap()["order_id"], "o-1");
        assert_eq!(
            AppError::location_required("lat/lon missing").http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn error_envelope_keeps_code_and_details() {
        let err = AppError::new(ErrorCode::OrderAlreadyAssigned).with_detail("assigned_courier", "c-2");
        let response: ApiResponse<String> = err.into();

        assert_eq!(response.code, Some(ErrorCode::OrderAlreadyAssigned.code()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.data.is_none());
        assert_eq!(response.details.unwrap()["assigned_courier"], "c-2");
    }

    #[test]
    fn success_envelope_serializes_code_zero() {
        let response = ApiResponse::success("hello");
        assert_eq!(response.status(), StatusCode::OK);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"code\":0"));
        assert!(json.contains("\"data\":\"hello\""));
        assert!(!json.contains("details"));
    }
}
