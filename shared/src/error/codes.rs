//! Unified error codes for the dispatch service
//!
//! This module defines all error codes used across the dispatch server,
//! courier clients and operator dashboards. Error codes are organized by
//! category:
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 6xxx: Product / seller errors
//! - 7xxx: Dispatch errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, Kotlin, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order has no line items
    OrderEmpty = 4007,
    /// A line item could not be reserved
    InsufficientStock = 4010,
    /// Delivery point is outside a seller's service area
    OutOfServiceArea = 4011,
    /// Coordinates are required for this operation
    LocationRequired = 4012,
    /// Order is in a terminal state and cannot be cancelled
    OrderNotCancellable = 4013,
    /// Requested status change is not allowed from the current status
    InvalidStatusTransition = 4014,

    // ==================== 6xxx: Product / Seller ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product price is missing or invalid
    ProductInvalidPrice = 6002,
    /// Seller not found
    SellerNotFound = 6101,

    // ==================== 7xxx: Dispatch ====================
    /// Courier not found
    CourierNotFound = 7001,
    /// Every wave finished without an acceptance
    NoCourierAvailable = 7002,
    /// Courier response references an order that is already resolved
    NotificationStale = 7003,
    /// Order was cancelled or rejected while an offer was in flight
    OrderNoLongerAvailable = 7004,
    /// Order already has an assigned courier
    OrderAlreadyAssigned = 7005,
    /// Courier was never offered this order
    CourierNotOffered = 7006,
    /// Dispatch cannot be resent in the current state
    DispatchNotResendable = 7007,
    /// Courier already turned this offer down
    OfferDeclined = 7008,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Operation timed out
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the default message for this error code
    pub fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderEmpty => "Order has no items",
            ErrorCode::InsufficientStock => "Insufficient stock",
            ErrorCode::OutOfServiceArea => "Delivery location is outside the service area",
            ErrorCode::LocationRequired => "Location is required",
            ErrorCode::OrderNotCancellable => "Order can no longer be cancelled",
            ErrorCode::InvalidStatusTransition => "Invalid order status transition",

            // Product / Seller
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductInvalidPrice => "Product price is invalid",
            ErrorCode::SellerNotFound => "Seller not found",

            // Dispatch
            ErrorCode::CourierNotFound => "Courier not found",
            ErrorCode::NoCourierAvailable => "No courier available",
            ErrorCode::NotificationStale => "Order is no longer open for assignment",
            ErrorCode::OrderNoLongerAvailable => "Order is no longer available",
            ErrorCode::OrderAlreadyAssigned => "Order has already been assigned",
            ErrorCode::CourierNotOffered => "Order was not offered to this courier",
            ErrorCode::DispatchNotResendable => "Dispatch cannot be resent right now",
            ErrorCode::OfferDeclined => "Courier already declined this offer",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4007 => Ok(ErrorCode::OrderEmpty),
            4010 => Ok(ErrorCode::InsufficientStock),
            4011 => Ok(ErrorCode::OutOfServiceArea),
            4012 => Ok(ErrorCode::LocationRequired),
            4013 => Ok(ErrorCode::OrderNotCancellable),
            4014 => Ok(ErrorCode::InvalidStatusTransition),

            // Product / Seller
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::ProductInvalidPrice),
            6101 => Ok(ErrorCode::SellerNotFound),

            // Dispatch
            7001 => Ok(ErrorCode::CourierNotFound),
            7002 => Ok(ErrorCode::NoCourierAvailable),
            7003 => Ok(ErrorCode::NotificationStale),
            7004 => Ok(ErrorCode::OrderNoLongerAvailable),
            7005 => Ok(ErrorCode::OrderAlreadyAssigned),
            7006 => Ok(ErrorCode::CourierNotOffered),
            7007 => Ok(ErrorCode::DispatchNotResendable),
            7008 => Ok(ErrorCode::OfferDeclined),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::NotFound.code(), 3);
        assert_eq!(ErrorCode::InsufficientStock.code(), 4010);
        assert_eq!(ErrorCode::OutOfServiceArea.code(), 4011);
        assert_eq!(ErrorCode::NotificationStale.code(), 7003);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_try_from_round_trips_known_codes() {
        for code in [
            ErrorCode::LocationRequired,
            ErrorCode::NoCourierAvailable,
            ErrorCode::OrderNoLongerAvailable,
            ErrorCode::OfferDeclined,
        ] {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_try_from_unknown_value() {
        assert_eq!(ErrorCode::try_from(4242), Err(InvalidErrorCode(4242)));
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&ErrorCode::InsufficientStock).unwrap();
        assert_eq!(json, "4010");
        let code: ErrorCode = serde_json::from_str("7003").unwrap();
        assert_eq!(code, ErrorCode::NotificationStale);
    }

    #[test]
    fn test_is_success() {
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::Unknown.is_success());
    }
}
