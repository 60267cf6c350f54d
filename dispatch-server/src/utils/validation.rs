//! Input validation helpers
//!
//! Centralized limits for request payloads. Anything that fails here is a
//! `ValidationFailed` error before any storage work starts.

use shared::error::{AppError, ErrorCode};

// ── Limits ──────────────────────────────────────────────────────────

/// Line items per order
pub const MAX_ORDER_ITEMS: usize = 100;

/// Units of a single line item
pub const MAX_ITEM_QUANTITY: u32 = 999;

/// Cancellation / rejection reasons
pub const MAX_REASON_LEN: usize = 500;

/// Address lines
pub const MAX_ADDRESS_LEN: usize = 500;

/// Entity identifiers (order, product, courier ids)
pub const MAX_ID_LEN: usize = 128;

// ── Helpers ─────────────────────────────────────────────────────────

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::with_message(
            ErrorCode::RequiredField,
            format!("{field} must not be empty"),
        ));
    }
    if value.len() > max_len {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            value.len()
        )));
    }
    Ok(())
}

/// Validate that an optional string, if present, is within the length limit.
pub fn validate_optional_text(
    value: &Option<String>,
    field: &str,
    max_len: usize,
) -> Result<(), AppError> {
    if let Some(v) = value
        && v.len() > max_len
    {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            v.len()
        )));
    }
    Ok(())
}

/// Line item quantity must be in `1..=MAX_ITEM_QUANTITY`
pub fn validate_quantity(quantity: u32, field: &str) -> Result<(), AppError> {
    if quantity == 0 || quantity > MAX_ITEM_QUANTITY {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            format!("{field} must be between 1 and {MAX_ITEM_QUANTITY}, got {quantity}"),
        )
        .with_detail("field", field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text_rejects_blank() {
        let err = validate_required_text("   ", "reason", MAX_REASON_LEN).unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredField);
        assert!(validate_required_text("ok", "reason", MAX_REASON_LEN).is_ok());
    }

    #[test]
    fn long_text_is_rejected() {
        let long = "x".repeat(MAX_REASON_LEN + 1);
        assert!(validate_required_text(&long, "reason", MAX_REASON_LEN).is_err());
        assert!(validate_optional_text(&Some(long), "reason", MAX_REASON_LEN).is_err());
        assert!(validate_optional_text(&None, "reason", MAX_REASON_LEN).is_ok());
    }

    #[test]
    fn quantity_bounds() {
        assert!(validate_quantity(0, "quantity").is_err());
        assert!(validate_quantity(1, "quantity").is_ok());
        assert_eq!(
            validate_quantity(MAX_ITEM_QUANTITY + 1, "quantity").unwrap_err().code,
            ErrorCode::ValueOutOfRange
        );
    }
}
