//! Unified error system for the dispatch service
//!
//! - [`ErrorCode`]: numeric codes shared with courier apps and dashboards
//! - [`ErrorCategory`]: code range, decides how an error is logged
//! - [`AppError`]: code + message + structured details
//! - [`ApiResponse`]: the `{code, message, data, details}` envelope
//!
//! | Range | Category |
//! |-------|----------|
//! | 0xxx | general |
//! | 4xxx | order |
//! | 6xxx | product / seller |
//! | 7xxx | dispatch |
//! | 9xxx | system |
//!
//! ```
//! use shared::error::{ApiResponse, AppError, ErrorCode};
//!
//! let err = AppError::new(ErrorCode::InsufficientStock).with_detail("product_id", "p-1");
//! let response: ApiResponse<()> = err.into();
//! assert_eq!(response.code, Some(ErrorCode::InsufficientStock.code()));
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{ApiResponse, AppError, AppResult, ErrorDetails};
