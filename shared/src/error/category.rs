//! Error category classification
//!
//! The thousands digit of an [`ErrorCode`] picks its category. The category
//! decides how loudly a response-path error is logged: system faults are
//! operator problems, dispatch refusals are routine traffic.

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 0xxx
    General,
    /// 4xxx
    Order,
    /// 6xxx, products and sellers
    Product,
    /// 7xxx, courier offers and assignment
    Dispatch,
    /// 9xxx and anything unassigned
    System,
}

impl ErrorCategory {
    pub fn from_code(code: u16) -> Self {
        match code / 1000 {
            0 => Self::General,
            4 => Self::Order,
            6 => Self::Product,
            7 => Self::Dispatch,
            _ => Self::System,
        }
    }

    /// Level used when an error of this category leaves through the API
    ///
    /// `None` means the error is the caller's business and is not logged.
    pub fn log_level(self) -> Option<tracing::Level> {
        match self {
            Self::System => Some(tracing::Level::ERROR),
            // stale / lost-race responses are expected under concurrency
            Self::Dispatch => Some(tracing::Level::DEBUG),
            Self::General | Self::Order | Self::Product => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::General => "general",
            Self::Order => "order",
            Self::Product => "product",
            Self::Dispatch => "dispatch",
            Self::System => "system",
        })
    }
}

impl ErrorCode {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}
