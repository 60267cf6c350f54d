//! Courier dispatch
//!
//! - [`controller`] - wave escalation state machine
//! - [`arbiter`] - single-winner accept / reject resolution
//! - [`timers`] - cancellable per-order wave timers
//!
//! ```text
//! idle ──start──▶ active(priority) ──timeout──▶ active(expanded) ──timeout──▶ exhausted
//!   │                   │    └── all rejected ──┘        │                       │
//!   │                   └──── accept ─────────▶ assigned ◀── accept ─────────────┘(late)
//!   └──(priority empty)─▶ active(immediate) ──timeout──▶ exhausted ──resend──▶ active(priority)
//! ```

pub mod arbiter;
pub mod controller;
pub mod timers;

use std::time::Duration;

use shared::error::{AppError, ErrorCode};
use shared::models::{DispatchStatus, OrderStatus};
use thiserror::Error;

use crate::db::StorageError;

pub use arbiter::{AcceptOutcome, AcceptReason, RejectOutcome};
pub use controller::{DispatchController, DispatchView};
pub use timers::WaveTimers;

/// Dispatch tuning
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Wave 1 radius (km)
    pub priority_radius_km: f64,
    /// Wave 2 / immediate radius (km)
    pub expanded_radius_km: f64,
    pub wave_timeout: Duration,
    /// Bound on accept/reject acknowledgements
    pub ack_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            priority_radius_km: 5.0,
            expanded_radius_km: 50.0,
            wave_timeout: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(10),
        }
    }
}

/// Dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order {order_id} cannot be re-dispatched (status {status:?}, dispatch {dispatch:?})")]
    NotResendable {
        order_id: String,
        status: OrderStatus,
        dispatch: DispatchStatus,
    },

    #[error("Order {0} is no longer available")]
    NoLongerAvailable(String),

    #[error("No courier in range for order {0}")]
    NoCourierAvailable(String),

    #[error("Dispatch state of order {0} changed concurrently")]
    Conflict(String),
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Storage(e) => e.into(),
            DispatchError::OrderNotFound(id) => {
                AppError::not_found(ErrorCode::OrderNotFound, "order_id", id)
            }
            e @ DispatchError::NotResendable { .. } => {
                AppError::with_message(ErrorCode::DispatchNotResendable, e.to_string())
            }
            DispatchError::NoCourierAvailable(id) => {
                AppError::new(ErrorCode::NoCourierAvailable).with_detail("order_id", id)
            }
            DispatchError::NoLongerAvailable(id) => {
                AppError::new(ErrorCode::OrderNoLongerAvailable).with_detail("order_id", id)
            }
            e @ DispatchError::Conflict(_) => {
                AppError::with_message(ErrorCode::AlreadyExists, e.to_string())
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ProductNotFound(id) => {
                AppError::not_found(ErrorCode::ProductNotFound, "product_id", id)
            }
            StorageError::OrderNotFound(id) => {
                AppError::not_found(ErrorCode::OrderNotFound, "order_id", id)
            }
            StorageError::CourierNotFound(id) => {
                AppError::not_found(ErrorCode::CourierNotFound, "courier_id", id)
            }
            other => AppError::database(other.to_string()),
        }
    }
}
