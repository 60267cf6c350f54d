//! Order placement and lifecycle
//!
//! - **ledger**: per-line stock reservation with compensating rollback
//! - **service**: placement, cancellation, seller status changes, availability
//!
//! # Placement
//!
//! ```text
//! place(request)
//!     ├─ 1. Validate payload (items, quantities, address)
//!     ├─ 2. Delivery coordinates present?          → LocationRequired
//!     ├─ 3. Resolve products, prices, sellers
//!     ├─ 4. Every located seller covers the point? → OutOfServiceArea
//!     ├─ 5. Delivery fee (road distance / haversine)
//!     ├─ 6. Reserve stock line by line             → InsufficientStock (rolled back)
//!     └─ 7. Commit order + ledger in one transaction (rolled back on failure)
//! ```
//!
//! No stock is touched before step 6, and nothing awaits between the first
//! reservation and the commit.

pub mod ledger;
pub mod service;

use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::{CancelActor, DeliveryAddress, OrderStatus, PaymentMethod};
use thiserror::Error;

use crate::db::StorageError;

pub use service::OrderService;

/// Placement failures
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error(transparent)]
    Validation(#[from] AppError),

    #[error("Order has no items")]
    Empty,

    #[error("Delivery coordinates are required")]
    LocationRequired,

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product {0} has no valid price")]
    InvalidPrice(String),

    #[error("Seller not found: {0}")]
    SellerNotFound(String),

    #[error("Delivery point is outside the service area of {0:?}")]
    OutOfServiceArea(Vec<String>),

    #[error("Insufficient stock for {name} (line {line_index}, requested {requested})")]
    InsufficientStock {
        line_index: usize,
        product_id: String,
        name: String,
        requested: u32,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<PlacementError> for AppError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::Validation(e) => e,
            PlacementError::Empty => AppError::new(ErrorCode::OrderEmpty),
            PlacementError::LocationRequired => {
                AppError::location_required("Delivery address must include lat and lon")
            }
            PlacementError::ProductNotFound(id) => {
                AppError::not_found(ErrorCode::ProductNotFound, "product_id", id)
            }
            PlacementError::InvalidPrice(id) => {
                AppError::new(ErrorCode::ProductInvalidPrice).with_detail("product_id", id)
            }
            PlacementError::SellerNotFound(id) => {
                AppError::not_found(ErrorCode::SellerNotFound, "seller_id", id)
            }
            PlacementError::OutOfServiceArea(sellers) => {
                AppError::new(ErrorCode::OutOfServiceArea).with_detail("seller_ids", sellers)
            }
            PlacementError::InsufficientStock {
                line_index,
                product_id,
                name,
                requested,
            } => AppError::with_message(
                ErrorCode::InsufficientStock,
                format!("Insufficient stock for {name}"),
            )
            .with_detail("line_index", line_index)
            .with_detail("product_id", product_id)
            .with_detail("requested", requested),
            PlacementError::Storage(e) => e.into(),
        }
    }
}

/// One requested line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    #[serde(default)]
    pub variant_key: Option<String>,
    pub quantity: u32,
}

/// Place-order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub customer_id: Option<String>,
    pub items: Vec<OrderItemRequest>,
    pub delivery_address: DeliveryAddress,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// Cancel-order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: String,
    #[serde(default = "default_actor")]
    pub actor: CancelActor,
}

fn default_actor() -> CancelActor {
    CancelActor::Customer
}

/// Seller/operator status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    /// Required wording for `CANCELLED` / `REJECTED`, defaulted otherwise
    #[serde(default)]
    pub reason: Option<String>,
}
