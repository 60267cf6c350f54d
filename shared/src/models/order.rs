//! Order Model

use serde::{Deserialize, Serialize};

use super::dispatch::DispatchState;
use super::location::Coordinates;
use super::product::StockSlot;

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Received,
    Preparing,
    ReadyForPickup,
    OutForDelivery,
    Delivered,
    Cancelled,
    /// Rejected by the seller
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// A courier may still be assigned in this status
    pub fn permits_assignment(&self) -> bool {
        matches!(
            self,
            OrderStatus::Received | OrderStatus::Preparing | OrderStatus::ReadyForPickup
        )
    }

    /// Entering this status starts dispatch when no courier is assigned yet
    pub fn is_ready_to_dispatch(&self) -> bool {
        matches!(self, OrderStatus::Preparing | OrderStatus::ReadyForPickup)
    }

    /// Lifecycle graph; `Cancelled` is reachable from every pre-delivery state
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Received, Preparing | Rejected | Cancelled) => true,
            (Preparing, ReadyForPickup | Cancelled) => true,
            (ReadyForPickup, OutForDelivery | Cancelled) => true,
            (OutForDelivery, Delivered | Cancelled) => true,
            _ => false,
        }
    }
}

/// Payment method chosen at checkout (settlement happens elsewhere)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
    Online,
}

/// Delivery address with optional coordinates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    #[serde(default)]
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl DeliveryAddress {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::new(self.lat?, self.lon?).validated()
    }
}

/// Ordered line item with the price resolved at order time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub seller_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_key: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
    pub line_total: f64,
}

/// Who cancelled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelActor {
    Customer,
    Seller,
    Operator,
    System,
}

/// Cancellation metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub actor: CancelActor,
    pub cancelled_at: i64,
}

/// Order entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub items: Vec<LineItem>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub platform_fee: f64,
    pub total: f64,
    pub delivery_address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    /// Set exactly once, by the acceptance arbiter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_courier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<i64>,
    #[serde(default)]
    pub dispatch: DispatchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Distinct sellers in line-item order
    pub fn seller_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for item in &self.items {
            if !ids.contains(&item.seller_id) {
                ids.push(item.seller_id.clone());
            }
        }
        ids
    }

    /// Unassigned and in a status that still allows assignment
    pub fn is_open_for_assignment(&self) -> bool {
        self.assigned_courier.is_none() && self.status.permits_assignment()
    }
}

/// Stock reserved for one line item of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationEntry {
    pub order_id: String,
    pub line_index: u32,
    pub product_id: String,
    pub slot: StockSlot,
    pub quantity: u32,
    #[serde(default)]
    pub voided: bool,
    pub created_at: i64,
}
