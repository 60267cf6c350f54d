//! Courier real-time protocol
//!
//! JSON text frames exchanged over the courier WebSocket. Every frame has
//! the shape `{"event": "<kebab-case name>", "data": {...}}`.
//!
//! ```text
//! server → courier   new-order | order-accepted | order-rejected-by-all
//!                    | order-cancelled | ack
//! courier → server   accept-order | reject-order | update-location
//! ```
//!
//! Offers are keyed by `orderId`: a client that receives the same offer twice
//! must replace, not duplicate, its local entry.

use serde::{Deserialize, Serialize};

use crate::models::{Coordinates, DispatchPhase};

/// Protocol version, sent in the session welcome
pub const PROTOCOL_VERSION: u16 = 1;

/// Assignment offer pushed to a courier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOffer {
    pub order_id: String,
    pub phase: DispatchPhase,
    pub wave: u32,
    pub pickup: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<Coordinates>,
    pub seller_ids: Vec<String>,
    pub delivery_fee: f64,
    pub total: f64,
    /// Courier to pickup, great-circle km
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub offered_at: i64,
}

/// How an offer ended for a courier who did not win it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OfferOutcome {
    /// Another courier accepted
    AcceptedByOther { accepted_by: String },
    /// The last wave ended with no acceptance
    RejectedByAll,
    /// The order was cancelled or rejected by the seller
    Cancelled { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAcceptedNotice {
    pub order_id: String,
    pub accepted_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderClosedNotice {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledNotice {
    pub order_id: String,
    pub reason: String,
}

/// Acknowledgement of a courier request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
    pub success: bool,
    pub message: String,
    /// Numeric error code when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_rejected: Option<bool>,
}

/// Session greeting, sent once right after the upgrade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub courier_id: String,
    pub protocol_version: u16,
    /// Unresolved offers replayed on this connect
    pub pending_offers: usize,
}

/// Server → courier frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Welcome(Welcome),
    NewOrder(OrderOffer),
    OrderAccepted(OrderAcceptedNotice),
    OrderRejectedByAll(OrderClosedNotice),
    OrderCancelled(OrderCancelledNotice),
    Ack(Ack),
}

impl ServerEvent {
    pub fn from_outcome(order_id: &str, outcome: &OfferOutcome) -> Self {
        let order_id = order_id.to_string();
        match outcome {
            OfferOutcome::AcceptedByOther { accepted_by } => {
                ServerEvent::OrderAccepted(OrderAcceptedNotice {
                    order_id,
                    accepted_by: accepted_by.clone(),
                })
            }
            OfferOutcome::RejectedByAll => {
                ServerEvent::OrderRejectedByAll(OrderClosedNotice { order_id })
            }
            OfferOutcome::Cancelled { reason } => ServerEvent::OrderCancelled(OrderCancelledNotice {
                order_id,
                reason: reason.clone(),
            }),
        }
    }

    /// Order the frame refers to, if any
    pub fn order_id(&self) -> Option<&str> {
        match self {
            ServerEvent::NewOrder(o) => Some(&o.order_id),
            ServerEvent::OrderAccepted(n) => Some(&n.order_id),
            ServerEvent::OrderRejectedByAll(n) => Some(&n.order_id),
            ServerEvent::OrderCancelled(n) => Some(&n.order_id),
            ServerEvent::Welcome(_) | ServerEvent::Ack(_) => None,
        }
    }
}

/// Courier's answer to an offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferResponse {
    pub order_id: String,
    pub courier_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
}

/// Position push from the courier app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPing {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
}

/// Courier → server frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    AcceptOrder(OfferResponse),
    RejectOrder(OfferResponse),
    UpdateLocation(LocationPing),
}

impl ClientEvent {
    pub fn ack_id(&self) -> Option<String> {
        match self {
            ClientEvent::AcceptOrder(r) | ClientEvent::RejectOrder(r) => r.ack_id.clone(),
            ClientEvent::UpdateLocation(p) => p.ack_id.clone(),
        }
    }
}
