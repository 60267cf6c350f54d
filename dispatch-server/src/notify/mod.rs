//! Courier notification transport
//!
//! The dispatch controller talks to couriers only through
//! [`NotificationTransport`]; it is injected at construction, never looked up
//! globally. [`SessionRegistry`] is the production implementation, backed by
//! the courier WebSocket sessions.

pub mod registry;

use async_trait::async_trait;
use serde::Serialize;
use shared::message::{OfferOutcome, OrderOffer};

pub use registry::{SessionHandle, SessionRegistry};

/// What happened to one targeted notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Live sessions the event was handed to
    pub sessions: usize,
    /// Kept for replay when the courier (re)connects
    pub queued: bool,
    /// Also pushed to the general channel
    pub broadcast: bool,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        self.sessions > 0
    }
}

/// Delivery of offers and outcomes to couriers.
///
/// Delivery is at-least-once: the same offer may reach a session twice,
/// and clients key offers by order id.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Push an offer to every live session of the courier and remember it
    /// for replay until the order resolves.
    async fn send_offer(&self, courier_id: &str, offer: &OrderOffer) -> DeliveryReport;

    /// Tell a courier how an offer ended. Drops the courier's pending offer
    /// for that order.
    async fn send_outcome(
        &self,
        courier_id: &str,
        order_id: &str,
        outcome: &OfferOutcome,
    ) -> DeliveryReport;

    /// Drop one courier's pending offer without notifying them
    fn withdraw_offer(&self, courier_id: &str, order_id: &str);

    /// Forget every pending offer for an order
    fn clear_pending(&self, order_id: &str);

    /// At least one live session exists for the courier
    fn is_reachable(&self, courier_id: &str) -> bool;
}
