//! Acceptance arbiter
//!
//! Resolves concurrent courier responses to one offer. Every decision is a
//! single conditional write on the order record, so exactly one courier can
//! move `assigned_courier` from empty to themselves. A refusal aborts the
//! transaction and leaves the record untouched.

use serde::Serialize;
use shared::error::ErrorCode;
use shared::models::{DispatchStatus, Order, OrderStatus};
use shared::util::{normalize_identity, now_millis};

use crate::db::{DispatchStorage, StorageError};

/// Why an accept was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptReason {
    AlreadyAssigned,
    NoLongerAvailable,
    Stale,
    NotOffered,
    /// The courier turned this offer down in the current wave
    Declined,
}

impl AcceptReason {
    pub fn code(&self) -> ErrorCode {
        match self {
            AcceptReason::AlreadyAssigned => ErrorCode::OrderAlreadyAssigned,
            AcceptReason::NoLongerAvailable => ErrorCode::OrderNoLongerAvailable,
            AcceptReason::Stale => ErrorCode::NotificationStale,
            AcceptReason::NotOffered => ErrorCode::CourierNotOffered,
            AcceptReason::Declined => ErrorCode::OfferDeclined,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AcceptReason::AlreadyAssigned => "Order already accepted by another courier",
            AcceptReason::NoLongerAvailable => "Order is no longer available",
            AcceptReason::Stale => "Order is already resolved",
            AcceptReason::NotOffered => "Order was not offered to this courier",
            AcceptReason::Declined => "Courier already declined this offer",
        }
    }
}

/// Result of an accept attempt
#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub accepted: bool,
    pub reason: Option<AcceptReason>,
    /// Courier holding the order after this call
    pub assigned_courier: Option<String>,
    /// The same courier accepted again; nothing was written
    pub duplicate: bool,
    /// Order as committed (or as read, on refusal)
    pub order: Order,
}

/// Result of a reject
#[derive(Debug, Clone, PartialEq)]
pub struct RejectOutcome {
    /// The rejection was written to the current wave
    pub recorded: bool,
    /// Every courier of the current wave has now rejected
    pub all_rejected: bool,
    pub reason: Option<AcceptReason>,
    /// Wave the rejection counted against
    pub wave: u32,
}

enum Refusal {
    Storage(StorageError),
    Refused(AcceptReason, Box<Order>),
    Unchanged(Box<Order>),
}

impl From<StorageError> for Refusal {
    fn from(err: StorageError) -> Self {
        Refusal::Storage(err)
    }
}

fn classify(order: &Order, courier_id: &str) -> Result<(), AcceptReason> {
    if order.assigned_courier.is_some() {
        return Err(AcceptReason::AlreadyAssigned);
    }
    if matches!(
        order.status,
        OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Delivered
    ) || order.dispatch.status == DispatchStatus::Voided
    {
        return Err(AcceptReason::NoLongerAvailable);
    }
    if !order.status.permits_assignment() {
        return Err(AcceptReason::Stale);
    }
    if !order.dispatch.was_offered(courier_id) {
        return Err(AcceptReason::NotOffered);
    }
    Ok(())
}

/// Try to make `courier_id` the order's courier.
///
/// Accepting an exhausted order is allowed as long as the courier had been
/// offered it in that round and did not decline it in the last wave.
pub fn try_accept(
    storage: &DispatchStorage,
    order_id: &str,
    courier_id: &str,
) -> Result<AcceptOutcome, StorageError> {
    let courier = normalize_identity(courier_id);

    let result = storage.update_order(order_id, |order| {
        if order.assigned_courier.as_deref().map(normalize_identity).as_deref() == Some(courier.as_str()) {
            return Err(Refusal::Unchanged(Box::new(order.clone())));
        }
        if let Err(reason) = classify(order, &courier) {
            return Err(Refusal::Refused(reason, Box::new(order.clone())));
        }
        if order.dispatch.rejected.contains(&courier) {
            return Err(Refusal::Refused(AcceptReason::Declined, Box::new(order.clone())));
        }

        let now = now_millis();
        order.assigned_courier = Some(courier.clone());
        order.assigned_at = Some(now);
        order.dispatch.status = DispatchStatus::Assigned;
        Ok(order.clone())
    });

    match result {
        Ok(mut order) => {
            order.updated_at = now_millis();
            Ok(AcceptOutcome {
                accepted: true,
                reason: None,
                assigned_courier: Some(courier),
                duplicate: false,
                order,
            })
        }
        Err(Refusal::Unchanged(order)) => Ok(AcceptOutcome {
            accepted: true,
            reason: None,
            assigned_courier: order.assigned_courier.clone(),
            duplicate: true,
            order: *order,
        }),
        Err(Refusal::Refused(reason, order)) => Ok(AcceptOutcome {
            accepted: false,
            reason: Some(reason),
            assigned_courier: order.assigned_courier.clone(),
            duplicate: false,
            order: *order,
        }),
        Err(Refusal::Storage(e)) => Err(e),
    }
}

/// Record a rejection against the current wave.
///
/// Rejections from couriers outside the current wave, or for orders that
/// are no longer dispatching, are acknowledged without a write.
pub fn record_rejection(
    storage: &DispatchStorage,
    order_id: &str,
    courier_id: &str,
) -> Result<RejectOutcome, StorageError> {
    let courier = normalize_identity(courier_id);

    let result = storage.update_order(order_id, |order| {
        let wave = order.dispatch.wave;
        if let Err(reason) = classify(order, &courier) {
            return Err(Refusal::Refused(reason, Box::new(order.clone())));
        }
        let in_wave = order.dispatch.is_active() && order.dispatch.notified.contains(&courier);
        if !in_wave {
            return Err(Refusal::Unchanged(Box::new(order.clone())));
        }
        if !order.dispatch.rejected.contains(&courier) {
            order.dispatch.rejected.push(courier.clone());
        }
        Ok(RejectOutcome {
            recorded: true,
            all_rejected: order.dispatch.all_rejected(),
            reason: None,
            wave,
        })
    });

    match result {
        Ok(outcome) => Ok(outcome),
        Err(Refusal::Refused(reason, order)) => Ok(RejectOutcome {
            recorded: false,
            all_rejected: false,
            reason: Some(reason),
            wave: order.dispatch.wave,
        }),
        Err(Refusal::Unchanged(order)) => Ok(RejectOutcome {
            recorded: false,
            all_rejected: false,
            reason: None,
            wave: order.dispatch.wave,
        }),
        Err(Refusal::Storage(e)) => Err(e),
    }
}
