//! Wave escalation controller
//!
//! Drives an order from "ready" to "assigned" or "exhausted":
//!
//! 1. Priority wave: online couriers within the priority radius of the
//!    pickup point, nearest first.
//! 2. Expanded wave: couriers within the expanded radius who were not in
//!    wave 1. Starts when wave 1 times out or everyone in it rejects.
//! 3. Exhausted: the round ends, every courier reached is told, and the
//!    order waits for a manual resend (late accepts are still honoured).
//!
//! If the priority radius is empty the expanded radius is offered straight
//! away as a single `immediate` wave.
//!
//! Every transition is a conditional write keyed on the wave counter, so a
//! timer that fires after an accept or a newer wave finds nothing to do.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use shared::message::{OfferOutcome, OrderOffer};
use shared::models::{
    Coordinates, Courier, DispatchPhase, DispatchStatus, LocatedEntity, Order, OrderStatus,
};
use shared::util::{normalize_identity, now_millis};

use super::arbiter::{self, AcceptOutcome, RejectOutcome};
use super::timers::WaveTimers;
use super::{DispatchConfig, DispatchError};
use crate::db::DispatchStorage;
use crate::geo::{Ranked, within};
use crate::notify::NotificationTransport;
use crate::utils::logger::DISPATCH_TARGET;

/// Read-only snapshot of an order's dispatch state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchView {
    pub order_id: String,
    pub order_status: OrderStatus,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<DispatchPhase>,
    pub wave: u32,
    pub notified: Vec<String>,
    pub rejected: Vec<String>,
    pub excluded: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_courier: Option<String>,
    /// Time left in the current wave
    pub remaining_ms: i64,
}

struct ControllerInner {
    storage: DispatchStorage,
    transport: Arc<dyn NotificationTransport>,
    config: DispatchConfig,
    timers: Arc<WaveTimers>,
}

/// Dispatch controller (Clone shares state)
#[derive(Clone)]
pub struct DispatchController {
    inner: Arc<ControllerInner>,
}

impl std::fmt::Debug for DispatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchController")
            .field("config", &self.inner.config)
            .field("timers", &self.inner.timers)
            .finish()
    }
}

impl DispatchController {
    pub fn new(
        storage: DispatchStorage,
        transport: Arc<dyn NotificationTransport>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                storage,
                transport,
                config,
                timers: Arc::new(WaveTimers::new()),
            }),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Orders with an armed wave timer
    pub fn active_waves(&self) -> usize {
        self.inner.timers.len()
    }

    // ========== Entry points ==========

    /// Start dispatching an order.
    ///
    /// Idempotent: an order already dispatching or assigned is left alone.
    pub async fn start(&self, order_id: &str) -> Result<DispatchView, DispatchError> {
        let order = self.load(order_id)?;
        if matches!(
            order.dispatch.status,
            DispatchStatus::Active | DispatchStatus::Assigned
        ) || order.assigned_courier.is_some()
        {
            return Ok(self.view_of(&order));
        }
        if !order.is_open_for_assignment() || order.dispatch.status == DispatchStatus::Voided {
            return Err(DispatchError::NoLongerAvailable(order_id.to_string()));
        }

        match self.begin_round(&order).await {
            Ok(()) | Err(DispatchError::Conflict(_)) => self.view(order_id),
            Err(e) => Err(e),
        }
    }

    /// Manual re-dispatch after exhaustion (or of a ready order that was
    /// never dispatched). Starts a fresh round with no exclusions.
    ///
    /// A round that exhausts at once (nobody in range) is reported as
    /// [`DispatchError::NoCourierAvailable`]; the order stays exhausted.
    pub async fn resend(&self, order_id: &str) -> Result<DispatchView, DispatchError> {
        let order = self.inner.storage.update_order(order_id, |order| {
            if !resendable(order) {
                return Err(DispatchError::NotResendable {
                    order_id: order.id.clone(),
                    status: order.status,
                    dispatch: order.dispatch.status,
                });
            }
            order.dispatch.status = DispatchStatus::Idle;
            order.dispatch.phase = None;
            order.dispatch.notified.clear();
            order.dispatch.rejected.clear();
            order.dispatch.excluded.clear();
            order.dispatch.wave_started_at = None;
            Ok(order.clone())
        })?;

        tracing::info!(target: DISPATCH_TARGET, order_id, "Dispatch resent");
        self.begin_round(&order).await?;
        let view = self.view(order_id)?;
        if view.status == DispatchStatus::Exhausted {
            return Err(DispatchError::NoCourierAvailable(order_id.to_string()));
        }
        Ok(view)
    }

    /// Courier accepts an offer
    pub async fn accept(
        &self,
        order_id: &str,
        courier_id: &str,
    ) -> Result<AcceptOutcome, DispatchError> {
        let outcome = arbiter::try_accept(&self.inner.storage, order_id, courier_id)?;
        if !outcome.accepted || outcome.duplicate {
            if let Some(reason) = outcome.reason {
                tracing::debug!(
                    target: DISPATCH_TARGET,
                    order_id,
                    courier = %courier_id,
                    ?reason,
                    "Accept refused"
                );
            }
            return Ok(outcome);
        }

        self.inner.timers.cancel(order_id);
        let winner = outcome.assigned_courier.clone().unwrap_or_default();
        tracing::info!(
            target: DISPATCH_TARGET,
            order_id,
            courier = %winner,
            wave = outcome.order.dispatch.wave,
            "Order assigned"
        );

        let losers: Vec<String> = outcome
            .order
            .dispatch
            .everyone_offered()
            .into_iter()
            .filter(|c| *c != winner)
            .collect();
        let notice = OfferOutcome::AcceptedByOther {
            accepted_by: winner.clone(),
        };
        self.notify_all(&losers, order_id, &notice).await;
        self.inner.transport.clear_pending(order_id);

        Ok(outcome)
    }

    /// Courier rejects an offer. When that completes the wave, the next
    /// wave starts without waiting for the timer.
    pub async fn reject(
        &self,
        order_id: &str,
        courier_id: &str,
    ) -> Result<RejectOutcome, DispatchError> {
        let outcome = arbiter::record_rejection(&self.inner.storage, order_id, courier_id)?;
        if outcome.recorded {
            self.inner.transport.withdraw_offer(courier_id, order_id);
        }
        if outcome.all_rejected {
            tracing::info!(
                target: DISPATCH_TARGET,
                order_id,
                wave = outcome.wave,
                "Every courier in wave rejected"
            );
            self.advance(order_id, outcome.wave).await?;
        }
        Ok(outcome)
    }

    /// Stop dispatch for a cancelled or seller-rejected order.
    ///
    /// The order record must already be voided; this only cancels the timer
    /// and tells every courier who saw the offer.
    pub async fn void(&self, order: &Order, reason: &str) {
        self.inner.timers.cancel(&order.id);

        let mut recipients = order.dispatch.everyone_offered();
        if let Some(assigned) = &order.assigned_courier {
            if !recipients.contains(assigned) {
                recipients.push(assigned.clone());
            }
        }
        let notice = OfferOutcome::Cancelled {
            reason: reason.to_string(),
        };
        self.notify_all(&recipients, &order.id, &notice).await;
        self.inner.transport.clear_pending(&order.id);

        tracing::info!(
            target: DISPATCH_TARGET,
            order_id = %order.id,
            notified = recipients.len(),
            "Dispatch voided"
        );
    }

    /// Re-arm timers for waves that were in flight before a restart.
    ///
    /// The remaining time is recomputed from the wave start, so a wave that
    /// already expired advances right away. Offers are re-sent so that
    /// reconnecting couriers get them replayed.
    pub async fn recover(&self) -> Result<usize, DispatchError> {
        let orders = self.inner.storage.list_active_dispatch_orders()?;
        let timeout_ms = self.wave_timeout_ms();
        let now = now_millis();

        for order in &orders {
            let remaining = order.dispatch.remaining_ms(now, timeout_ms);
            if let (Some(pickup), Some(phase)) = (self.pickup_point(order)?, order.dispatch.phase) {
                let pending: Vec<Ranked> = self
                    .inner
                    .storage
                    .list_couriers()?
                    .iter()
                    .filter(|c| {
                        let key = normalize_identity(&c.id);
                        order.dispatch.notified.contains(&key)
                            && !order.dispatch.rejected.contains(&key)
                    })
                    .filter_map(|c| {
                        let coordinates = c.coordinates()?;
                        Some(Ranked {
                            id: c.id.clone(),
                            coordinates,
                            distance_km: crate::geo::distance_km(pickup, coordinates),
                        })
                    })
                    .collect();
                self.send_offers(order, phase, pickup, &pending).await;
            }
            self.arm(
                &order.id,
                order.dispatch.wave,
                Duration::from_millis(remaining as u64),
            );
        }

        if !orders.is_empty() {
            tracing::info!(target: DISPATCH_TARGET, recovered = orders.len(), "Wave timers re-armed");
        }
        Ok(orders.len())
    }

    /// Cancel every timer (graceful shutdown)
    pub fn shutdown(&self) {
        self.inner.timers.shutdown();
    }

    pub fn view(&self, order_id: &str) -> Result<DispatchView, DispatchError> {
        Ok(self.view_of(&self.load(order_id)?))
    }

    // ========== Wave mechanics ==========

    /// First wave of a round: priority radius, or the expanded radius as a
    /// single immediate wave when nobody is close.
    async fn begin_round(&self, order: &Order) -> Result<(), DispatchError> {
        let expected = order.dispatch.wave;
        let Some(pickup) = self.pickup_point(order)? else {
            tracing::warn!(
                target: DISPATCH_TARGET,
                order_id = %order.id,
                "No seller with a resolvable location, dispatch exhausted"
            );
            return self.exhaust(&order.id, expected).await;
        };

        let couriers = self.available_couriers()?;
        let priority = within(pickup, &couriers, self.inner.config.priority_radius_km);
        if !priority.is_empty() {
            return self
                .launch_wave(&order.id, expected, DispatchPhase::Priority, pickup, priority)
                .await;
        }

        let expanded = within(pickup, &couriers, self.inner.config.expanded_radius_km);
        if !expanded.is_empty() {
            return self
                .launch_wave(&order.id, expected, DispatchPhase::Immediate, pickup, expanded)
                .await;
        }

        self.exhaust(&order.id, expected).await
    }

    /// Move past wave `wave`: expanded after priority, otherwise exhausted.
    /// A stale `wave` is a no-op.
    async fn advance(&self, order_id: &str, wave: u32) -> Result<(), DispatchError> {
        let order = self.load(order_id)?;
        if !order.dispatch.is_active() || order.dispatch.wave != wave {
            tracing::debug!(
                target: DISPATCH_TARGET,
                order_id,
                wave,
                current = order.dispatch.wave,
                "Stale wave advance ignored"
            );
            return Ok(());
        }

        if order.dispatch.phase.is_some_and(|phase| !phase.is_last()) {
            if let Some(pickup) = self.pickup_point(&order)? {
                let offered = order.dispatch.everyone_offered();
                let couriers = self.available_couriers()?;
                let expanded: Vec<Ranked> =
                    within(pickup, &couriers, self.inner.config.expanded_radius_km)
                        .into_iter()
                        .filter(|r| !offered.contains(&normalize_identity(&r.id)))
                        .collect();
                if !expanded.is_empty() {
                    return self
                        .launch_wave(order_id, wave, DispatchPhase::Expanded, pickup, expanded)
                        .await;
                }
            }
        }

        self.exhaust(order_id, wave).await
    }

    /// Boxed [`advance`](Self::advance) for the timer task.
    fn advance_on_timeout(self, order_id: String, wave: u32) -> BoxFuture<'static, ()> {
        async move {
            tracing::debug!(target: DISPATCH_TARGET, order_id = %order_id, wave, "Wave timed out");
            match self.advance(&order_id, wave).await {
                Ok(()) | Err(DispatchError::Conflict(_)) => {}
                Err(e) => tracing::error!(
                    target: DISPATCH_TARGET,
                    order_id = %order_id,
                    wave,
                    error = %e,
                    "Failed to advance dispatch wave"
                ),
            }
        }
        .boxed()
    }

    /// Commit a new wave (conditional on `expected_wave`), send the offers
    /// and arm the timer.
    async fn launch_wave(
        &self,
        order_id: &str,
        expected_wave: u32,
        phase: DispatchPhase,
        pickup: Coordinates,
        couriers: Vec<Ranked>,
    ) -> Result<(), DispatchError> {
        let notified: Vec<String> = couriers.iter().map(|r| normalize_identity(&r.id)).collect();

        let order = self.inner.storage.update_order(order_id, |order| {
            if !still_current(order, expected_wave) {
                return Err(DispatchError::Conflict(order.id.clone()));
            }
            let excluded = match phase {
                DispatchPhase::Expanded => order.dispatch.everyone_offered(),
                DispatchPhase::Priority | DispatchPhase::Immediate => Vec::new(),
            };
            let dispatch = &mut order.dispatch;
            dispatch.status = DispatchStatus::Active;
            dispatch.phase = Some(phase);
            dispatch.wave = expected_wave + 1;
            dispatch.notified = notified.clone();
            dispatch.rejected.clear();
            dispatch.excluded = excluded;
            dispatch.wave_started_at = Some(now_millis());
            Ok(order.clone())
        })?;

        let wave = order.dispatch.wave;
        tracing::info!(
            target: DISPATCH_TARGET,
            order_id,
            wave,
            %phase,
            couriers = notified.len(),
            "Dispatch wave started"
        );

        self.send_offers(&order, phase, pickup, &couriers).await;
        self.arm(order_id, wave, self.inner.config.wave_timeout);

        // an accept or void may have landed while offers were in flight
        let current = self.load(order_id)?;
        if !still_current(&current, wave) || !current.dispatch.is_active() {
            self.inner.timers.cancel_wave(order_id, wave);
            if !current.dispatch.is_active() {
                self.inner.transport.clear_pending(order_id);
            }
            tracing::debug!(
                target: DISPATCH_TARGET,
                order_id,
                wave,
                status = ?current.dispatch.status,
                "Wave superseded while sending offers"
            );
        }
        Ok(())
    }

    /// End the round without an acceptance
    async fn exhaust(&self, order_id: &str, expected_wave: u32) -> Result<(), DispatchError> {
        let order = self.inner.storage.update_order(order_id, |order| {
            if !still_current(order, expected_wave) {
                return Err(DispatchError::Conflict(order.id.clone()));
            }
            let dispatch = &mut order.dispatch;
            dispatch.excluded = dispatch.everyone_offered();
            dispatch.notified.clear();
            // kept: last-wave decliners may not take the order late
            dispatch.status = DispatchStatus::Exhausted;
            dispatch.wave_started_at = None;
            Ok(order.clone())
        })?;

        self.inner.timers.cancel(order_id);
        let reached = order.dispatch.excluded.clone();
        self.notify_all(&reached, order_id, &OfferOutcome::RejectedByAll)
            .await;
        self.inner.transport.clear_pending(order_id);

        tracing::warn!(
            target: DISPATCH_TARGET,
            order_id,
            wave = order.dispatch.wave,
            reached = reached.len(),
            "No courier accepted, dispatch exhausted"
        );
        Ok(())
    }

    fn arm(&self, order_id: &str, wave: u32, delay: Duration) {
        let controller = self.clone();
        let id = order_id.to_string();
        self.inner
            .timers
            .arm(order_id, wave, delay, move || controller.advance_on_timeout(id, wave));
    }

    // ========== Helpers ==========

    async fn send_offers(
        &self,
        order: &Order,
        phase: DispatchPhase,
        pickup: Coordinates,
        couriers: &[Ranked],
    ) {
        let offered_at = now_millis();
        let dropoff = order.delivery_address.coordinates();
        let seller_ids = order.seller_ids();
        let transport = &self.inner.transport;

        let reports = join_all(couriers.iter().map(|ranked| {
            let offer = OrderOffer {
                order_id: order.id.clone(),
                phase,
                wave: order.dispatch.wave,
                pickup,
                dropoff,
                seller_ids: seller_ids.clone(),
                delivery_fee: order.delivery_fee,
                total: order.total,
                distance_km: Some(ranked.distance_km),
                offered_at,
            };
            async move { transport.send_offer(&ranked.id, &offer).await }
        }))
        .await;

        let live = reports.iter().filter(|r| r.delivered()).count();
        tracing::debug!(
            order_id = %order.id,
            offered = couriers.len(),
            live,
            "Offers sent"
        );
    }

    async fn notify_all(&self, couriers: &[String], order_id: &str, outcome: &OfferOutcome) {
        let transport = &self.inner.transport;
        join_all(
            couriers
                .iter()
                .map(|c| async move { transport.send_outcome(c, order_id, outcome).await }),
        )
        .await;
    }

    fn load(&self, order_id: &str) -> Result<Order, DispatchError> {
        self.inner
            .storage
            .get_order(order_id)?
            .ok_or_else(|| DispatchError::OrderNotFound(order_id.to_string()))
    }

    /// First seller of the order with a resolvable location
    fn pickup_point(&self, order: &Order) -> Result<Option<Coordinates>, DispatchError> {
        for seller_id in order.seller_ids() {
            if let Some(seller) = self.inner.storage.get_seller(&seller_id)? {
                if let Some(point) = seller.coordinates() {
                    return Ok(Some(point));
                }
            }
        }
        Ok(None)
    }

    fn available_couriers(&self) -> Result<Vec<Courier>, DispatchError> {
        Ok(self
            .inner
            .storage
            .list_couriers()?
            .into_iter()
            .filter(|c| c.is_available())
            .collect())
    }

    fn wave_timeout_ms(&self) -> i64 {
        self.inner.config.wave_timeout.as_millis() as i64
    }

    fn view_of(&self, order: &Order) -> DispatchView {
        let dispatch = &order.dispatch;
        DispatchView {
            order_id: order.id.clone(),
            order_status: order.status,
            status: dispatch.status,
            phase: dispatch.phase,
            wave: dispatch.wave,
            notified: dispatch.notified.clone(),
            rejected: dispatch.rejected.clone(),
            excluded: dispatch.excluded.clone(),
            assigned_courier: order.assigned_courier.clone(),
            remaining_ms: dispatch.remaining_ms(now_millis(), self.wave_timeout_ms()),
        }
    }
}

/// The order may still take a new wave (no accept or void in between)
fn still_current(order: &Order, expected_wave: u32) -> bool {
    order.dispatch.wave == expected_wave
        && order.is_open_for_assignment()
        && !matches!(
            order.dispatch.status,
            DispatchStatus::Assigned | DispatchStatus::Voided
        )
}

fn resendable(order: &Order) -> bool {
    if !order.is_open_for_assignment() {
        return false;
    }
    match order.dispatch.status {
        DispatchStatus::Exhausted => true,
        DispatchStatus::Idle => order.status.is_ready_to_dispatch(),
        DispatchStatus::Active | DispatchStatus::Assigned | DispatchStatus::Voided => false,
    }
}
