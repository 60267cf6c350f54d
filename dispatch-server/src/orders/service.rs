//! Order service
//!
//! Placement, cancellation and seller-driven status changes. Dispatch is
//! started and voided from here; courier assignment itself belongs to the
//! dispatch controller.

use std::sync::Arc;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    CancelActor, Cancellation, Coordinates, DispatchStatus, LineItem, LocatedEntity, Order,
    OrderStatus, Seller,
};
use shared::util::now_millis;

use super::ledger::{self, LineReservation};
use super::{PlaceOrderRequest, PlacementError};
use crate::db::DispatchStorage;
use crate::dispatch::DispatchController;
use crate::geo::{covering, within_range};
use crate::pricing::FeeCalculator;
use crate::pricing::money::{line_total, subtotal, to_decimal, to_f64};
use crate::utils::validation::{
    MAX_ADDRESS_LEN, MAX_ID_LEN, MAX_ORDER_ITEMS, MAX_REASON_LEN, validate_optional_text,
    validate_quantity, validate_required_text,
};

/// Order service (Clone shares state)
#[derive(Clone)]
pub struct OrderService {
    storage: DispatchStorage,
    dispatch: DispatchController,
    fees: Arc<FeeCalculator>,
    default_service_radius_km: f64,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("default_service_radius_km", &self.default_service_radius_km)
            .finish_non_exhaustive()
    }
}

struct ResolvedLine {
    item: LineItem,
    reservation: LineReservation,
}

impl OrderService {
    pub fn new(
        storage: DispatchStorage,
        dispatch: DispatchController,
        fees: Arc<FeeCalculator>,
        default_service_radius_km: f64,
    ) -> Self {
        Self {
            storage,
            dispatch,
            fees,
            default_service_radius_km,
        }
    }

    pub fn get(&self, order_id: &str) -> AppResult<Order> {
        self.storage
            .get_order(order_id)?
            .ok_or_else(|| {
                AppError::with_message(ErrorCode::OrderNotFound, format!("Order {order_id} not found"))
                    .with_detail("order_id", order_id)
            })
    }

    // ========== Placement ==========

    /// Place an order: all-or-nothing across stock, fee and persistence.
    pub async fn place(&self, request: PlaceOrderRequest) -> Result<Order, PlacementError> {
        validate_request(&request)?;
        let customer = request
            .delivery_address
            .coordinates()
            .ok_or(PlacementError::LocationRequired)?;

        let lines = self.resolve_lines(&request)?;
        let sellers = self.resolve_sellers(&lines)?;
        self.check_service_area(customer, &sellers)?;

        let subtotal = subtotal(lines.iter().map(|l| (l.item.unit_price, l.item.quantity)));
        let seller_points: Vec<Option<Coordinates>> =
            sellers.iter().map(LocatedEntity::coordinates).collect();
        let quote = self
            .fees
            .compute(to_f64(subtotal), &seller_points, customer)
            .await;
        let platform_fee = self.fees.config().platform_fee;
        let total = subtotal + to_decimal(quote.fee) + to_decimal(platform_fee);

        let order_id = uuid::Uuid::new_v4().to_string();
        let reservations: Vec<LineReservation> =
            lines.iter().map(|l| l.reservation.clone()).collect();
        let entries = ledger::reserve_all(&self.storage, &order_id, &reservations)?;

        let now = now_millis();
        let order = Order {
            id: order_id,
            customer_id: request.customer_id,
            items: lines.into_iter().map(|l| l.item).collect(),
            subtotal: to_f64(subtotal),
            delivery_fee: quote.fee,
            platform_fee,
            total: to_f64(total),
            delivery_address: request.delivery_address,
            payment_method: request.payment_method,
            status: OrderStatus::Received,
            assigned_courier: None,
            assigned_at: None,
            dispatch: Default::default(),
            cancellation: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.storage.commit_order(&order, &entries) {
            ledger::compensate(&self.storage, &entries);
            tracing::error!(order_id = %order.id, error = %e, "Order commit failed, stock restored");
            return Err(e.into());
        }

        tracing::info!(
            order_id = %order.id,
            items = order.items.len(),
            subtotal = order.subtotal,
            delivery_fee = order.delivery_fee,
            fee_mode = ?quote.mode,
            distance_fallbacks = quote.fallbacks,
            "Order placed"
        );
        Ok(order)
    }

    fn resolve_lines(&self, request: &PlaceOrderRequest) -> Result<Vec<ResolvedLine>, PlacementError> {
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = self
                .storage
                .get_product(&item.product_id)?
                .ok_or_else(|| PlacementError::ProductNotFound(item.product_id.clone()))?;
            let variant_key = item.variant_key.as_deref();
            let unit_price = product
                .unit_price(variant_key)
                .ok_or_else(|| PlacementError::InvalidPrice(product.id.clone()))?;

            lines.push(ResolvedLine {
                item: LineItem {
                    product_id: product.id.clone(),
                    seller_id: product.seller_id.clone(),
                    name: product.name.clone(),
                    variant_key: item.variant_key.clone(),
                    quantity: item.quantity,
                    unit_price,
                    line_total: to_f64(line_total(unit_price, item.quantity)),
                },
                reservation: LineReservation {
                    product_id: product.id.clone(),
                    name: product.name.clone(),
                    slots: product.stock_slots(variant_key),
                    quantity: item.quantity,
                },
            });
        }
        Ok(lines)
    }

    /// Distinct sellers of the order, in line order
    fn resolve_sellers(&self, lines: &[ResolvedLine]) -> Result<Vec<Seller>, PlacementError> {
        let mut sellers: Vec<Seller> = Vec::new();
        for line in lines {
            if sellers.iter().any(|s| s.id == line.item.seller_id) {
                continue;
            }
            let seller = self
                .storage
                .get_seller(&line.item.seller_id)?
                .ok_or_else(|| PlacementError::SellerNotFound(line.item.seller_id.clone()))?;
            sellers.push(seller);
        }
        Ok(sellers)
    }

    /// Every seller of the order must cover the delivery point. A seller
    /// without a resolvable location covers nothing.
    fn check_service_area(&self, customer: Coordinates, sellers: &[Seller]) -> Result<(), PlacementError> {
        let covered = covering(customer, sellers, self.default_service_radius_km);

        let outside: Vec<String> = sellers
            .iter()
            .filter(|s| !covered.iter().any(|r| r.id == s.id))
            .map(|s| s.id.clone())
            .collect();
        if outside.is_empty() {
            return Ok(());
        }

        for seller in sellers.iter().filter(|s| s.coordinates().is_none()) {
            tracing::warn!(seller_id = %seller.id, "Seller location unresolvable, treated as out of area");
        }
        Err(PlacementError::OutOfServiceArea(outside))
    }

    // ========== Lifecycle ==========

    /// Cancel from any pre-delivery state; restores stock and voids dispatch
    pub async fn cancel(&self, order_id: &str, reason: &str, actor: CancelActor) -> AppResult<Order> {
        self.terminate(order_id, OrderStatus::Cancelled, reason, actor)
            .await
    }

    /// Seller rejection of a freshly received order
    pub async fn reject(&self, order_id: &str, reason: &str) -> AppResult<Order> {
        self.terminate(order_id, OrderStatus::Rejected, reason, CancelActor::Seller)
            .await
    }

    async fn terminate(
        &self,
        order_id: &str,
        target: OrderStatus,
        reason: &str,
        actor: CancelActor,
    ) -> AppResult<Order> {
        validate_required_text(reason, "reason", MAX_REASON_LEN)?;

        let (order, released) = self
            .storage
            .update_order_releasing_stock(order_id, |order| {
                if !order.status.can_transition_to(target) {
                    let code = if target == OrderStatus::Cancelled {
                        ErrorCode::OrderNotCancellable
                    } else {
                        ErrorCode::InvalidStatusTransition
                    };
                    return Err(AppError::with_message(
                        code,
                        format!("Order {} cannot move from {:?} to {:?}", order.id, order.status, target),
                    )
                    .with_detail("status", format!("{:?}", order.status)));
                }
                let now = now_millis();
                order.status = target;
                order.dispatch.status = DispatchStatus::Voided;
                order.cancellation = Some(Cancellation {
                    reason: reason.to_string(),
                    actor,
                    cancelled_at: now,
                });
                order.updated_at = now;
                Ok(order.clone())
            })?;

        tracing::info!(
            order_id,
            status = ?target,
            ?actor,
            released = released.len(),
            "Order closed, stock restored"
        );

        self.dispatch.void(&order, reason).await;
        Ok(order)
    }

    /// Seller/operator status change along the lifecycle graph
    pub async fn update_status(
        &self,
        order_id: &str,
        next: OrderStatus,
        reason: Option<&str>,
    ) -> AppResult<Order> {
        match next {
            OrderStatus::Cancelled => {
                return self
                    .cancel(order_id, reason.unwrap_or("cancelled by operator"), CancelActor::Operator)
                    .await;
            }
            OrderStatus::Rejected => {
                return self
                    .reject(order_id, reason.unwrap_or("rejected by seller"))
                    .await;
            }
            _ => {}
        }

        let order = self.storage.update_order(order_id, |order| {
            if !order.status.can_transition_to(next) {
                return Err(AppError::with_message(
                    ErrorCode::InvalidStatusTransition,
                    format!("Cannot move from {:?} to {:?}", order.status, next),
                ));
            }
            if next == OrderStatus::OutForDelivery && order.assigned_courier.is_none() {
                return Err(AppError::with_message(
                    ErrorCode::InvalidStatusTransition,
                    "A courier must be assigned before the order goes out for delivery",
                ));
            }
            order.status = next;
            Ok(order.clone())
        })?;

        tracing::info!(order_id, status = ?next, "Order status updated");

        if next.is_ready_to_dispatch()
            && order.assigned_courier.is_none()
            && order.dispatch.status == DispatchStatus::Idle
        {
            if let Err(e) = self.dispatch.start(order_id).await {
                tracing::warn!(order_id, error = %e, "Dispatch did not start");
            }
            return self.get(order_id);
        }
        Ok(order)
    }

    // ========== Availability ==========

    /// Ids of online sellers whose service area covers the point.
    ///
    /// Both coordinates are required; there is no "show everything" fallback.
    pub fn availability(&self, lat: Option<f64>, lon: Option<f64>) -> AppResult<Vec<String>> {
        let (Some(lat), Some(lon)) = (lat, lon) else {
            return Err(AppError::location_required("lat and lon are required"));
        };
        let point = Coordinates::new(lat, lon)
            .validated()
            .ok_or_else(|| AppError::validation(format!("Invalid coordinates ({lat}, {lon})")))?;

        let sellers: Vec<Seller> = self
            .storage
            .list_sellers()?
            .into_iter()
            .filter(|s| s.is_available())
            .collect();
        Ok(within_range(point, &sellers, None, self.default_service_radius_km))
    }
}

fn validate_request(request: &PlaceOrderRequest) -> Result<(), PlacementError> {
    if request.items.is_empty() {
        return Err(PlacementError::Empty);
    }
    if request.items.len() > MAX_ORDER_ITEMS {
        return Err(AppError::validation(format!(
            "Too many items ({}, max {MAX_ORDER_ITEMS})",
            request.items.len()
        ))
        .into());
    }
    for (i, item) in request.items.iter().enumerate() {
        validate_required_text(&item.product_id, &format!("items[{i}].product_id"), MAX_ID_LEN)?;
        validate_quantity(item.quantity, &format!("items[{i}].quantity"))?;
    }
    validate_optional_text(&request.customer_id, "customer_id", MAX_ID_LEN)?;
    if request.delivery_address.line1.len() > MAX_ADDRESS_LEN {
        return Err(AppError::validation("delivery_address.line1 is too long").into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchConfig;
    use crate::notify::SessionRegistry;
    use crate::orders::OrderItemRequest;
    use crate::pricing::FeeConfig;
    use shared::models::{DeliveryAddress, LocationFields, PaymentMethod, Product, Variant};

    const SELLER_AT: (f64, f64) = (22.7196, 75.8577);

    fn service() -> (OrderService, DispatchStorage) {
        let storage = DispatchStorage::open_in_memory().unwrap();
        storage
            .put_seller(&Seller {
                id: "s-1".into(),
                name: "Sarafa".into(),
                location: LocationFields::from_coordinates(Coordinates::new(SELLER_AT.0, SELLER_AT.1)),
                service_radius_km: None,
                is_online: true,
                is_approved: true,
            })
            .unwrap();
        storage
            .put_product(&Product {
                id: "poha".into(),
                seller_id: "s-1".into(),
                name: "Poha".into(),
                price: 30.0,
                discount_price: None,
                stock: 10,
                variants: vec![],
            })
            .unwrap();
        storage
            .put_product(&Product {
                id: "jalebi".into(),
                seller_id: "s-1".into(),
                name: "Jalebi".into(),
                price: 50.0,
                discount_price: None,
                stock: 0,
                variants: vec![Variant {
                    key: "250g".into(),
                    price: Some(45.0),
                    discount_price: None,
                    stock: 4,
                }],
            })
            .unwrap();

        let controller = DispatchController::new(
            storage.clone(),
            Arc::new(SessionRegistry::default()),
            DispatchConfig::default(),
        );
        let fees = Arc::new(FeeCalculator::straight_line(FeeConfig::default()));
        (
            OrderService::new(storage.clone(), controller, fees, 10.0),
            storage,
        )
    }

    fn address(lat: f64, lon: f64) -> DeliveryAddress {
        DeliveryAddress {
            line1: "12 MG Road".into(),
            city: Some("Indore".into()),
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    fn request(items: &[(&str, Option<&str>, u32)]) -> PlaceOrderRequest {
        PlaceOrderRequest {
            customer_id: Some("cust-1".into()),
            items: items
                .iter()
                .map(|(id, variant, qty)| OrderItemRequest {
                    product_id: id.to_string(),
                    variant_key: variant.map(str::to_string),
                    quantity: *qty,
                })
                .collect(),
            delivery_address: address(SELLER_AT.0, SELLER_AT.1),
            payment_method: PaymentMethod::CashOnDelivery,
        }
    }

    fn stock(storage: &DispatchStorage, id: &str) -> i64 {
        storage.get_product(id).unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn place_prices_and_reserves() {
        let (svc, storage) = service();
        let order = svc
            .place(request(&[("poha", None, 2), ("jalebi", Some("250g"), 1)]))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Received);
        assert_eq!(order.subtotal, 105.0);
        assert_eq!(order.delivery_fee, 40.0);
        assert_eq!(order.total, 145.0);
        assert_eq!(order.items[1].unit_price, 45.0);
        assert_eq!(stock(&storage, "poha"), 8);
        assert_eq!(storage.reservations_for(&order.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_coordinates_is_location_required() {
        let (svc, storage) = service();
        let mut req = request(&[("poha", None, 1)]);
        req.delivery_address.lat = None;

        let err = svc.place(req).await.unwrap_err();
        assert!(matches!(err, PlacementError::LocationRequired));
        assert_eq!(AppError::from(err).code, ErrorCode::LocationRequired);
        assert_eq!(stock(&storage, "poha"), 10);
    }

    #[tokio::test]
    async fn far_customer_is_out_of_service_area() {
        let (svc, storage) = service();
        let mut req = request(&[("poha", None, 1)]);
        req.delivery_address = address(SELLER_AT.0 + 15.0 / 111.195, SELLER_AT.1);

        let err = svc.place(req).await.unwrap_err();
        assert!(matches!(err, PlacementError::OutOfServiceArea(ref ids) if ids == &["s-1".to_string()]));
        assert_eq!(stock(&storage, "poha"), 10);
    }

    #[tokio::test]
    async fn unlocated_seller_is_out_of_service_area() {
        let (svc, storage) = service();
        let mut seller = storage.get_seller("s-1").unwrap().unwrap();
        seller.location = LocationFields::default();
        storage.put_seller(&seller).unwrap();

        let err = svc.place(request(&[("poha", None, 1)])).await.unwrap_err();
        assert!(matches!(err, PlacementError::OutOfServiceArea(ref ids) if ids == &["s-1".to_string()]));
        assert_eq!(stock(&storage, "poha"), 10);
        assert!(storage.list_orders().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_unlocated_seller_blocks_a_mixed_order() {
        let (svc, storage) = service();
        storage
            .put_seller(&Seller {
                id: "s-2".into(),
                name: "Chappan".into(),
                location: LocationFields::default(),
                service_radius_km: None,
                is_online: true,
                is_approved: true,
            })
            .unwrap();
        storage
            .put_product(&Product {
                id: "kachori".into(),
                seller_id: "s-2".into(),
                name: "Kachori".into(),
                price: 20.0,
                discount_price: None,
                stock: 5,
                variants: vec![],
            })
            .unwrap();

        let err = svc
            .place(request(&[("poha", None, 1), ("kachori", None, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::OutOfServiceArea(ref ids) if ids == &["s-2".to_string()]));
        assert_eq!((stock(&storage, "poha"), stock(&storage, "kachori")), (10, 5));
    }

    #[tokio::test]
    async fn insufficient_stock_rolls_back_whole_order() {
        let (svc, storage) = service();
        let err = svc
            .place(request(&[("poha", None, 3), ("jalebi", Some("250g"), 5)]))
            .await
            .unwrap_err();

        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::InsufficientStock);
        assert_eq!(stock(&storage, "poha"), 10);
        assert!(storage.list_orders().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_and_invalid_quantities_are_rejected() {
        let (svc, _) = service();
        assert!(matches!(svc.place(request(&[])).await, Err(PlacementError::Empty)));

        let err = svc.place(request(&[("poha", None, 0)])).await.unwrap_err();
        assert_eq!(AppError::from(err).code, ErrorCode::ValueOutOfRange);
    }

    #[tokio::test]
    async fn cancel_restores_stock_once() {
        let (svc, storage) = service();
        let order = svc.place(request(&[("poha", None, 2)])).await.unwrap();
        assert_eq!(stock(&storage, "poha"), 8);

        let cancelled = svc
            .cancel(&order.id, "changed my mind", CancelActor::Customer)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.dispatch.status, DispatchStatus::Voided);
        assert_eq!(stock(&storage, "poha"), 10);

        let again = svc
            .cancel(&order.id, "again", CancelActor::Customer)
            .await
            .unwrap_err();
        assert_eq!(again.code, ErrorCode::OrderNotCancellable);
        assert_eq!(stock(&storage, "poha"), 10);
    }

    #[tokio::test]
    async fn seller_rejection_only_from_received() {
        let (svc, storage) = service();
        let order = svc.place(request(&[("poha", None, 1)])).await.unwrap();
        svc.update_status(&order.id, OrderStatus::Preparing, None)
            .await
            .unwrap();

        let err = svc.reject(&order.id, "kitchen closed").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);
        assert_eq!(stock(&storage, "poha"), 9);
    }

    #[tokio::test]
    async fn out_for_delivery_requires_courier() {
        let (svc, _) = service();
        let order = svc.place(request(&[("poha", None, 1)])).await.unwrap();
        svc.update_status(&order.id, OrderStatus::Preparing, None)
            .await
            .unwrap();
        svc.update_status(&order.id, OrderStatus::ReadyForPickup, None)
            .await
            .unwrap();

        let err = svc
            .update_status(&order.id, OrderStatus::OutForDelivery, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);

        let skip = svc
            .update_status(&order.id, OrderStatus::Received, None)
            .await
            .unwrap_err();
        assert_eq!(skip.code, ErrorCode::InvalidStatusTransition);
    }

    #[tokio::test]
    async fn preparing_starts_dispatch() {
        let (svc, _) = service();
        let order = svc.place(request(&[("poha", None, 1)])).await.unwrap();

        // no couriers seeded: the round exhausts straight away
        let updated = svc
            .update_status(&order.id, OrderStatus::Preparing, None)
            .await
            .unwrap();
        assert_eq!(updated.dispatch.status, DispatchStatus::Exhausted);
    }

    #[test]
    fn availability_requires_location_and_respects_radius() {
        let (svc, _) = service();
        let err = svc.availability(Some(SELLER_AT.0), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::LocationRequired);

        assert_eq!(
            svc.availability(Some(SELLER_AT.0), Some(SELLER_AT.1)).unwrap(),
            vec!["s-1".to_string()]
        );
        assert!(
            svc.availability(Some(SELLER_AT.0 + 15.0 / 111.195), Some(SELLER_AT.1))
                .unwrap()
                .is_empty()
        );
    }
}
