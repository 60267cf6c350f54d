//! 集成测试共享夹具
//!
//! 内存数据库 + 直线距离计价；商家固定在 SELLER_AT。

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dispatch_server::notify::{DeliveryReport, NotificationTransport};
use dispatch_server::orders::{OrderItemRequest, PlaceOrderRequest};
use dispatch_server::{Config, ServerState};
use shared::message::{OfferOutcome, OrderOffer};
use shared::models::{
    Coordinates, Courier, DeliveryAddress, LocationFields, PaymentMethod, Product, Seller,
};
use shared::util::normalize_identity;

pub const SELLER_AT: (f64, f64) = (22.7196, 75.8577);

/// Point `km` kilometres due north of the seller
pub fn north_of_seller(km: f64) -> Coordinates {
    Coordinates::new(SELLER_AT.0 + km / 111.195, SELLER_AT.1)
}

pub fn test_config() -> Config {
    let mut config = Config::with_overrides("/tmp/dispatch-integration", 0);
    config.routing = Default::default();
    config.broadcast_fallback = false;
    config.fees = Default::default();
    config.dispatch = Default::default();
    config
}

pub fn seller(id: &str) -> Seller {
    Seller {
        id: id.into(),
        name: format!("Seller {id}"),
        location: LocationFields::from_coordinates(Coordinates::new(SELLER_AT.0, SELLER_AT.1)),
        service_radius_km: Some(10.0),
        is_online: true,
        is_approved: true,
    }
}

pub fn product(id: &str, seller_id: &str, price: f64, stock: i64) -> Product {
    Product {
        id: id.into(),
        seller_id: seller_id.into(),
        name: id.to_uppercase(),
        price,
        discount_price: None,
        stock,
        variants: vec![],
    }
}

pub fn courier(id: &str, km_north: f64) -> Courier {
    Courier {
        id: id.into(),
        name: id.into(),
        location: LocationFields::from_coordinates(north_of_seller(km_north)),
        is_online: true,
        is_approved: true,
        location_updated_at: None,
    }
}

/// One seller "s-1" and the given products
pub fn state_with(products: &[Product]) -> ServerState {
    let state = ServerState::in_memory(test_config()).unwrap();
    state.storage.put_seller(&seller("s-1")).unwrap();
    for p in products {
        state.storage.put_product(p).unwrap();
    }
    state
}

pub fn order_request(lines: &[(&str, u32)], at: Coordinates) -> PlaceOrderRequest {
    PlaceOrderRequest {
        customer_id: Some("cust-1".into()),
        items: lines
            .iter()
            .map(|(id, qty)| OrderItemRequest {
                product_id: id.to_string(),
                variant_key: None,
                quantity: *qty,
            })
            .collect(),
        delivery_address: DeliveryAddress {
            line1: "12 MG Road".into(),
            city: Some("Indore".into()),
            lat: Some(at.lat),
            lon: Some(at.lon),
        },
        payment_method: PaymentMethod::CashOnDelivery,
    }
}

pub fn stock(state: &ServerState, product_id: &str) -> i64 {
    state.storage.get_product(product_id).unwrap().unwrap().stock
}

/// What a [`RecordingTransport`] saw
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Offer { courier: String, offer: OrderOffer },
    Outcome { courier: String, order_id: String, outcome: OfferOutcome },
}

/// Transport that records every call; every courier counts as reachable
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Couriers offered `order_id` in `wave`
    pub fn offered_in_wave(&self, order_id: &str, wave: u32) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Offer { courier, offer } if offer.order_id == order_id && offer.wave == wave => {
                    Some(courier)
                }
                _ => None,
            })
            .collect()
    }

    pub fn outcomes_for(&self, order_id: &str) -> Vec<(String, OfferOutcome)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Outcome {
                    courier,
                    order_id: id,
                    outcome,
                } if id == order_id => Some((courier, outcome)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send_offer(&self, courier_id: &str, offer: &OrderOffer) -> DeliveryReport {
        self.sent.lock().unwrap().push(Sent::Offer {
            courier: normalize_identity(courier_id),
            offer: offer.clone(),
        });
        DeliveryReport {
            sessions: 1,
            queued: true,
            broadcast: false,
        }
    }

    async fn send_outcome(
        &self,
        courier_id: &str,
        order_id: &str,
        outcome: &OfferOutcome,
    ) -> DeliveryReport {
        self.sent.lock().unwrap().push(Sent::Outcome {
            courier: normalize_identity(courier_id),
            order_id: order_id.to_string(),
            outcome: outcome.clone(),
        });
        DeliveryReport {
            sessions: 1,
            queued: false,
            broadcast: false,
        }
    }

    fn withdraw_offer(&self, _courier_id: &str, _order_id: &str) {}

    fn clear_pending(&self, _order_id: &str) {}

    fn is_reachable(&self, _courier_id: &str) -> bool {
        true
    }
}
