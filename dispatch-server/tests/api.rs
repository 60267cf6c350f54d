//! HTTP API 集成测试 (tower oneshot, 不监听端口)

mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use common::*;
use dispatch_server::api::build_app;
use dispatch_server::ServerState;
use serde_json::{Value, json};
use shared::error::ErrorCode;
use tower::ServiceExt;

async fn call(state: &ServerState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = build_app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    assert!(response.headers().contains_key("x-request-id"));
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn place_body(product_id: &str, qty: u32, lat: Option<f64>, lon: Option<f64>) -> Value {
    json!({
        "customer_id": "cust-1",
        "items": [{"product_id": product_id, "quantity": qty}],
        "delivery_address": {"line1": "12 MG Road", "lat": lat, "lon": lon},
        "payment_method": "cash_on_delivery"
    })
}

#[tokio::test]
async fn place_then_read_order() {
    let state = state_with(&[product("poha", "s-1", 30.0, 10)]);

    let (status, body) = call(
        &state,
        "POST",
        "/api/orders",
        Some(place_body("poha", 2, Some(SELLER_AT.0), Some(SELLER_AT.1))),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["code"], 0);
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["subtotal"], 60.0);

    let (status, body) = call(&state, "GET", &format!("/api/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], order_id.as_str());
    assert_eq!(stock(&state, "poha"), 8);
}

#[tokio::test]
async fn placement_errors_carry_codes() {
    let state = state_with(&[product("poha", "s-1", 30.0, 1)]);

    let (status, body) = call(
        &state,
        "POST",
        "/api/orders",
        Some(place_body("poha", 1, None, None)),
    )
    .await;
    assert!(status.is_client_error());
    assert_eq!(body["code"], ErrorCode::LocationRequired.code());

    let (status, body) = call(
        &state,
        "POST",
        "/api/orders",
        Some(place_body("poha", 5, Some(SELLER_AT.0), Some(SELLER_AT.1))),
    )
    .await;
    assert!(status.is_client_error());
    assert_eq!(body["code"], ErrorCode::InsufficientStock.code());
    assert_eq!(body["details"]["product_id"], "poha");

    let (_, body) = call(&state, "GET", "/api/orders/missing", None).await;
    assert_eq!(body["code"], ErrorCode::OrderNotFound.code());
}

#[tokio::test]
async fn availability_requires_location() {
    let state = state_with(&[]);

    let (status, body) = call(
        &state,
        "GET",
        &format!("/api/availability?lat={}&lon={}", SELLER_AT.0, SELLER_AT.1),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["seller_ids"], json!(["s-1"]));

    let (status, body) = call(&state, "GET", "/api/availability", None).await;
    assert!(status.is_client_error());
    assert_eq!(body["code"], ErrorCode::LocationRequired.code());
}

#[tokio::test]
async fn http_accept_assigns_the_order() {
    let state = state_with(&[product("poha", "s-1", 30.0, 10)]);
    state.storage.put_courier(&courier("c-1", 1.0)).unwrap();
    state.storage.put_courier(&courier("c-2", 2.0)).unwrap();

    let (_, body) = call(
        &state,
        "POST",
        "/api/orders",
        Some(place_body("poha", 1, Some(SELLER_AT.0), Some(SELLER_AT.1))),
    )
    .await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &state,
        "PATCH",
        &format!("/api/orders/{order_id}/status"),
        Some(json!({"status": "PREPARING"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, view) = call(&state, "GET", &format!("/api/orders/{order_id}/dispatch"), None).await;
    assert_eq!(view["data"]["status"], "active");
    assert_eq!(view["data"]["notified"], json!(["c-1", "c-2"]));

    let (status, body) = call(
        &state,
        "POST",
        &format!("/api/dispatch/{order_id}/accept"),
        Some(json!({"courierId": "c-2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["courierId"], "c-2");

    let (status, body) = call(
        &state,
        "POST",
        &format!("/api/dispatch/{order_id}/accept"),
        Some(json!({"courierId": "c-1"})),
    )
    .await;
    assert!(status.is_client_error());
    assert_eq!(body["code"], ErrorCode::OrderAlreadyAssigned.code());
    assert_eq!(body["details"]["assigned_courier"], "c-2");
}

#[tokio::test]
async fn courier_location_is_throttled() {
    let state = state_with(&[]);
    state.storage.put_courier(&courier("c-1", 1.0)).unwrap();

    let (status, body) = call(
        &state,
        "PUT",
        "/api/couriers/c-1/location",
        Some(json!({"lat": 22.73, "lon": 75.86})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["accepted"], true);

    let (_, body) = call(
        &state,
        "PUT",
        "/api/couriers/c-1/location",
        Some(json!({"lat": 22.74, "lon": 75.86})),
    )
    .await;
    assert_eq!(body["data"]["accepted"], false);
    assert_eq!(body["data"]["reason"], "throttled");

    let (_, body) = call(&state, "PUT", "/api/couriers/c-1/online", Some(json!({"online": false}))).await;
    assert_eq!(body["data"]["is_online"], false);
}

#[tokio::test]
async fn health_reports_counters() {
    let state = state_with(&[]);
    let (status, body) = call(&state, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["sessions"], 0);
    assert_eq!(body["data"]["active_waves"], 0);
}
