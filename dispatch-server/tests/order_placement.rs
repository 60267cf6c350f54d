//! 下单集成测试
//!
//! 库存不超卖、部分失败回滚、取消返还库存、配送范围与配送费

mod common;

use common::*;
use dispatch_server::orders::PlacementError;
use shared::error::ErrorCode;
use shared::models::{CancelActor, Coordinates, OrderStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_orders_never_oversell() {
    const STOCK: i64 = 10;
    const BUYERS: usize = 40;

    let state = state_with(&[product("poha", "s-1", 30.0, STOCK)]);
    let at = Coordinates::new(SELLER_AT.0, SELLER_AT.1);

    let handles: Vec<_> = (0..BUYERS)
        .map(|i| {
            let orders = state.orders.clone();
            let qty = if i % 3 == 0 { 2 } else { 1 };
            tokio::spawn(async move {
                orders
                    .place(order_request(&[("poha", qty)], at))
                    .await
                    .map(|order| order.items[0].quantity)
            })
        })
        .collect();

    let mut reserved = 0i64;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(qty) => reserved += i64::from(qty),
            Err(PlacementError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected placement error: {other:?}"),
        }
    }

    let left = stock(&state, "poha");
    assert!(left >= 0, "stock went negative: {left}");
    assert!(reserved <= STOCK);
    assert_eq!(reserved + left, STOCK);
}

#[tokio::test]
async fn failing_middle_line_leaves_no_net_stock_change() {
    let state = state_with(&[
        product("a", "s-1", 10.0, 5),
        product("b", "s-1", 10.0, 1),
        product("c", "s-1", 10.0, 5),
    ]);
    let at = Coordinates::new(SELLER_AT.0, SELLER_AT.1);

    let err = state
        .orders
        .place(order_request(&[("a", 2), ("b", 3), ("c", 1)], at))
        .await
        .unwrap_err();

    match err {
        PlacementError::InsufficientStock { line_index, product_id, .. } => {
            assert_eq!(line_index, 1);
            assert_eq!(product_id, "b");
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(
        (stock(&state, "a"), stock(&state, "b"), stock(&state, "c")),
        (5, 1, 5)
    );
    assert!(state.storage.list_orders().unwrap().is_empty());
}

#[tokio::test]
async fn cancelling_restores_exact_quantities() {
    let state = state_with(&[product("a", "s-1", 10.0, 10), product("b", "s-1", 20.0, 4)]);
    let at = Coordinates::new(SELLER_AT.0, SELLER_AT.1);

    let order = state
        .orders
        .place(order_request(&[("a", 2), ("b", 1)], at))
        .await
        .unwrap();
    assert_eq!((stock(&state, "a"), stock(&state, "b")), (8, 3));

    let cancelled = state
        .orders
        .cancel(&order.id, "ordered twice", CancelActor::Customer)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!((stock(&state, "a"), stock(&state, "b")), (10, 4));

    // A second cancel must not credit the stock again
    let again = state
        .orders
        .cancel(&order.id, "again", CancelActor::Customer)
        .await
        .unwrap_err();
    assert_eq!(again.code, ErrorCode::OrderNotCancellable);
    assert_eq!((stock(&state, "a"), stock(&state, "b")), (10, 4));
}

#[tokio::test]
async fn availability_is_gated_by_service_radius() {
    let state = state_with(&[]);

    let here = state
        .orders
        .availability(Some(SELLER_AT.0), Some(SELLER_AT.1))
        .unwrap();
    assert_eq!(here, vec!["s-1".to_string()]);

    let far = north_of_seller(15.0);
    let there = state.orders.availability(Some(far.lat), Some(far.lon)).unwrap();
    assert!(there.is_empty());

    let err = state.orders.availability(None, Some(SELLER_AT.1)).unwrap_err();
    assert_eq!(err.code, ErrorCode::LocationRequired);
}

#[tokio::test]
async fn distance_fee_is_ceiled_once() {
    // ~4.95 km: ceil(40 + 2.95 * 10) = 70
    let state = state_with(&[product("poha", "s-1", 30.0, 10)]);
    let order = state
        .orders
        .place(order_request(&[("poha", 1)], north_of_seller(4.95)))
        .await
        .unwrap();

    assert_eq!(order.delivery_fee, 70.0);
    assert_eq!(order.subtotal, 30.0);
    assert_eq!(order.total, 100.0);
}

#[tokio::test]
async fn out_of_area_order_touches_no_stock() {
    let state = state_with(&[product("poha", "s-1", 30.0, 10)]);
    let err = state
        .orders
        .place(order_request(&[("poha", 1)], north_of_seller(15.0)))
        .await
        .unwrap_err();

    assert!(matches!(err, PlacementError::OutOfServiceArea(_)));
    assert_eq!(stock(&state, "poha"), 10);
}
