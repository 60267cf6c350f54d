//! Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use shared::models::Order;

use crate::core::ServerState;
use crate::dispatch::DispatchView;
use crate::orders::{CancelOrderRequest, PlaceOrderRequest, UpdateStatusRequest};
use crate::utils::{ApiResponse, AppResult};

/// Place an order
pub async fn place(
    State(state): State<ServerState>,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state.orders.place(payload).await?;
    Ok(Json(ApiResponse::success_with_message("Order placed", order)))
}

/// Get order by id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state.orders.get(&id)?;
    Ok(Json(ApiResponse::success(order)))
}

/// Cancel an order (pre-terminal states only)
pub async fn cancel(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<CancelOrderRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state.orders.cancel(&id, &payload.reason, payload.actor).await?;
    Ok(Json(ApiResponse::success_with_message("Order cancelled", order)))
}

/// Move an order along the lifecycle graph
pub async fn update_status(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state
        .orders
        .update_status(&id, payload.status, payload.reason.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Operator view of the dispatch bookkeeping
pub async fn dispatch_view(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<DispatchView>>> {
    let view = state.dispatch.view(&id)?;
    Ok(Json(ApiResponse::success(view)))
}

/// Re-enter the priority wave after exhaustion
pub async fn resend_dispatch(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<DispatchView>>> {
    let view = state.dispatch.resend(&id).await?;
    Ok(Json(ApiResponse::success_with_message("Dispatch restarted", view)))
}
