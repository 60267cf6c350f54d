//! API 路由模块
//!
//! # 结构
//!
//! - [`orders`] - 下单、取消、状态流转、派单重发与查询
//! - [`dispatch`] - 骑手接单 / 拒单 (WebSocket 之外的 HTTP 通道)
//! - [`availability`] - 按位置查询可配送商家
//! - [`couriers`] - 骑手位置与在线状态
//! - [`health`] - 健康检查
//! - [`ws`] - 骑手实时会话与公共广播频道

pub mod availability;
pub mod couriers;
pub mod dispatch;
pub mod health;
pub mod orders;
pub mod ws;

use axum::Router;
use http::{HeaderName, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::ServerState;

// Re-export common types for handlers
pub use crate::utils::{ApiResponse, AppError, AppResult};

/// Custom request ID generator
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// All routes, no middleware
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(orders::router())
        .merge(dispatch::router())
        .merge(availability::router())
        .merge(couriers::router())
        .merge(health::router())
        .merge(ws::router())
}

/// Routes + middleware + state, used by the server and by oneshot tests
pub fn build_app(state: ServerState) -> Router {
    build_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            XRequestId,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .with_state(state)
}
