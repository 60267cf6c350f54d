//! Order API Module
//!
//! | Path | Method | Operation |
//! |------|--------|-----------|
//! | /api/orders | POST | place order |
//! | /api/orders/{id} | GET | order snapshot |
//! | /api/orders/{id}/cancel | POST | cancel |
//! | /api/orders/{id}/status | PATCH | seller / operator status change |
//! | /api/orders/{id}/dispatch | GET | dispatch view |
//! | /api/orders/{id}/dispatch/resend | POST | restart dispatch |

mod handler;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::place))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/cancel", post(handler::cancel))
        .route("/{id}/status", patch(handler::update_status))
        .route("/{id}/dispatch", get(handler::dispatch_view))
        .route("/{id}/dispatch/resend", post(handler::resend_dispatch))
}
