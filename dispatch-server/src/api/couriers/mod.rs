//! Courier presence API
//!
//! | Path | Method | Operation |
//! |------|--------|-----------|
//! | /api/couriers/{id}/location | PUT | throttled location push |
//! | /api/couriers/{id}/online | PUT | toggle dispatch eligibility |

mod handler;

use axum::{Router, routing::put};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/couriers", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{id}/location", put(handler::update_location))
        .route("/{id}/online", put(handler::set_online))
}
