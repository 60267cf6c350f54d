//! Courier responses over HTTP
//!
//! Same arbiter paths as the `accept-order` / `reject-order` WebSocket
//! events, for clients that cannot hold a socket open.
//!
//! | Path | Method |
//! |------|--------|
//! | /api/dispatch/{order_id}/accept | POST |
//! | /api/dispatch/{order_id}/reject | POST |

pub(crate) mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub use handler::{AcceptResponse, CourierResponse, RejectResponse};

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/dispatch", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{order_id}/accept", post(handler::accept))
        .route("/{order_id}/reject", post(handler::reject))
}
