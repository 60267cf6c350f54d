//! Seller availability by location
//!
//! `GET /api/availability?lat=&lon=` returns the ids of online sellers whose
//! service area covers the point. Cart, wishlist and catalog views filter by
//! this set. Missing coordinates are a `LocationRequired` error.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/availability", get(availability))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub seller_ids: Vec<String>,
}

pub async fn availability(
    State(state): State<ServerState>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<ApiResponse<AvailabilityResponse>>> {
    let seller_ids = state.orders.availability(query.lat, query.lon)?;
    Ok(Json(ApiResponse::success(AvailabilityResponse { seller_ids })))
}
