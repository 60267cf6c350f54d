use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::models::Courier;

use crate::core::ServerState;
use crate::couriers::LocationUpdate;
use crate::utils::{ApiResponse, AppResult};

#[derive(Debug, Deserialize)]
pub struct LocationPayload {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct OnlinePayload {
    pub online: bool,
}

/// A throttled push still answers 200 with `accepted: false`
pub async fn update_location(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<LocationPayload>,
) -> AppResult<Json<ApiResponse<LocationUpdate>>> {
    let update = state.couriers.update_location(&id, payload.lat, payload.lon)?;
    Ok(Json(ApiResponse::success(update)))
}

pub async fn set_online(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<OnlinePayload>,
) -> AppResult<Json<ApiResponse<Courier>>> {
    let courier = state.couriers.set_online(&id, payload.online)?;
    Ok(Json(ApiResponse::success(courier)))
}
