//! Accept / reject handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use crate::core::ServerState;
use crate::dispatch::{AcceptOutcome, AcceptReason, RejectOutcome};
use crate::utils::validation::{MAX_ID_LEN, validate_required_text};
use crate::utils::{ApiResponse, AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierResponse {
    pub courier_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResponse {
    pub order_id: String,
    pub courier_id: String,
    /// The courier had already won this order
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectResponse {
    pub order_id: String,
    pub recorded: bool,
    pub all_rejected: bool,
    pub wave: u32,
}

/// Accepted outcome, or the refusal as an `AppError` carrying its code
pub(crate) fn accept_result(order_id: &str, outcome: AcceptOutcome) -> AppResult<AcceptResponse> {
    if let Some(reason) = outcome.reason {
        let mut err = AppError::with_message(reason.code(), reason.message())
            .with_detail("order_id", order_id);
        if let Some(winner) = outcome.assigned_courier {
            err = err.with_detail("assigned_courier", winner);
        }
        return Err(err);
    }
    Ok(AcceptResponse {
        order_id: order_id.to_string(),
        courier_id: outcome.assigned_courier.unwrap_or_default(),
        duplicate: outcome.duplicate,
    })
}

/// Rejections are acknowledged even when nothing was recorded, except for
/// orders that no longer accept responses at all.
pub(crate) fn reject_result(order_id: &str, outcome: RejectOutcome) -> AppResult<RejectResponse> {
    if let Some(reason @ AcceptReason::NoLongerAvailable) = outcome.reason {
        return Err(AppError::with_message(reason.code(), reason.message())
            .with_detail("order_id", order_id));
    }
    Ok(RejectResponse {
        order_id: order_id.to_string(),
        recorded: outcome.recorded,
        all_rejected: outcome.all_rejected,
        wave: outcome.wave,
    })
}

pub async fn accept(
    State(state): State<ServerState>,
    Path(order_id): Path<String>,
    Json(payload): Json<CourierResponse>,
) -> AppResult<Json<ApiResponse<AcceptResponse>>> {
    validate_required_text(&payload.courier_id, "courierId", MAX_ID_LEN)?;
    let outcome = state.dispatch.accept(&order_id, &payload.courier_id).await?;
    let response = accept_result(&order_id, outcome)?;
    Ok(Json(ApiResponse::success_with_message("Order accepted", response)))
}

pub async fn reject(
    State(state): State<ServerState>,
    Path(order_id): Path<String>,
    Json(payload): Json<CourierResponse>,
) -> AppResult<Json<ApiResponse<RejectResponse>>> {
    validate_required_text(&payload.courier_id, "courierId", MAX_ID_LEN)?;
    let outcome = state.dispatch.reject(&order_id, &payload.courier_id).await?;
    let response = reject_result(&order_id, outcome)?;
    Ok(Json(ApiResponse::success_with_message("Rejection recorded", response)))
}
