//! Courier session loop and inbound frame handling

use std::future::Future;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use shared::error::ErrorCode;
use shared::message::{Ack, ClientEvent, PROTOCOL_VERSION, ServerEvent, Welcome};
use shared::util::normalize_identity;

use super::send_event;
use crate::api::dispatch::handler::{accept_result, reject_result};
use crate::core::ServerState;
use crate::utils::AppError;

pub(super) async fn run(socket: WebSocket, state: ServerState, courier_id: String) {
    let mut handle = state.registry.register(&courier_id);
    let courier_key = handle.courier_key.clone();
    let (mut ws_sink, mut ws_stream) = socket.split();

    let welcome = ServerEvent::Welcome(Welcome {
        courier_id: courier_key.clone(),
        protocol_version: PROTOCOL_VERSION,
        pending_offers: handle.replay.len(),
    });
    let mut open = send_event(&mut ws_sink, &welcome).await;

    for offer in std::mem::take(&mut handle.replay) {
        if !open {
            break;
        }
        open = send_event(&mut ws_sink, &ServerEvent::NewOrder(offer)).await;
    }

    while open {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let ack = handle_frame(&state, &courier_key, &text).await;
                        open = send_event(&mut ws_sink, &ServerEvent::Ack(ack)).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!(courier = %courier_key, "WebSocket error: {e}");
                        break;
                    }
                    _ => {} // Binary, Pong
                }
            }
            event = handle.rx.recv() => {
                match event {
                    Some(event) => open = send_event(&mut ws_sink, &event).await,
                    None => break,
                }
            }
        }
    }

    let _ = ws_sink.close().await;
    state.registry.unregister(&courier_key, handle.session_id);
}

/// Handle one inbound text frame and build its acknowledgement.
///
/// The session is bound to one courier: a frame naming a different courier
/// is refused.
pub async fn handle_frame(state: &ServerState, courier_key: &str, text: &str) -> Ack {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(courier = %courier_key, error = %e, "Unparsable frame");
            return failure(
                None,
                &AppError::with_message(ErrorCode::InvalidRequest, format!("Invalid frame: {e}")),
            );
        }
    };
    let ack_id = event.ack_id();

    match event {
        ClientEvent::AcceptOrder(response) => {
            if let Err(e) = check_identity(courier_key, &response.courier_id) {
                return failure(ack_id, &e);
            }
            let dispatch = state.dispatch.clone();
            let order_id = response.order_id.clone();
            let courier = courier_key.to_string();
            let result = bounded(state, async move { dispatch.accept(&order_id, &courier).await })
                .await
                .and_then(|r| r.map_err(AppError::from))
                .and_then(|outcome| accept_result(&response.order_id, outcome));
            match result {
                Ok(accepted) if accepted.duplicate => success(ack_id, "Order already yours"),
                Ok(_) => success(ack_id, "Order accepted"),
                Err(e) => failure(ack_id, &e),
            }
        }
        ClientEvent::RejectOrder(response) => {
            if let Err(e) = check_identity(courier_key, &response.courier_id) {
                return failure(ack_id, &e);
            }
            let dispatch = state.dispatch.clone();
            let order_id = response.order_id.clone();
            let courier = courier_key.to_string();
            let result = bounded(state, async move { dispatch.reject(&order_id, &courier).await })
                .await
                .and_then(|r| r.map_err(AppError::from))
                .and_then(|outcome| reject_result(&response.order_id, outcome));
            match result {
                Ok(rejected) => Ack {
                    all_rejected: Some(rejected.all_rejected),
                    ..success(ack_id, "Rejection recorded")
                },
                Err(e) => failure(ack_id, &e),
            }
        }
        ClientEvent::UpdateLocation(ping) => {
            match state.couriers.update_location(courier_key, ping.lat, ping.lon) {
                Ok(update) if update.accepted => success(ack_id, "Location updated"),
                Ok(update) => success(ack_id, update.reason.unwrap_or("ignored")),
                Err(e) => failure(ack_id, &e),
            }
        }
    }
}

/// Run the operation on its own task and wait at most `ack_timeout`.
///
/// The task keeps running past the deadline so a committed assignment still
/// notifies the other couriers; only the acknowledgement is lost.
async fn bounded<T, F>(state: &ServerState, op: F) -> Result<T, AppError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let limit = state.dispatch.config().ack_timeout;
    match tokio::time::timeout(limit, tokio::spawn(op)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AppError::internal(format!("Dispatch task failed: {e}"))),
        Err(_) => Err(AppError::with_message(
            ErrorCode::TimeoutError,
            format!("No result within {}s", limit.as_secs()),
        )),
    }
}

fn check_identity(courier_key: &str, claimed: &str) -> Result<(), AppError> {
    if claimed.trim().is_empty() || normalize_identity(claimed) == courier_key {
        Ok(())
    } else {
        Err(AppError::with_message(
            ErrorCode::InvalidRequest,
            "courierId does not match this session",
        ))
    }
}

fn success(ack_id: Option<String>, message: &str) -> Ack {
    Ack {
        ack_id,
        success: true,
        message: message.to_string(),
        code: None,
        all_rejected: None,
    }
}

fn failure(ack_id: Option<String>, err: &AppError) -> Ack {
    Ack {
        ack_id,
        success: false,
        message: err.message.clone(),
        code: Some(err.code.code()),
        all_rejected: None,
    }
}
