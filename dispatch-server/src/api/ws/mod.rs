//! Real-time courier sessions
//!
//! | Path | Purpose |
//! |------|---------|
//! | /ws/couriers/{courier_id} | per-courier session: offers out, responses in |
//! | /ws/general | general broadcast channel (offer fallback, off by default) |
//!
//! A courier session starts with a `welcome` frame, then replays every
//! unresolved offer for that courier, then relays events both ways until
//! the socket closes.

mod session;

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use shared::message::ServerEvent;
use tokio::sync::broadcast::error::RecvError;

use crate::core::ServerState;
use crate::utils::AppResult;
use crate::utils::validation::{MAX_ID_LEN, validate_required_text};

pub use session::handle_frame;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/ws/couriers/{courier_id}", get(courier_ws))
        .route("/ws/general", get(general_ws))
}

/// GET /ws/couriers/{courier_id}: upgrade to a courier session
pub async fn courier_ws(
    State(state): State<ServerState>,
    Path(courier_id): Path<String>,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    validate_required_text(&courier_id, "courier_id", MAX_ID_LEN)?;
    Ok(ws.on_upgrade(move |socket| session::run(socket, state, courier_id)))
}

/// GET /ws/general: read-only broadcast stream
pub async fn general_ws(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_general(socket, state))
}

async fn run_general(socket: WebSocket, state: ServerState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut rx = state.registry.subscribe_general();
    tracing::debug!("General channel subscriber connected");

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {} // inbound frames are ignored on this channel
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if !send_event(&mut ws_sink, &event).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "General channel subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    let _ = ws_sink.close().await;
    tracing::debug!("General channel subscriber disconnected");
}

/// Serialize and send one frame; false when the socket is gone
pub(crate) async fn send_event<S>(sink: &mut S, event: &ServerEvent) -> bool
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server event");
            true
        }
    }
}
