use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::{notify::RoomMessage, store::UserId};

/// Live alert feed for one user. Events published to `user:{user_id}` are
/// forwarded as JSON text frames.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> impl IntoResponse {
    // Subscribe before the upgrade so nothing published during the
    // handshake is lost.
    let events = state.bus.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, events, format!("user:{}", user_id)))
}

async fn handle_socket(
    mut socket: WebSocket,
    mut events: broadcast::Receiver<RoomMessage>,
    room: String,
) {
    info!(room = %room, "Live client connected");

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(message) if message.room == room => {
                    let text = match serde_json::to_string(&message.event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!(room = %room, error = %e, "Failed to encode live event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(room = %room, skipped, "Live client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => debug!(room = %room, "Ignoring client frame"),
            },
        }
    }

    info!(room = %room, "Live client disconnected");
}
