//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{Outbound, RoomEvent, RoomHandle};
use crate::util::rate_limit::SessionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Room to join; the default room when absent
    pub room: Option<String>,
}

/// Errors writing to a session socket
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("WebSocket send failed: {0}")]
    Socket(#[from] axum::Error),
}

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let room_id = query
        .room
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(state.rooms.default_room_id());
    let room = state.rooms.get_or_create(room_id);
    let rate_limit = state.config.input_rate_limit;

    ws.on_upgrade(move |socket| handle_socket(socket, room, rate_limit))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, room: RoomHandle, rate_limit: u32) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, room_id = %room.id(), "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Subscribe first so the join snapshot is not missed
    let events_rx = room.subscribe();
    if !room.send(session_id, RoomEvent::Join).await {
        error!(session_id = %session_id, room_id = %room.id(), "Room task unavailable");
        return;
    }

    run_session(session_id, &room, ws_sink, ws_stream, events_rx, rate_limit).await;

    // Cleanup on disconnect, whatever state the player is in
    room.send(session_id, RoomEvent::Leave).await;

    info!(session_id = %session_id, room_id = %room.id(), "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session_id: Uuid,
    room: &RoomHandle,
    mut ws_sink: WsSink,
    mut ws_stream: WsStream,
    mut events_rx: broadcast::Receiver<Outbound>,
    rate_limit: u32,
) {
    let rate_limiter = SessionRateLimiter::new(rate_limit);

    // Writer task: room events -> WebSocket
    let writer_room = room.clone();
    let writer_handle = tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(envelope) => {
                    if !envelope.audience.includes(&session_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &envelope.msg).await {
                        debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        session_id = %session_id,
                        lagged_count = n,
                        "Client lagged, requesting resync"
                    );
                    // Don't disconnect for lag: a full snapshot replaces what was missed
                    writer_room.send(session_id, RoomEvent::Resync).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(session_id = %session_id, "Room channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> room task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    debug!(session_id = %session_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        if !room.send(session_id, RoomEvent::Client(client_msg)).await {
                            debug!(session_id = %session_id, "Room channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> Result<(), SessionError> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
