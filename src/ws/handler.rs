//! WebSocket handler for client connections.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;
use crate::api::handlers::ensure_room_access;
use crate::auth::CurrentUser;
use crate::hub::{ClientCommand, Outbound, Participant, ServerEvent};

/// Ping interval for keepalive.
const PING_INTERVAL_SECS: u64 = 30;

/// WebSocket upgrade handler.
///
/// GET /chat/ws
pub async fn chat_ws(
    State(state): State<AppState>,
    user: CurrentUser,
    ws: WebSocketUpgrade,
) -> Response {
    let participant = Participant::new(user.id(), user.handle());
    info!(
        "WebSocket upgrade request from user {} ({})",
        participant.user_id, participant.id
    );

    ws.on_upgrade(move |socket| handle_connection(socket, state, participant))
}

/// Drive one client connection until it closes.
///
/// A connection belongs to at most one room at a time; joining a new room
/// replaces the previous subscription.
async fn handle_connection(socket: WebSocket, state: AppState, participant: Participant) {
    let (mut sender, mut receiver) = socket.split();

    if send_event(&mut sender, &ServerEvent::Connected)
        .await
        .is_err()
    {
        return;
    }

    let mut room_rx: Option<broadcast::Receiver<Outbound>> = None;
    let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
    // The first tick fires immediately; skip it.
    ping_interval.tick().await;

    loop {
        tokio::select! {
            // Incoming client frames
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(command) => {
                                if let Err(event) =
                                    handle_command(&state, &participant, &mut room_rx, command).await
                                {
                                    if send_event(&mut sender, &event).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(
                                    "Unparseable command from user {}: {}",
                                    participant.user_id, e
                                );
                                let event = ServerEvent::Error {
                                    message: "unrecognized command".to_string(),
                                };
                                if send_event(&mut sender, &event).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("User {} closed WebSocket connection", participant.user_id);
                        break;
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring non-text frame from user {}", participant.user_id);
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for user {}: {}", participant.user_id, e);
                        break;
                    }
                }
            }

            // Room events, only while joined. select! drops this future before
            // a handler runs, so mutating room_rx in other arms is fine.
            out = async { room_rx.as_mut().unwrap().recv().await }, if room_rx.is_some() => {
                match out {
                    Ok(outbound) => {
                        if outbound.skip == Some(participant.id) {
                            continue;
                        }
                        if send_event(&mut sender, &outbound.event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(
                            "Connection for user {} lagged, dropped {} events",
                            participant.user_id, n
                        );
                    }
                    Err(RecvError::Closed) => {
                        room_rx = None;
                    }
                }
            }

            // Periodic ping
            _ = ping_interval.tick() => {
                if send_event(&mut sender, &ServerEvent::Ping).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.leave(participant.id);
    info!("WebSocket connection closed for user {}", participant.user_id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}

/// Apply a client command, updating the room subscription as needed. Failures
/// come back as the error event to deliver to this client only.
async fn handle_command(
    state: &AppState,
    participant: &Participant,
    room_rx: &mut Option<broadcast::Receiver<Outbound>>,
    command: ClientCommand,
) -> Result<(), ServerEvent> {
    match command {
        ClientCommand::Pong => Ok(()),

        ClientCommand::Join { room } => {
            ensure_room_access(state, &participant.user_id, &room)
                .await
                .map_err(|e| ServerEvent::Error {
                    message: e.to_string(),
                })?;

            let rx = state
                .hub
                .join(participant, &room)
                .map_err(|e| ServerEvent::Error {
                    message: e.to_string(),
                })?;
            *room_rx = Some(rx);

            info!("User {} joined room {}", participant.user_id, room);
            Ok(())
        }

        ClientCommand::Send { room, text } => {
            ensure_room_access(state, &participant.user_id, &room)
                .await
                .map_err(|e| ServerEvent::Error {
                    message: e.to_string(),
                })?;

            state
                .hub
                .send_message(participant, &room, &text)
                .map_err(|e| ServerEvent::Error {
                    message: e.to_string(),
                })?;
            Ok(())
        }
    }
}
