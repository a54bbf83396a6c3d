use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::protocol::{ClientMessage, ConnectionId, Player, ServerMessage};
use crate::state::GameState;

/// Handle a single WebSocket connection from handshake to teardown.
///
/// The session moves through three states: handshake, the read loop, and
/// exit cleanup. Cleanup runs on every path out of the loop (explicit exit
/// message, protocol-level close, transport error) and is idempotent.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: GameState) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let conn_id = ConnectionId::new();
    info!("connection {} opened from {}", conn_id, addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Channel for sending messages to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Task to forward messages from channel to WebSocket. Socket writes
    // happen here, never under the state lock, so one slow client cannot
    // stall a broadcast to the others.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Sync the current game state to the newly connected client only; this
    // is how a late joiner catches up.
    let snapshot = state.snapshot().await;
    let _ = tx.send(ServerMessage::GameState {
        game_state: snapshot,
    });

    // Process incoming messages until the client exits or the transport
    // closes
    while let Some(result) = ws_receiver.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by tungstenite
                continue;
            }
            Ok(Message::Close(_)) => {
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error from {}: {}", addr, e);
                break;
            }
        };

        // A malformed message is dropped; the connection stays open
        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Malformed message from {}: {}", conn_id, e);
                continue;
            }
        };

        match client_msg {
            ClientMessage::PlayerEnter { player } => {
                let player = Player {
                    id: player.id,
                    websocket_id: conn_id,
                    position: player.position,
                };
                match state.add_player(player.clone(), tx.clone()).await {
                    Ok(()) => {
                        info!("player entered: {} on {}", player.id, conn_id);
                        let sent = state
                            .broadcast(&ServerMessage::PlayerEnter { player })
                            .await;
                        debug!("enter broadcast to {} connections", sent);
                        info!("player count: {}", state.player_count().await);
                    }
                    Err(e) => {
                        // The existing entry is preserved; the enter is dropped
                        warn!("Enter rejected for {}: {}", conn_id, e);
                    }
                }
            }

            ClientMessage::PlayerUpdate { player } => {
                match state.update_position(&conn_id, player.position).await {
                    Some(updated) => {
                        state
                            .broadcast(&ServerMessage::PlayerUpdate { player: updated })
                            .await;
                    }
                    None => {
                        // Enter not completed yet, or already exited
                        debug!("Update from {} without a player, dropped", conn_id);
                    }
                }
            }

            ClientMessage::PlayerExit => {
                break;
            }

            ClientMessage::Unknown => {
                debug!("Unrecognized message type from {}, ignored", conn_id);
            }
        }
    }

    // Cleanup on disconnect: remove the player and tell everyone else.
    // remove_player is a no-op when the client never entered.
    if let Some(player) = state.remove_player(&conn_id).await {
        info!("player exited: {} on {}", player.id, conn_id);
        state
            .broadcast(&ServerMessage::PlayerExit { player })
            .await;
        info!("player count: {}", state.player_count().await);
    } else {
        debug!("No player registered for {}", conn_id);
    }
    info!("connection {} closed", conn_id);

    send_task.abort();
}
