use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for one WebSocket connection, assigned when the
/// connection is accepted. Serialized as its string form on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A 2D position. Values are taken from client input as-is, no bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A game-visible player entity. `id` is the client-declared identity and
/// never changes after enter; `websocket_id` refers back to the owning
/// connection and is used only for identity comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    #[serde(rename = "websocketId")]
    pub websocket_id: ConnectionId,
    pub position: Position,
}

/// Point-in-time copy of the full game state, sent to a newly connected
/// client so it can catch up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    #[serde(rename = "connectionIds")]
    pub connection_ids: Vec<ConnectionId>,
    pub players: Vec<Player>,
}

/// Player fields a client supplies on enter. The server fills in the
/// connection id itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterPayload {
    pub id: String,
    pub position: Position,
}

/// Player fields a client supplies on a position update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub position: Position,
}

/// Client -> Server messages
///
/// Any `messageType` this server does not know decodes to `Unknown`, which
/// the session loop ignores so newer clients keep working against older
/// servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType")]
pub enum ClientMessage {
    /// Register a player with a client-declared id and initial position
    #[serde(rename = "CLIENT_MESSAGE_TYPE_PLAYER_ENTER")]
    PlayerEnter { player: EnterPayload },
    /// Move this connection's player
    #[serde(rename = "CLIENT_MESSAGE_TYPE_PLAYER_UPDATE")]
    PlayerUpdate { player: UpdatePayload },
    /// Leave the game and end the session
    #[serde(rename = "CLIENT_MESSAGE_TYPE_PLAYER_EXIT")]
    PlayerExit,
    /// Unrecognized message kind
    #[serde(other)]
    Unknown,
}

/// Server -> Client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType")]
pub enum ServerMessage {
    /// Full state sync for a newly connected client
    #[serde(rename = "SERVER_MESSAGE_TYPE_GAME_STATE")]
    GameState {
        #[serde(rename = "gameState")]
        game_state: GameStateSnapshot,
    },
    /// A player entered the game
    #[serde(rename = "SERVER_MESSAGE_TYPE_PLAYER_ENTER")]
    PlayerEnter { player: Player },
    /// A player left the game
    #[serde(rename = "SERVER_MESSAGE_TYPE_PLAYER_EXIT")]
    PlayerExit { player: Player },
    /// A player moved
    #[serde(rename = "SERVER_MESSAGE_TYPE_PLAYER_UPDATE")]
    PlayerUpdate { player: Player },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn test_player(id: &str, x: f64, y: f64) -> Player {
        Player {
            id: id.to_string(),
            websocket_id: ConnectionId::new(),
            position: Position { x, y },
        }
    }

    #[test]
    fn player_enter_decodes() {
        let text = r#"{
            "messageType": "CLIENT_MESSAGE_TYPE_PLAYER_ENTER",
            "player": {"id": "p1", "position": {"x": 0.0, "y": 0.0}}
        }"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        assert_eq!(
            msg,
            ClientMessage::PlayerEnter {
                player: EnterPayload {
                    id: "p1".to_string(),
                    position: Position { x: 0.0, y: 0.0 },
                }
            }
        );
    }

    #[test]
    fn player_update_decodes() {
        let text = r#"{
            "messageType": "CLIENT_MESSAGE_TYPE_PLAYER_UPDATE",
            "player": {"position": {"x": 5.0, "y": 3.0}}
        }"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        assert_eq!(
            msg,
            ClientMessage::PlayerUpdate {
                player: UpdatePayload {
                    position: Position { x: 5.0, y: 3.0 },
                }
            }
        );
    }

    #[test]
    fn player_exit_decodes_without_payload() {
        let text = r#"{"messageType": "CLIENT_MESSAGE_TYPE_PLAYER_EXIT"}"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        assert_eq!(msg, ClientMessage::PlayerExit);
    }

    #[test]
    fn unrecognized_message_type_decodes_to_unknown() {
        let text = r#"{"messageType": "CLIENT_MESSAGE_TYPE_TELEPORT", "target": {"x": 1.0}}"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        assert_eq!(msg, ClientMessage::Unknown);
    }

    #[test]
    fn malformed_envelope_is_a_decode_error() {
        // missing position
        let text = r#"{"messageType": "CLIENT_MESSAGE_TYPE_PLAYER_ENTER", "player": {"id": "p1"}}"#;
        assert!(serde_json::from_str::<ClientMessage>(text).is_err());
        // not an object
        assert!(serde_json::from_str::<ClientMessage>("[1, 2, 3]").is_err());
        // not JSON at all
        assert!(serde_json::from_str::<ClientMessage>("hello").is_err());
    }

    #[test]
    fn player_message_wire_shape() {
        let player = test_player("p1", 5.0, 3.0);
        let ws_id = player.websocket_id.to_string();
        let value: Value =
            serde_json::to_value(ServerMessage::PlayerUpdate { player }).unwrap();
        assert_eq!(
            value,
            json!({
                "messageType": "SERVER_MESSAGE_TYPE_PLAYER_UPDATE",
                "player": {
                    "id": "p1",
                    "websocketId": ws_id,
                    "position": {"x": 5.0, "y": 3.0}
                }
            })
        );
    }

    #[test]
    fn game_state_message_wire_shape() {
        let player = test_player("p1", 0.0, 0.0);
        let ws_id = player.websocket_id.to_string();
        let snapshot = GameStateSnapshot {
            connection_ids: vec![player.websocket_id],
            players: vec![player],
        };
        let value: Value =
            serde_json::to_value(ServerMessage::GameState { game_state: snapshot }).unwrap();
        assert_eq!(
            value,
            json!({
                "messageType": "SERVER_MESSAGE_TYPE_GAME_STATE",
                "gameState": {
                    "connectionIds": [ws_id],
                    "players": [{
                        "id": "p1",
                        "websocketId": ws_id,
                        "position": {"x": 0.0, "y": 0.0}
                    }]
                }
            })
        );
    }

    #[test]
    fn server_message_round_trips() {
        let msg = ServerMessage::PlayerExit {
            player: test_player("p2", -1.5, 2.5),
        };
        let text = serde_json::to_string(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, msg);
    }
}
