use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::protocol::{ConnectionId, GameStateSnapshot, Player, Position, ServerMessage};

/// Sender half of a connection's outgoing message channel. The session's
/// writer task owns the receiving half and does the actual socket writes,
/// so sending here never blocks on the network.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

/// Rejected store mutation. The existing entry is always preserved.
#[derive(Debug)]
pub enum StateError {
    /// The connection already has a player (double enter)
    ConnectionRegistered(ConnectionId),
    /// Another live player already uses this identity
    IdentityTaken(String),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::ConnectionRegistered(id) => {
                write!(f, "connection {} already has a player", id)
            }
            StateError::IdentityTaken(id) => {
                write!(f, "player id {:?} is already in use", id)
            }
        }
    }
}

impl std::error::Error for StateError {}

/// The set of connections that have completed the enter handshake, used
/// only for broadcast fan-out.
#[derive(Debug, Default)]
struct ConnectionRegistry {
    senders: HashMap<ConnectionId, ClientSender>,
}

impl ConnectionRegistry {
    fn contains(&self, id: &ConnectionId) -> bool {
        self.senders.contains_key(id)
    }

    fn insert(&mut self, id: ConnectionId, sender: ClientSender) {
        self.senders.insert(id, sender);
    }

    fn remove(&mut self, id: &ConnectionId) -> Option<ClientSender> {
        self.senders.remove(id)
    }

    fn ids(&self) -> Vec<ConnectionId> {
        self.senders.keys().copied().collect()
    }

    fn senders(&self) -> Vec<ClientSender> {
        self.senders.values().cloned().collect()
    }
}

/// Live players keyed by their owning connection.
#[derive(Debug, Default)]
struct PlayerDirectory {
    players: HashMap<ConnectionId, Player>,
}

impl PlayerDirectory {
    fn identity_taken(&self, player_id: &str) -> bool {
        self.players.values().any(|p| p.id == player_id)
    }

    fn insert(&mut self, id: ConnectionId, player: Player) {
        self.players.insert(id, player);
    }

    fn remove(&mut self, id: &ConnectionId) -> Option<Player> {
        self.players.remove(id)
    }

    fn get(&self, id: &ConnectionId) -> Option<&Player> {
        self.players.get(id)
    }

    fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    fn players(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.players.len()
    }
}

#[derive(Debug, Default)]
struct GameStateInner {
    registry: ConnectionRegistry,
    directory: PlayerDirectory,
}

/// Authoritative shared game state: the connection registry and the player
/// directory behind one lock, so no operation is ever observed half-done.
///
/// Invariant: the registry and the directory always hold the same key set.
/// A connection is registered exactly when its player has entered.
///
/// One instance is created in `main` and cloned into every session task;
/// operations are O(player count), which stays small per session.
#[derive(Debug, Default, Clone)]
pub struct GameState {
    inner: Arc<Mutex<GameStateInner>>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player and its connection. Rejects a connection that
    /// already entered and a player id that is already live; the existing
    /// entry wins in both cases.
    pub async fn add_player(&self, player: Player, sender: ClientSender) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        let conn_id = player.websocket_id;
        if inner.registry.contains(&conn_id) {
            return Err(StateError::ConnectionRegistered(conn_id));
        }
        if inner.directory.identity_taken(&player.id) {
            return Err(StateError::IdentityTaken(player.id));
        }
        inner.registry.insert(conn_id, sender);
        inner.directory.insert(conn_id, player);
        Ok(())
    }

    /// Remove the player owned by this connection, along with the
    /// connection itself. Idempotent: disconnect can race an explicit exit,
    /// so removing an absent player is a no-op returning `None`.
    pub async fn remove_player(&self, conn_id: &ConnectionId) -> Option<Player> {
        let mut inner = self.inner.lock().await;
        inner.registry.remove(conn_id);
        inner.directory.remove(conn_id)
    }

    /// Look up the player owned by this connection. `None` is an expected
    /// outcome, e.g. the connection never completed the enter handshake.
    pub async fn find_player(&self, conn_id: &ConnectionId) -> Option<Player> {
        let inner = self.inner.lock().await;
        inner.directory.get(conn_id).cloned()
    }

    /// Atomically replace a player's position, returning the updated
    /// player. `None` if no player is associated with the connection.
    pub async fn update_position(
        &self,
        conn_id: &ConnectionId,
        position: Position,
    ) -> Option<Player> {
        let mut inner = self.inner.lock().await;
        let player = inner.directory.get_mut(conn_id)?;
        player.position = position;
        Some(player.clone())
    }

    /// Detached copy of all connection ids and players, safe to serialize
    /// and iterate without holding the lock.
    pub async fn snapshot(&self) -> GameStateSnapshot {
        let inner = self.inner.lock().await;
        GameStateSnapshot {
            connection_ids: inner.registry.ids(),
            players: inner.directory.players(),
        }
    }

    /// Best-effort send to every registered connection. The target list is
    /// copied under the lock and the sends happen after it is released; a
    /// dead receiver is skipped without affecting the others. Returns the
    /// number of send attempts.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let targets = {
            let inner = self.inner.lock().await;
            inner.registry.senders()
        };
        let attempts = targets.len();
        for sender in targets {
            let _ = sender.send(message.clone());
        }
        attempts
    }

    pub async fn player_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.directory.len()
    }
}
