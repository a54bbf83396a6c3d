//! Real-time multiplayer session server.
//!
//! Clients connect over a WebSocket, register a player with an id and a
//! position, stream position updates, and receive broadcasts of every other
//! player's enter/update/exit events. All state is in-memory and lives for
//! the duration of the process.

pub mod protocol;
pub mod session;
pub mod state;
