//! # Game Server Library
//!
//! Session server for "Don't Get Angry", a Ludo-style board game played over
//! TCP by text clients. Clients pick a nickname, join a numbered room and,
//! once at least two players are in a room, start a game that runs
//! independently of the lobby and of every other room.
//!
//! ## Architecture
//!
//! ### Lobby loop
//! A single task owns the listener, every connection that is not in a game
//! and the room registry. It waits on new connections, frames from any lobby
//! connection and events from game sessions at the same time, and mutates
//! the registry only after a wait has resolved. No locks are involved.
//!
//! ### Game sessions
//! Starting a game moves the room's connections out of the lobby into a
//! `GameSession` spawned as its own task. The session reads only from its
//! own members, drives the turn loop and reports back through
//! `ServerEvent::SessionEnded` so the lobby can remove the room.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! Connection lifecycle and the lobby request handlers:
//! - Nickname registration with uniqueness check
//! - Joining and switching rooms
//! - Room and user queries
//! - Game start requests
//!
//! ### Room Module (`room`)
//! Room registry with capacity limits on members per room and number of rooms.
//!
//! ### Session Module (`session`)
//! Turn loop, roll handling, move options and win detection.
//!
//! ### Game Module (`game`)
//! Board rules behind the `RulesEngine` trait and the authoritative die.
//!
//! ### Network Module (`network`)
//! Configuration, the lobby loop and the hand-off to sessions.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig {
//!         port: 65432,
//!         max_rooms: 10,
//!         ..Default::default()
//!     };
//!     let mut server = Server::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Limitations
//!
//! Reads have no timeout. A member that stops responding stalls its own room
//! until it disconnects; other rooms and the lobby are not affected.

pub mod connection;
pub mod game;
pub mod network;
pub mod room;
pub mod session;
