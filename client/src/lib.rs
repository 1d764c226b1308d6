//! # Game Client Library
//!
//! Text client for the "Don't Get Angry" server. It picks a nickname, joins a
//! room, offers a small command menu in the lobby and then plays the game
//! turn by turn.
//!
//! ## Architecture Overview
//!
//! Two tasks share the TCP connection:
//!
//! ### Reader task
//! Owns the read half and decodes every frame. Acknowledgements (OK/FAIL)
//! and turn notifications (NEWTURN) are pushed onto a bounded queue of 50
//! messages; anything else updates the shared [`game::ClientState`] and is
//! shown to the user. A read error sets a cancellation flag and closes the
//! queue.
//!
//! ### Foreground
//! Owns the write half. Each request that expects an answer sends one frame
//! and pops one message from the queue, so replies are matched to requests by
//! order alone.
//!
//! ## Module Organization
//!
//! - `pipeline`: reader task, message classification and the bounded queue
//! - `network`: [`network::Client`] with the request API
//! - `game`: local game state and roll results
//! - `input`: menu parsing and the interactive loop
//! - `error`: [`ClientError`]
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), client::ClientError> {
//!     let mut client = Client::connect("127.0.0.1:65432").await?;
//!     if client.set_nickname("alice").await? && client.join_room(3).await? {
//!         client.start_game().await?;
//!     }
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod game;
pub mod input;
pub mod network;
pub mod pipeline;

pub use error::ClientError;
