//! Lobby server: accepts TCP clients, dispatches lobby requests and hands
//! full rooms over to game sessions

use crate::connection::{Connection, ConnectionId, LobbyReply, Registry};
use crate::game::{Board, RandomDice, DEFAULT_BOARD_SIZE, MAX_BOARD_SIZE};
use crate::room::RoomManager;
use crate::session::GameSession;
use futures::future::select_all;
use log::{debug, error, info, warn};
use shared::{CodecError, Message, DEFAULT_HOST, DEFAULT_PORT};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Runtime settings of the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_rooms: usize,
    pub max_clients_per_room: usize,
    pub board_size: usize,
    /// Fixed die seed; each room derives its own seed from it
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_rooms: 10,
            max_clients_per_room: 4,
            board_size: DEFAULT_BOARD_SIZE,
            seed: None,
        }
    }
}

/// Settings a server cannot run a game with
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one room is required")]
    NoRooms,

    #[error("a room must hold at least 2 players, got {0}")]
    RoomTooSmall(usize),

    #[error("board size must be between {min} and {max} fields, got {size}")]
    BoardSize { size: usize, min: usize, max: usize },
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Every player needs an own start field, and the board view has to fit
    /// into a single message value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rooms == 0 {
            return Err(ConfigError::NoRooms);
        }
        if self.max_clients_per_room < 2 {
            return Err(ConfigError::RoomTooSmall(self.max_clients_per_room));
        }
        let min = self.max_clients_per_room;
        if self.board_size < min || self.board_size > MAX_BOARD_SIZE {
            return Err(ConfigError::BoardSize {
                size: self.board_size,
                min,
                max: MAX_BOARD_SIZE,
            });
        }
        Ok(())
    }
}

/// Messages sent from game sessions to the lobby loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    SessionEnded { room: u32 },
}

/// Lobby server owning every connection that is not in a running game
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    connections: HashMap<ConnectionId, Connection>,
    rooms: RoomManager,
    next_id: ConnectionId,

    server_tx: mpsc::UnboundedSender<ServerEvent>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        Ok(Server {
            listener,
            rooms: RoomManager::new(config.max_rooms, config.max_clients_per_room),
            config,
            connections: HashMap::new(),
            next_id: 1,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Main lobby loop
    pub async fn run(&mut self) -> ServerResult<()> {
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => error!("Error accepting connection: {}", e),
                    }
                }

                (id, result) = next_lobby_message(&mut self.connections) => {
                    match result {
                        Ok(message) => self.dispatch(id, message).await,
                        Err(e) => {
                            if let Some(conn) = self.connections.remove(&id) {
                                self.forget(conn, &e);
                            }
                        }
                    }
                }

                event = self.server_rx.recv() => {
                    match event {
                        Some(ServerEvent::SessionEnded { room }) => self.end_session(room),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Aborts every running game
    pub fn shutdown(&mut self) {
        info!(
            "Shutting down with {} lobby connections and {} rooms",
            self.connections.len(),
            self.rooms.len()
        );
        self.rooms.abort_sessions();
        self.connections.clear();
    }

    fn accept(&mut self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let id = self.next_id;
        self.next_id += 1;

        match Connection::from_stream(id, stream) {
            Ok(conn) => {
                info!("Connection {} from {}", id, addr);
                self.connections.insert(id, conn);
            }
            Err(e) => warn!("Dropping connection from {}: {}", addr, e),
        }
    }

    async fn dispatch(&mut self, id: ConnectionId, message: Message) {
        let Some(mut conn) = self.connections.remove(&id) else {
            return;
        };

        let replies = {
            let mut registry = Registry {
                rooms: &mut self.rooms,
                others: &self.connections,
            };
            conn.dispatch(&message, &mut registry)
        };

        let mut start = None;
        for reply in replies {
            match reply {
                LobbyReply::Send(msg) => {
                    if let Err(e) = conn.send(&msg).await {
                        self.forget(conn, &e);
                        return;
                    }
                }
                LobbyReply::Start(room) => start = Some(room),
            }
        }

        self.connections.insert(id, conn);
        if let Some(room) = start {
            self.start_session(room);
        }
    }

    /// Drops a lobby connection and its room membership
    fn forget(&mut self, conn: Connection, reason: &CodecError) {
        if reason.is_closed() {
            info!("{} disconnected", conn.display_name());
        } else {
            warn!("Dropping {}: {}", conn.display_name(), reason);
        }
        if let Some(room) = conn.room() {
            self.rooms.disconnect_client(conn.id(), room);
        }
    }

    /// Moves the room's connections out of the lobby into a new session task
    fn start_session(&mut self, rnum: u32) {
        let Some(room) = self.rooms.get(rnum) else {
            warn!("Cannot start unknown room {}", rnum);
            return;
        };

        let members: Vec<Connection> = room
            .members()
            .iter()
            .filter_map(|member| self.connections.remove(&member.id))
            .collect();
        let names: Vec<String> = members.iter().map(Connection::display_name).collect();

        let seed = self.config.seed.map(|seed| seed.wrapping_add(u64::from(rnum)));
        let session = GameSession::new(
            rnum,
            members,
            Box::new(Board::new(&names, self.config.board_size)),
            Box::new(RandomDice::new(seed)),
            self.server_tx.clone(),
        );

        let handle = tokio::spawn(session.run());
        if let Some(room) = self.rooms.get_mut(rnum) {
            room.set_session(handle.abort_handle());
        }
        info!("Room {} handed over to a game session: {}", rnum, names.join(", "));
    }

    fn end_session(&mut self, room: u32) {
        match self.rooms.close_room(room) {
            Ok(closed) => debug!(
                "Session of room {} ended, {} players released",
                room,
                closed.len()
            ),
            Err(e) => warn!("Session ended for {}", e),
        }
    }
}

/// Waits for the next frame on any lobby connection. Never resolves while the
/// lobby is empty. Dropping it loses no data.
async fn next_lobby_message(
    connections: &mut HashMap<ConnectionId, Connection>,
) -> (ConnectionId, Result<Message, CodecError>) {
    if connections.is_empty() {
        return std::future::pending().await;
    }

    let reads = connections.iter_mut().map(|(id, conn)| {
        let id = *id;
        Box::pin(async move { (id, conn.read_message().await) })
    });
    let (result, _index, _pending) = select_all(reads).await;
    result
}
