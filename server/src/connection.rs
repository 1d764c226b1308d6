//! Per-client connection and the lobby dispatch table
//!
//! A `Connection` is owned by exactly one place at a time: the lobby's
//! connection map while the client is choosing a name and a room, then the
//! game session of its room once the game starts.

use crate::room::{Member, RoomManager};
use futures::SinkExt;
use log::{debug, info, warn};
use shared::{
    message_reader, message_writer, read_message, same_nickname, CodecError, Message,
    MessageReader, MessageWriter, Tag, LIST_DELIMITER, PAD_CHAR,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub type ConnectionId = u32;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle of a lobby connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Named,
    InRoom(u32),
}

/// Things that move a connection through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyEvent {
    Named,
    Joined(u32),
}

impl ConnectionState {
    /// Next state, or `None` if the event is not allowed here
    pub fn transition(self, event: LobbyEvent) -> Option<ConnectionState> {
        match (self, event) {
            (ConnectionState::Connected, LobbyEvent::Named) => Some(ConnectionState::Named),
            (ConnectionState::Named, LobbyEvent::Joined(room))
            | (ConnectionState::InRoom(_), LobbyEvent::Joined(room)) => {
                Some(ConnectionState::InRoom(room))
            }
            _ => None,
        }
    }

    pub fn room(self) -> Option<u32> {
        match self {
            ConnectionState::InRoom(room) => Some(room),
            _ => None,
        }
    }
}

/// What the lobby must do after a handler ran
#[derive(Debug, PartialEq)]
pub enum LobbyReply {
    Send(Message),
    /// Hand the room's members over to a new game session
    Start(u32),
}

/// Lobby state visible to a handler. The connection being handled is not in
/// `others` while its handlers run.
pub struct Registry<'a> {
    pub rooms: &'a mut RoomManager,
    pub others: &'a HashMap<ConnectionId, Connection>,
}

impl Registry<'_> {
    fn name_taken(&self, name: &str) -> bool {
        let in_lobby = self
            .others
            .values()
            .any(|c| c.name().is_some_and(|other| same_nickname(other, name)));
        in_lobby || self.rooms.has_member_named(name)
    }
}

pub type LobbyHandler = fn(&mut Connection, &mut Registry<'_>, &str) -> LobbyReply;

/// Static lobby dispatch table
pub fn lobby_handler(tag: Tag) -> Option<LobbyHandler> {
    match tag {
        Tag::Nickname => Some(handle_nickname),
        Tag::Room => Some(handle_room),
        Tag::GetRooms => Some(handle_get_rooms),
        Tag::GetUserInfo => Some(handle_get_userinfo),
        Tag::Start => Some(handle_start),
        Tag::Info
        | Tag::Ok
        | Tag::Fail
        | Tag::RollDiceResult
        | Tag::Started
        | Tag::Finished
        | Tag::NewTurn
        | Tag::RollDice
        | Tag::MoveOrPlace
        | Tag::PlaceFigure
        | Tag::MoveFigure
        | Tag::OptionPut
        | Tag::OptionMove
        | Tag::OptionSkip => None,
    }
}

fn handle_nickname(conn: &mut Connection, registry: &mut Registry<'_>, value: &str) -> LobbyReply {
    if conn.state != ConnectionState::Connected {
        return fail("Nickname already set");
    }

    let name = value.trim();
    if name.is_empty() {
        return fail("Nickname must not be empty");
    }
    if name.contains(PAD_CHAR) || name.contains(LIST_DELIMITER) {
        return fail(format!(
            "Nickname must not contain {:?} or {:?}",
            PAD_CHAR, LIST_DELIMITER
        ));
    }
    if registry.name_taken(name) {
        info!("Connection {} asked for taken nickname {}", conn.id, name);
        return fail(format!("Nickname {} is already taken", name));
    }

    conn.advance(LobbyEvent::Named);
    conn.name = Some(name.to_string());
    info!("Connection {} from {} is now {}", conn.id, conn.peer, name);

    let welcome = format!(
        "***Welcome to the server, {}!***\n{}\nYou can join or create a room by its number",
        name,
        registry.rooms.rooms_description()
    );
    LobbyReply::Send(Message::single(Tag::Ok, welcome))
}

fn handle_room(conn: &mut Connection, registry: &mut Registry<'_>, value: &str) -> LobbyReply {
    let Some(name) = conn.name.clone() else {
        return fail("Set a nickname first");
    };

    let rnum = match value.trim().parse::<u32>() {
        Ok(rnum) if rnum > 0 => rnum,
        _ => return fail(format!("Invalid room number: {}", value)),
    };

    let current = conn.state.room();
    match registry
        .rooms
        .join_client(Member::new(conn.id, name), current, rnum)
    {
        Ok(()) => {
            conn.advance(LobbyEvent::Joined(rnum));
            LobbyReply::Send(Message::single(
                Tag::Ok,
                format!("You have joined room {}", rnum),
            ))
        }
        Err(e) => fail(e.to_string()),
    }
}

fn handle_get_rooms(
    _conn: &mut Connection,
    registry: &mut Registry<'_>,
    _value: &str,
) -> LobbyReply {
    info_reply(registry.rooms.rooms_description())
}

fn handle_get_userinfo(
    conn: &mut Connection,
    _registry: &mut Registry<'_>,
    _value: &str,
) -> LobbyReply {
    LobbyReply::Send(Message::single(Tag::Info, conn.user_info()))
}

fn handle_start(conn: &mut Connection, registry: &mut Registry<'_>, _value: &str) -> LobbyReply {
    let Some(rnum) = conn.state.room() else {
        return info_reply("Join a room before starting a game");
    };
    let Some(room) = registry.rooms.get(rnum) else {
        return info_reply(format!("Room {} does not exist", rnum));
    };

    if room.in_game() {
        return info_reply(format!("Room {} is already playing", rnum));
    }
    if room.len() < 2 {
        return info_reply(format!(
            "Room {} needs at least 2 players to start, it has {}",
            rnum,
            room.len()
        ));
    }

    LobbyReply::Start(rnum)
}

fn fail(text: impl Into<String>) -> LobbyReply {
    LobbyReply::Send(Message::single(Tag::Fail, text))
}

fn info_reply(text: impl Into<String>) -> LobbyReply {
    LobbyReply::Send(Message::single(Tag::Info, text))
}

/// A client socket plus its lobby state
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    name: Option<String>,
    state: ConnectionState,
    reader: MessageReader<BoxedReader>,
    writer: MessageWriter<BoxedWriter>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        reader: BoxedReader,
        writer: BoxedWriter,
    ) -> Self {
        Self {
            id,
            peer,
            name: None,
            state: ConnectionState::Connected,
            reader: message_reader(reader),
            writer: message_writer(writer),
        }
    }

    pub fn from_stream(id: ConnectionId, stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self::new(id, peer, Box::new(read_half), Box::new(write_half)))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for log lines and broadcasts, falling back to the id
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("connection {}", self.id),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn room(&self) -> Option<u32> {
        self.state.room()
    }

    fn advance(&mut self, event: LobbyEvent) {
        match self.state.transition(event) {
            Some(next) => {
                debug!("Connection {}: {:?} -> {:?}", self.id, self.state, next);
                self.state = next;
            }
            None => warn!(
                "Connection {}: ignored {:?} in state {:?}",
                self.id, event, self.state
            ),
        }
    }

    fn user_info(&self) -> String {
        let room = match self.state.room() {
            Some(room) => room.to_string(),
            None => "none".to_string(),
        };
        format!(
            "Name: {}\nAddress: {}\nRoom: {}",
            self.name.as_deref().unwrap_or("not set"),
            self.peer,
            room
        )
    }

    /// Runs the lobby handler of every tag in `message`, in wire order
    pub fn dispatch(&mut self, message: &Message, registry: &mut Registry<'_>) -> Vec<LobbyReply> {
        let mut replies = Vec::new();
        for (tag, value) in message.iter() {
            match lobby_handler(tag) {
                Some(handler) => replies.push(handler(self, registry, value)),
                None => warn!(
                    "No lobby handler for tag {} from {}",
                    tag,
                    self.display_name()
                ),
            }
        }
        replies
    }

    /// Waits for the next frame. Cancel safe.
    pub async fn read_message(&mut self) -> Result<Message, CodecError> {
        read_message(&mut self.reader).await
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), CodecError> {
        self.writer.send(message).await
    }

    /// Flushes and closes the write side; the peer sees EOF
    pub async fn shutdown(&mut self) {
        if let Err(e) = SinkExt::<&Message>::close(&mut self.writer).await {
            debug!("Shutdown of {} failed: {}", self.display_name(), e);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
