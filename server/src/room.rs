//! Room registry for the lobby
//!
//! This module tracks which connections sit in which room:
//! - Room creation on first join and deletion once the last member leaves
//! - Capacity enforcement (members per room, number of rooms)
//! - Bookkeeping of the game session running in a room
//!
//! The registry is owned by the lobby loop and only mutated between its
//! multiplex waits, so it carries no locks. Sessions ask the lobby to close
//! their room through an event instead of touching the registry directly.

use crate::connection::ConnectionId;
use log::{info, warn};
use shared::same_nickname;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tokio::task::AbortHandle;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room {room} is full ({max} players max)")]
    RoomFull { room: u32, max: usize },

    #[error("Maximum number of rooms ({max}) reached")]
    TooManyRooms { max: usize },

    #[error("Room {0} is already playing")]
    InGame(u32),

    #[error("Room {0} does not exist")]
    UnknownRoom(u32),
}

/// A connection as seen by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: ConnectionId,
    pub name: String,
}

impl Member {
    pub fn new(id: ConnectionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A numbered room and its members in join order
#[derive(Debug)]
pub struct Room {
    number: u32,
    members: Vec<Member>,
    max_members: usize,
    session: Option<AbortHandle>,
}

impl Room {
    pub fn new(number: u32, max_members: usize) -> Self {
        Self {
            number,
            members: Vec::new(),
            max_members,
            session: None,
        }
    }

    /// Adds a member at the end of the join order
    ///
    /// Fails when the room is full or a game is already running in it.
    pub fn join(&mut self, member: Member) -> Result<(), RoomError> {
        if self.in_game() {
            return Err(RoomError::InGame(self.number));
        }
        if self.members.len() >= self.max_members {
            return Err(RoomError::RoomFull {
                room: self.number,
                max: self.max_members,
            });
        }

        info!("{} joined room {}", member.name, self.number);
        self.members.push(member);
        Ok(())
    }

    /// Removes a member. Returns false if it was not in this room.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        match self.members.iter().position(|m| m.id == id) {
            Some(index) => {
                let member = self.members.remove(index);
                info!("{} left room {}", member.name, self.number);
                true
            }
            None => {
                warn!("Connection {} is not a member of room {}", id, self.number);
                false
            }
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn in_game(&self) -> bool {
        self.session.is_some()
    }

    /// Records the session now owning this room's connections
    pub fn set_session(&mut self, handle: AbortHandle) {
        self.session = Some(handle);
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Room {}: {} / {} clients",
            self.number,
            self.members.len(),
            self.max_members
        )?;
        if self.in_game() {
            write!(f, " (in game)")?;
        }
        Ok(())
    }
}

/// Registry of all rooms keyed by room number
#[derive(Debug)]
pub struct RoomManager {
    rooms: BTreeMap<u32, Room>,
    max_rooms: usize,
    max_clients_per_room: usize,
}

impl RoomManager {
    pub fn new(max_rooms: usize, max_clients_per_room: usize) -> Self {
        Self {
            rooms: BTreeMap::new(),
            max_rooms,
            max_clients_per_room,
        }
    }

    /// Moves `member` into room `rnum`, creating the room if needed.
    ///
    /// `current` is the room the member sits in right now. The old membership
    /// is only dropped once the new join is known to succeed, so a failed
    /// join leaves the registry untouched.
    pub fn join_client(
        &mut self,
        member: Member,
        current: Option<u32>,
        rnum: u32,
    ) -> Result<(), RoomError> {
        if current == Some(rnum) {
            return Ok(());
        }

        match self.rooms.get(&rnum) {
            Some(room) => {
                if room.in_game() {
                    return Err(RoomError::InGame(rnum));
                }
                if room.len() >= self.max_clients_per_room {
                    warn!("Room {} is full", rnum);
                    return Err(RoomError::RoomFull {
                        room: rnum,
                        max: self.max_clients_per_room,
                    });
                }
            }
            None => {
                let freed = current
                    .and_then(|old| self.rooms.get(&old))
                    .map_or(0, |old| usize::from(old.len() == 1));
                if self.rooms.len() - freed >= self.max_rooms {
                    warn!("Cannot create room {}: limit of {} reached", rnum, self.max_rooms);
                    return Err(RoomError::TooManyRooms {
                        max: self.max_rooms,
                    });
                }
            }
        }

        if let Some(old) = current {
            self.disconnect_client(member.id, old);
        }

        let max = self.max_clients_per_room;
        let room = self.rooms.entry(rnum).or_insert_with(|| {
            info!("Created room {}", rnum);
            Room::new(rnum, max)
        });
        room.join(member)
    }

    /// Removes a member from its room and deletes the room once empty
    pub fn disconnect_client(&mut self, id: ConnectionId, rnum: u32) {
        let Some(room) = self.rooms.get_mut(&rnum) else {
            warn!("Connection {} left unknown room {}", id, rnum);
            return;
        };

        room.remove(id);
        if room.is_empty() {
            self.rooms.remove(&rnum);
            info!("Room {} is empty and was removed", rnum);
        }
    }

    /// Removes a room regardless of its members
    pub fn close_room(&mut self, rnum: u32) -> Result<Room, RoomError> {
        let room = self.rooms.remove(&rnum).ok_or(RoomError::UnknownRoom(rnum))?;
        info!("Closed room {} with {} members", rnum, room.len());
        Ok(room)
    }

    pub fn get(&self, rnum: u32) -> Option<&Room> {
        self.rooms.get(&rnum)
    }

    pub fn get_mut(&mut self, rnum: u32) -> Option<&mut Room> {
        self.rooms.get_mut(&rnum)
    }

    /// True if a member with this name sits in any room
    pub fn has_member_named(&self, name: &str) -> bool {
        self.rooms
            .values()
            .flat_map(|room| room.members())
            .any(|member| same_nickname(&member.name, name))
    }

    /// Aborts every running session, used on server shutdown
    pub fn abort_sessions(&mut self) {
        for room in self.rooms.values_mut() {
            if let Some(handle) = room.session.take() {
                handle.abort();
            }
        }
    }

    /// Text listing of every room and its occupancy
    pub fn rooms_description(&self) -> String {
        let mut msg = format!("Number of rooms created: {}", self.rooms.len());
        for room in self.rooms.values() {
            msg.push('\n');
            msg.push_str(&room.to_string());
        }
        msg
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: ConnectionId) -> Member {
        Member::new(id, format!("player{}", id))
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new(3, 4);
        assert_eq!(room.number(), 3);
        assert!(room.is_empty());
        assert!(!room.in_game());
        assert_eq!(room.to_string(), "Room 3: 0 / 4 clients");
    }

    #[test]
    fn test_join_creates_room() {
        let mut manager = RoomManager::new(10, 4);
        manager.join_client(member(1), None, 3).unwrap();

        assert_eq!(manager.len(), 1);
        let room = manager.get(3).unwrap();
        assert_eq!(room.members(), &[member(1)]);
    }

    #[test]
    fn test_join_existing_room_keeps_order() {
        let mut manager = RoomManager::new(10, 4);
        manager.join_client(member(1), None, 3).unwrap();
        manager.join_client(member(2), None, 3).unwrap();
        manager.join_client(member(3), None, 3).unwrap();

        let ids: Vec<_> = manager.get(3).unwrap().members().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_join_full_room_fails() {
        let k = 2;
        let mut manager = RoomManager::new(10, k);
        manager.join_client(member(1), None, 1).unwrap();
        manager.join_client(member(2), None, 1).unwrap();

        let err = manager.join_client(member(3), None, 1).unwrap_err();
        assert_eq!(err, RoomError::RoomFull { room: 1, max: k });
        assert_eq!(manager.get(1).unwrap().len(), k);
    }

    #[test]
    fn test_full_room_does_not_drop_old_membership() {
        let mut manager = RoomManager::new(10, 1);
        manager.join_client(member(1), None, 1).unwrap();
        manager.join_client(member(2), None, 2).unwrap();

        assert!(manager.join_client(member(2), Some(2), 1).is_err());
        assert_eq!(manager.get(2).unwrap().members(), &[member(2)]);
    }

    #[test]
    fn test_too_many_rooms() {
        let m = 2;
        let mut manager = RoomManager::new(m, 4);
        manager.join_client(member(1), None, 1).unwrap();
        manager.join_client(member(2), None, 2).unwrap();

        let err = manager.join_client(member(3), None, 3).unwrap_err();
        assert_eq!(err, RoomError::TooManyRooms { max: m });
        assert_eq!(manager.len(), m);
        assert!(manager.get(3).is_none());
    }

    #[test]
    fn test_switching_room_removes_from_old() {
        let mut manager = RoomManager::new(10, 4);
        manager.join_client(member(1), None, 1).unwrap();
        manager.join_client(member(2), None, 1).unwrap();

        manager.join_client(member(1), Some(1), 2).unwrap();

        assert_eq!(manager.get(1).unwrap().members(), &[member(2)]);
        assert_eq!(manager.get(2).unwrap().members(), &[member(1)]);
    }

    #[test]
    fn test_switching_deletes_emptied_room() {
        let mut manager = RoomManager::new(10, 4);
        manager.join_client(member(1), None, 1).unwrap();
        manager.join_client(member(1), Some(1), 2).unwrap();

        assert!(manager.get(1).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_switching_at_room_limit_reuses_freed_slot() {
        let mut manager = RoomManager::new(1, 4);
        manager.join_client(member(1), None, 1).unwrap();
        manager.join_client(member(1), Some(1), 2).unwrap();

        assert!(manager.get(1).is_none());
        assert!(manager.get(2).is_some());
    }

    #[test]
    fn test_rejoining_same_room_is_noop() {
        let mut manager = RoomManager::new(10, 4);
        manager.join_client(member(1), None, 1).unwrap();
        manager.join_client(member(1), Some(1), 1).unwrap();
        assert_eq!(manager.get(1).unwrap().len(), 1);
    }

    #[test]
    fn test_disconnect_client() {
        let mut manager = RoomManager::new(10, 4);
        manager.join_client(member(1), None, 1).unwrap();
        manager.join_client(member(2), None, 1).unwrap();

        manager.disconnect_client(1, 1);
        assert_eq!(manager.get(1).unwrap().len(), 1);

        manager.disconnect_client(2, 1);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_disconnect_unknown_room_is_harmless() {
        let mut manager = RoomManager::new(10, 4);
        manager.disconnect_client(1, 42);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_close_room() {
        let mut manager = RoomManager::new(10, 4);
        manager.join_client(member(1), None, 5).unwrap();
        manager.join_client(member(2), None, 5).unwrap();

        let room = manager.close_room(5).unwrap();
        assert_eq!(room.len(), 2);
        assert!(manager.get(5).is_none());
        assert_eq!(manager.close_room(5).unwrap_err(), RoomError::UnknownRoom(5));
    }

    #[test]
    fn test_has_member_named() {
        let mut manager = RoomManager::new(10, 4);
        manager
            .join_client(Member::new(1, "alice"), None, 1)
            .unwrap();
        assert!(manager.has_member_named("alice"));
        assert!(manager.has_member_named("Alice"));
        assert!(!manager.has_member_named("bob"));
    }

    #[test]
    fn test_rooms_description() {
        let mut manager = RoomManager::new(10, 4);
        manager.join_client(member(1), None, 2).unwrap();
        manager.join_client(member(2), None, 1).unwrap();

        assert_eq!(
            manager.rooms_description(),
            "Number of rooms created: 2\nRoom 1: 1 / 4 clients\nRoom 2: 1 / 4 clients"
        );
    }

    #[tokio::test]
    async fn test_room_in_game_rejects_join() {
        let mut manager = RoomManager::new(10, 4);
        manager.join_client(member(1), None, 1).unwrap();
        manager.join_client(member(2), None, 1).unwrap();

        let task = tokio::spawn(std::future::pending::<()>());
        manager.get_mut(1).unwrap().set_session(task.abort_handle());

        assert_eq!(
            manager.join_client(member(3), None, 1).unwrap_err(),
            RoomError::InGame(1)
        );
        assert!(manager.get(1).unwrap().to_string().ends_with("(in game)"));

        manager.abort_sessions();
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
