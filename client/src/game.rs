use crate::error::ClientError;
use log::debug;
use shared::{same_nickname, Message, Tag};
use std::sync::Arc;
use tokio::sync::RwLock;

/// State shared between the reader task and the foreground
pub type SharedState = Arc<RwLock<ClientState>>;

/// What the client knows about the lobby and the running game. Updated by the
/// reader task from messages that need no reply.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub nickname: String,
    pub game_started: bool,
    /// Text of the FINISHED notification once the game is over
    pub finished: Option<String>,
    pub last_roll: Option<u8>,
    pub board: Option<String>,
    pub infos: Vec<String>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Applies an uncorrelated message and returns the lines to show the user
    pub fn apply(&mut self, message: &Message) -> Vec<String> {
        let mut display = Vec::new();

        if let Some(text) = message.get(Tag::Started) {
            debug!("Game started");
            self.game_started = true;
            self.finished = None;
            display.push(text.to_string());
        }
        if let Some(text) = message.get(Tag::Finished) {
            debug!("Game finished: {}", text);
            self.game_started = false;
            self.finished = Some(text.to_string());
        }
        if let Some(text) = message.get(Tag::Info) {
            if text.starts_with("Board:") {
                self.board = Some(text.to_string());
            }
            self.infos.push(text.to_string());
            display.push(text.to_string());
        }
        if let Some(value) = message.get(Tag::RollDiceResult) {
            self.last_roll = value.parse().ok();
        }
        if message.contains(Tag::MoveOrPlace) {
            debug!("Move or place notification received");
        }
        display
    }

    pub fn is_my_turn(&self, newturn: &str) -> bool {
        !self.nickname.is_empty() && same_nickname(&self.nickname, newturn)
    }
}

/// Result of a roll request, parsed from the server's acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollResult {
    pub roll: u8,
    pub put: Vec<u8>,
    pub moves: Vec<u8>,
    pub skip: bool,
}

impl RollResult {
    pub fn from_ack(message: &Message) -> Result<Self, ClientError> {
        let roll = message
            .get(Tag::RollDiceResult)
            .and_then(|value| value.parse::<u8>().ok())
            .ok_or_else(|| ClientError::ProtocolViolation("roll reply without a result".into()))?;

        Ok(Self {
            roll,
            put: figure_list(message, Tag::OptionPut)?,
            moves: figure_list(message, Tag::OptionMove)?,
            skip: message.contains(Tag::OptionSkip),
        })
    }

    pub fn can_put(&self) -> bool {
        !self.put.is_empty()
    }

    pub fn can_move(&self) -> bool {
        !self.moves.is_empty()
    }
}

fn figure_list(message: &Message, tag: Tag) -> Result<Vec<u8>, ClientError> {
    message
        .get_list(tag)
        .unwrap_or_default()
        .iter()
        .map(|id| {
            id.parse::<u8>()
                .map_err(|_| ClientError::ProtocolViolation(format!("bad figure id {:?}", id)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_and_finished() {
        let mut state = ClientState::new();
        let shown = state.apply(
            &Message::single(Tag::Started, "*****Game Started*****").with(Tag::Info, "2 players"),
        );
        assert!(state.game_started);
        assert_eq!(shown, vec!["*****Game Started*****", "2 players"]);

        state.apply(&Message::single(Tag::Finished, "bob won"));
        assert!(!state.game_started);
        assert_eq!(state.finished.as_deref(), Some("bob won"));
    }

    #[test]
    fn test_board_and_roll_tracking() {
        let mut state = ClientState::new();
        state.apply(&Message::single(Tag::Info, "Board: /S0/0/"));
        state.apply(&Message::single(Tag::RollDiceResult, "4"));
        assert_eq!(state.board.as_deref(), Some("Board: /S0/0/"));
        assert_eq!(state.last_roll, Some(4));
        assert_eq!(state.infos.len(), 1);
    }

    #[test]
    fn test_turn_matching_ignores_case() {
        let mut state = ClientState::new();
        assert!(!state.is_my_turn(""));
        state.nickname = "Alice".to_string();
        assert!(state.is_my_turn("ALICE"));
        assert!(state.is_my_turn("alice"));
        assert!(!state.is_my_turn("bob"));
    }

    #[test]
    fn test_roll_result_from_ack() {
        let ack = Message::single(Tag::Ok, "You rolled 6")
            .with(Tag::RollDiceResult, "6")
            .with_list(Tag::OptionPut, &["2", "3"])
            .with_list(Tag::OptionMove, &["1"]);
        let result = RollResult::from_ack(&ack).unwrap();
        assert_eq!(result.roll, 6);
        assert_eq!(result.put, vec![2, 3]);
        assert_eq!(result.moves, vec![1]);
        assert!(!result.skip);
        assert!(result.can_put() && result.can_move());

        let skip = Message::single(Tag::Ok, "You rolled 2")
            .with(Tag::RollDiceResult, "2")
            .with(Tag::OptionSkip, "-");
        let result = RollResult::from_ack(&skip).unwrap();
        assert!(result.skip);
        assert!(!result.can_put() && !result.can_move());
    }

    #[test]
    fn test_roll_result_requires_roll() {
        let ack = Message::single(Tag::Ok, "no roll");
        assert!(matches!(
            RollResult::from_ack(&ack),
            Err(ClientError::ProtocolViolation(_))
        ));
    }
}
