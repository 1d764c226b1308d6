//! Turn loop of a running game
//!
//! A `GameSession` owns the connections of one room for the whole game and
//! runs as its own task. It only reads from its own members, so a slow room
//! never blocks the lobby or other rooms. When the game ends, for whatever
//! reason, every member socket is closed and the lobby is told to drop the
//! room through [`ServerEvent::SessionEnded`].

use crate::connection::Connection;
use crate::game::{DiceRoller, FigureId, Outcome, PlayerFigures, RulesEngine};
use crate::network::ServerEvent;
use futures::future::select_all;
use log::{debug, info, warn};
use shared::{CodecError, Message, Tag, EMPTY_VALUE};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("lost connection to {name}: {source}")]
    MemberLost {
        name: String,
        #[source]
        source: CodecError,
    },

    /// A message built by the session could not be encoded; no player left
    #[error("could not encode a game message: {0}")]
    Encode(#[source] CodecError),

    #[error("a game needs at least 2 players, got {0}")]
    NotEnoughPlayers(usize),
}

impl SessionError {
    /// Blames `member` only when the error came from its socket
    fn on_send(member: &Connection, source: CodecError) -> Self {
        match source {
            CodecError::Io(_) | CodecError::ConnectionClosed => SessionError::MemberLost {
                name: member.display_name(),
                source,
            },
            local => SessionError::Encode(local),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Starting,
    AwaitingRoll,
    AwaitingAction,
    Applying,
    Skipping,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    TurnBegan,
    Rolled { can_act: bool },
    ActionChosen,
    Won,
    Aborted,
}

impl TurnPhase {
    pub fn transition(self, event: TurnEvent) -> Option<TurnPhase> {
        use TurnPhase::*;
        match (self, event) {
            (Finished, _) => None,
            (_, TurnEvent::Aborted) => Some(Finished),
            (Starting | Applying | Skipping, TurnEvent::TurnBegan) => Some(AwaitingRoll),
            (AwaitingRoll, TurnEvent::Rolled { can_act: true }) => Some(AwaitingAction),
            (AwaitingRoll, TurnEvent::Rolled { can_act: false }) => Some(Skipping),
            (AwaitingAction, TurnEvent::ActionChosen) => Some(Applying),
            (Applying, TurnEvent::Won) => Some(Finished),
            _ => None,
        }
    }
}

/// Action requested by a member during the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Put,
    Move(FigureId),
}

/// Per-turn fields, cleared whenever a new turn begins
#[derive(Debug, Default)]
pub struct TurnState {
    roll: Option<u8>,
    action: Option<Action>,
}

/// Options offered to the current player after a roll
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TurnOptions {
    pub put: Vec<FigureId>,
    pub moves: Vec<FigureId>,
}

impl TurnOptions {
    pub fn for_roll(figures: &PlayerFigures, roll: u8) -> Self {
        let put = if roll == 6 {
            figures.in_pit.clone()
        } else {
            Vec::new()
        };
        Self {
            put,
            moves: figures.on_board.clone(),
        }
    }

    pub fn is_skip(&self) -> bool {
        self.put.is_empty() && self.moves.is_empty()
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Put => !self.put.is_empty(),
            Action::Move(figure) => self.moves.contains(&figure),
        }
    }

    /// Adds the option tags to an acknowledgement
    fn write_to(&self, message: &mut Message) {
        if self.is_skip() {
            message.insert(Tag::OptionSkip, EMPTY_VALUE);
            return;
        }
        if !self.put.is_empty() {
            message.insert_list(Tag::OptionPut, &ids(&self.put));
        }
        if !self.moves.is_empty() {
            message.insert_list(Tag::OptionMove, &ids(&self.moves));
        }
    }
}

fn ids(figures: &[FigureId]) -> Vec<String> {
    figures.iter().map(|id| id.to_string()).collect()
}

type SessionHandler = fn(&mut TurnState, &mut dyn DiceRoller, &str);

/// Static in-game dispatch table. The sender is not checked.
fn session_handler(tag: Tag) -> Option<SessionHandler> {
    match tag {
        Tag::RollDice => Some(handle_roll_dice),
        Tag::PlaceFigure => Some(handle_place_figure),
        Tag::MoveFigure => Some(handle_move_figure),
        Tag::Nickname
        | Tag::Room
        | Tag::Info
        | Tag::Ok
        | Tag::Fail
        | Tag::RollDiceResult
        | Tag::GetRooms
        | Tag::GetUserInfo
        | Tag::Start
        | Tag::Started
        | Tag::Finished
        | Tag::NewTurn
        | Tag::MoveOrPlace
        | Tag::OptionPut
        | Tag::OptionMove
        | Tag::OptionSkip => None,
    }
}

fn handle_roll_dice(turn: &mut TurnState, dice: &mut dyn DiceRoller, _value: &str) {
    match turn.roll {
        Some(roll) => debug!("Ignoring second roll request, already rolled {}", roll),
        None => turn.roll = Some(dice.roll()),
    }
}

fn handle_place_figure(turn: &mut TurnState, _dice: &mut dyn DiceRoller, _value: &str) {
    if turn.roll.is_some() {
        turn.action = Some(Action::Put);
    }
}

fn handle_move_figure(turn: &mut TurnState, _dice: &mut dyn DiceRoller, value: &str) {
    if turn.roll.is_none() {
        return;
    }
    match value.trim().parse::<FigureId>() {
        Ok(figure) => turn.action = Some(Action::Move(figure)),
        Err(_) => warn!("Ignoring move of invalid figure {:?}", value),
    }
}

pub struct GameSession {
    room: u32,
    members: Vec<Connection>,
    rules: Box<dyn RulesEngine>,
    dice: Box<dyn DiceRoller>,
    current: usize,
    phase: TurnPhase,
    turn: TurnState,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl GameSession {
    /// `members` must be in join order; player `i` of the rules engine is
    /// `members[i]`.
    pub fn new(
        room: u32,
        members: Vec<Connection>,
        rules: Box<dyn RulesEngine>,
        dice: Box<dyn DiceRoller>,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            room,
            members,
            rules,
            dice,
            current: 0,
            phase: TurnPhase::Starting,
            turn: TurnState::default(),
            events,
        }
    }

    /// Plays the game to the end and returns the winner's name.
    ///
    /// Every exit path closes all member sockets and reports the end of the
    /// session to the lobby.
    pub async fn run(mut self) -> Result<String, SessionError> {
        info!(
            "Game started in room {} with {} players",
            self.room,
            self.members.len()
        );
        let result = self.play().await;

        match &result {
            Ok(winner) => info!("Game in room {} won by {}", self.room, winner),
            Err(e) => {
                warn!("Game in room {} aborted: {}", self.room, e);
                self.advance(TurnEvent::Aborted);
                self.notify_abort(e).await;
            }
        }

        for member in &mut self.members {
            member.shutdown().await;
        }
        if self
            .events
            .send(ServerEvent::SessionEnded { room: self.room })
            .is_err()
        {
            debug!("Lobby is gone, room {} not reported", self.room);
        }
        result
    }

    async fn play(&mut self) -> Result<String, SessionError> {
        if self.members.len() < 2 {
            return Err(SessionError::NotEnoughPlayers(self.members.len()));
        }

        let started = Message::single(Tag::Started, "*****Game Started*****")
            .with(Tag::Info, self.game_status());
        self.broadcast(&started).await?;

        loop {
            self.begin_turn().await?;

            while self.turn.roll.is_none() {
                self.receive().await?;
            }
            let roll = self.turn.roll.unwrap_or_default();
            let options = TurnOptions::for_roll(&self.rules.figures(self.current), roll);
            self.send_roll_result(roll, &options).await?;

            self.advance(TurnEvent::Rolled {
                can_act: !options.is_skip(),
            });
            if options.is_skip() {
                info!("{} rolled {} and skips", self.current_name(), roll);
                self.next_player();
                continue;
            }

            let action = self.wait_for_action(&options).await?;
            self.advance(TurnEvent::ActionChosen);
            self.apply(action, roll).await?;

            if self.rules.has_won(self.current) {
                self.advance(TurnEvent::Won);
                let winner = self.current_name();
                let finished = Message::single(Tag::Finished, format!("{} won", winner))
                    .with(Tag::Info, format!("Game over! {} won the game", winner));
                self.broadcast(&finished).await?;
                return Ok(winner);
            }
            self.next_player();
        }
    }

    async fn begin_turn(&mut self) -> Result<(), SessionError> {
        self.turn = TurnState::default();
        self.advance(TurnEvent::TurnBegan);

        let name = self.current_name();
        debug!("Room {}: turn of {}", self.room, name);
        self.broadcast(&Message::single(Tag::NewTurn, name)).await?;

        let status = Message::single(Tag::Info, self.rules.status(self.current));
        self.send_to(self.current, &status).await
    }

    async fn send_roll_result(
        &mut self,
        roll: u8,
        options: &TurnOptions,
    ) -> Result<(), SessionError> {
        let mut ack = Message::single(Tag::Ok, format!("You rolled {}", roll))
            .with(Tag::RollDiceResult, roll.to_string());
        options.write_to(&mut ack);
        self.send_to(self.current, &ack).await
    }

    async fn wait_for_action(&mut self, options: &TurnOptions) -> Result<Action, SessionError> {
        loop {
            if let Some(action) = self.turn.action.take() {
                if options.allows(action) {
                    return Ok(action);
                }
                let reject = Message::single(
                    Tag::Info,
                    format!("{:?} is not one of your options, choose again", action),
                );
                self.send_to(self.current, &reject).await?;
            }
            self.receive().await?;
        }
    }

    async fn apply(&mut self, action: Action, roll: u8) -> Result<(), SessionError> {
        let result = match action {
            Action::Put => self.rules.put_figure(self.current),
            Action::Move(figure) => self.rules.move_figure(self.current, figure, roll),
        };

        match result {
            Ok(outcome) => {
                self.log_outcome(&outcome);
                let board = Message::single(Tag::Info, self.rules.board_view());
                self.broadcast(&board).await
            }
            Err(violation) => {
                info!("{}: {}", self.current_name(), violation);
                let text = format!("Illegal move: {}. Your turn is over", violation);
                self.send_to(self.current, &Message::single(Tag::Info, text))
                    .await
            }
        }
    }

    fn log_outcome(&self, outcome: &Outcome) {
        let name = self.current_name();
        match outcome {
            Outcome::Placed { figure } => info!("{} placed figure {}", name, figure),
            Outcome::Moved { figure, field } => {
                info!("{} moved figure {} to field {}", name, figure, field)
            }
            Outcome::Finished { figure, slot } => {
                info!("{} finished figure {} in slot {}", name, figure, slot)
            }
        }
    }

    /// Waits for one message from any member and runs its handlers
    async fn receive(&mut self) -> Result<(), SessionError> {
        let (result, index) = {
            let reads = self.members.iter_mut().map(|m| Box::pin(m.read_message()));
            let (result, index, _pending) = select_all(reads).await;
            (result, index)
        };

        let message = result.map_err(|source| SessionError::MemberLost {
            name: self.members[index].display_name(),
            source,
        })?;

        if index != self.current {
            debug!(
                "Room {}: message from {} during the turn of {}",
                self.room,
                self.members[index].display_name(),
                self.current_name()
            );
        }
        for (tag, value) in message.iter() {
            match session_handler(tag) {
                Some(handler) => handler(&mut self.turn, self.dice.as_mut(), value),
                None => warn!("No game handler for tag {}", tag),
            }
        }
        Ok(())
    }

    async fn broadcast(&mut self, message: &Message) -> Result<(), SessionError> {
        for member in &mut self.members {
            if let Err(source) = member.send(message).await {
                return Err(SessionError::on_send(member, source));
            }
        }
        Ok(())
    }

    async fn send_to(&mut self, index: usize, message: &Message) -> Result<(), SessionError> {
        let member = &mut self.members[index];
        member
            .send(message)
            .await
            .map_err(|source| SessionError::on_send(member, source))
    }

    /// Best effort, the remaining members may be gone as well
    async fn notify_abort(&mut self, error: &SessionError) {
        let text = match error {
            SessionError::MemberLost { name, .. } => format!("{} left the game", name),
            other => other.to_string(),
        };
        let message = Message::single(Tag::Info, text).with(Tag::Finished, "Game aborted");
        for member in &mut self.members {
            if let Err(e) = member.send(&message).await {
                debug!("Could not notify {}: {}", member.display_name(), e);
            }
        }
    }

    fn advance(&mut self, event: TurnEvent) {
        match self.phase.transition(event) {
            Some(next) => self.phase = next,
            None => warn!(
                "Room {}: ignored {:?} in phase {:?}",
                self.room, event, self.phase
            ),
        }
    }

    fn next_player(&mut self) {
        self.current = (self.current + 1) % self.members.len();
    }

    fn current_name(&self) -> String {
        self.members[self.current].display_name()
    }

    fn game_status(&self) -> String {
        let order: Vec<String> = self.members.iter().map(|m| m.display_name()).collect();
        format!(
            "Game running: YES\nNumber of players: {}\nTurn order: {}",
            self.members.len(),
            order.join(", ")
        )
    }
}
