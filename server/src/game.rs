//! Board rules and the authoritative die
//!
//! The session drives a game only through [`RulesEngine`]; [`Board`] is the
//! default implementation. Each player owns four figures that start in a pit,
//! enter the board at the player's start field on a six, travel one lap and
//! then occupy one of four finish slots. Landing on a foreign figure sends it
//! back to its owner's pit.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::FIGURES_PER_PLAYER;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_BOARD_SIZE: usize = 40;

/// Largest board whose view still fits in one TLV value
pub const MAX_BOARD_SIZE: usize = 1000;

pub type FigureId = u8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    #[error("no figure left in the start pit")]
    EmptyPit,

    #[error("figure {0} is not on the board")]
    NotOnBoard(FigureId),

    #[error("field {0} is blocked by your own figure")]
    BlockedByOwnFigure(usize),

    #[error("figure {figure} cannot move {roll} fields past the finish")]
    Overshoot { figure: FigureId, roll: u8 },

    #[error("unknown player {0}")]
    UnknownPlayer(usize),
}

/// What happened to the board after a legal action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Placed { figure: FigureId },
    Moved { figure: FigureId, field: usize },
    Finished { figure: FigureId, slot: usize },
}

/// Where each of a player's figures currently is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerFigures {
    pub on_board: Vec<FigureId>,
    pub in_pit: Vec<FigureId>,
    pub finished: Vec<FigureId>,
}

/// Narrow interface the game session uses to drive the rules
pub trait RulesEngine: Send {
    fn figures(&self, player: usize) -> PlayerFigures;
    fn put_figure(&mut self, player: usize) -> Result<Outcome, RuleViolation>;
    fn move_figure(
        &mut self,
        player: usize,
        figure: FigureId,
        roll: u8,
    ) -> Result<Outcome, RuleViolation>;
    /// Status snapshot shown to a single player at the start of their turn
    fn status(&self, player: usize) -> String;
    /// Whole board, broadcast after every action
    fn board_view(&self) -> String;
    fn has_won(&self, player: usize) -> bool;
}

/// Source of authoritative die rolls
pub trait DiceRoller: Send {
    fn roll(&mut self) -> u8;
}

/// Six-sided die backed by a seedable RNG
pub struct RandomDice {
    rng: StdRng,
}

impl RandomDice {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl DiceRoller for RandomDice {
    fn roll(&mut self) -> u8 {
        self.rng.gen_range(1..=6)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Pit,
    Board { field: usize, travelled: usize },
    Finished { slot: usize },
}

#[derive(Debug, Clone)]
struct PlayerState {
    name: String,
    start_field: usize,
    figures: [Position; FIGURES_PER_PLAYER as usize],
}

impl PlayerState {
    fn position(&self, figure: FigureId) -> Option<Position> {
        let index = usize::from(figure).checked_sub(1)?;
        self.figures.get(index).copied()
    }

    fn set(&mut self, figure: FigureId, position: Position) {
        self.figures[usize::from(figure) - 1] = position;
    }

    fn ids_where(&self, pred: impl Fn(&Position) -> bool) -> Vec<FigureId> {
        (1..=FIGURES_PER_PLAYER)
            .zip(self.figures.iter())
            .filter(|(_, pos)| pred(pos))
            .map(|(id, _)| id)
            .collect()
    }

    fn slot_taken(&self, slot: usize) -> bool {
        self.figures
            .iter()
            .any(|pos| matches!(pos, Position::Finished { slot: s } if *s == slot))
    }
}

/// Default board: a ring of fields shared by all players
#[derive(Debug, Clone)]
pub struct Board {
    field_amount: usize,
    players: Vec<PlayerState>,
}

impl Board {
    /// Registers players in order; player `i` starts at `i * fields / players`
    pub fn new(names: &[String], field_amount: usize) -> Self {
        let count = names.len().max(1);
        let players = names
            .iter()
            .enumerate()
            .map(|(i, name)| PlayerState {
                name: name.clone(),
                start_field: i * field_amount / count,
                figures: [Position::Pit; FIGURES_PER_PLAYER as usize],
            })
            .collect();

        Self {
            field_amount,
            players,
        }
    }

    fn player(&self, player: usize) -> Result<&PlayerState, RuleViolation> {
        self.players
            .get(player)
            .ok_or(RuleViolation::UnknownPlayer(player))
    }

    /// Owner and figure on a field, if any
    fn occupant(&self, field: usize) -> Option<(usize, FigureId)> {
        self.players.iter().enumerate().find_map(|(owner, state)| {
            (1..=FIGURES_PER_PLAYER).find_map(|id| match state.position(id) {
                Some(Position::Board { field: f, .. }) if f == field => Some((owner, id)),
                _ => None,
            })
        })
    }

    /// Clears `field` for `player`, capturing a foreign figure
    fn claim_field(&mut self, player: usize, field: usize) -> Result<(), RuleViolation> {
        match self.occupant(field) {
            Some((owner, _)) if owner == player => Err(RuleViolation::BlockedByOwnFigure(field)),
            Some((owner, figure)) => {
                info!(
                    "{} captured figure {} of {} on field {}",
                    self.players[player].name, figure, self.players[owner].name, field
                );
                self.players[owner].set(figure, Position::Pit);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn figure_label(&self, owner: usize, figure: FigureId) -> String {
        format!("{}{}", owner, figure)
    }
}

impl RulesEngine for Board {
    fn figures(&self, player: usize) -> PlayerFigures {
        match self.players.get(player) {
            Some(state) => PlayerFigures {
                on_board: state.ids_where(|p| matches!(p, Position::Board { .. })),
                in_pit: state.ids_where(|p| matches!(p, Position::Pit)),
                finished: state.ids_where(|p| matches!(p, Position::Finished { .. })),
            },
            None => PlayerFigures::default(),
        }
    }

    fn put_figure(&mut self, player: usize) -> Result<Outcome, RuleViolation> {
        let state = self.player(player)?;
        let figure = *state
            .ids_where(|p| matches!(p, Position::Pit))
            .first()
            .ok_or(RuleViolation::EmptyPit)?;
        let start = state.start_field;

        self.claim_field(player, start)?;
        self.players[player].set(
            figure,
            Position::Board {
                field: start,
                travelled: 0,
            },
        );
        Ok(Outcome::Placed { figure })
    }

    fn move_figure(
        &mut self,
        player: usize,
        figure: FigureId,
        roll: u8,
    ) -> Result<Outcome, RuleViolation> {
        let state = self.player(player)?;
        let (field, travelled) = match state.position(figure) {
            Some(Position::Board { field, travelled }) => (field, travelled),
            _ => return Err(RuleViolation::NotOnBoard(figure)),
        };

        let target = travelled + usize::from(roll);
        if target >= self.field_amount {
            let slot = target - self.field_amount;
            if slot >= usize::from(FIGURES_PER_PLAYER) || state.slot_taken(slot) {
                return Err(RuleViolation::Overshoot { figure, roll });
            }
            self.players[player].set(figure, Position::Finished { slot });
            info!("{} brought figure {} home", self.players[player].name, figure);
            return Ok(Outcome::Finished { figure, slot });
        }

        let next = (field + usize::from(roll)) % self.field_amount;
        self.claim_field(player, next)?;
        self.players[player].set(
            figure,
            Position::Board {
                field: next,
                travelled: target,
            },
        );
        Ok(Outcome::Moved {
            figure,
            field: next,
        })
    }

    fn status(&self, player: usize) -> String {
        let Some(state) = self.players.get(player) else {
            return String::new();
        };
        let figures = self.figures(player);
        let mut lines = vec![format!("Status of {}:", state.name)];

        for id in &figures.on_board {
            if let Some(Position::Board { field, travelled }) = state.position(*id) {
                lines.push(format!(
                    "  figure {} on field {} ({} fields to go)",
                    id,
                    field,
                    self.field_amount - travelled
                ));
            }
        }
        lines.push(format!("  in start pit: {}", join_ids(&figures.in_pit)));
        lines.push(format!("  finished: {}", join_ids(&figures.finished)));
        lines.join("\n")
    }

    fn board_view(&self) -> String {
        let mut view = String::from("Board: ");
        for field in 0..self.field_amount {
            let cell = match self.occupant(field) {
                Some((owner, figure)) => self.figure_label(owner, figure),
                None => match self.players.iter().position(|p| p.start_field == field) {
                    Some(owner) => format!("S{}", owner),
                    None => "0".to_string(),
                },
            };
            view.push('/');
            view.push_str(&cell);
        }
        view.push('/');
        view
    }

    fn has_won(&self, player: usize) -> bool {
        self.figures(player).finished.len() == usize::from(FIGURES_PER_PLAYER)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.board_view())
    }
}

fn join_ids(ids: &[FigureId]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(players: usize, fields: usize) -> Board {
        let names: Vec<String> = (0..players).map(|i| format!("p{}", i)).collect();
        Board::new(&names, fields)
    }

    #[test]
    fn test_initial_state() {
        let board = board(4, 40);
        let figures = board.figures(2);
        assert_eq!(figures.in_pit, vec![1, 2, 3, 4]);
        assert!(figures.on_board.is_empty());
        assert!(figures.finished.is_empty());
        assert!(!board.has_won(2));
        assert_eq!(board.players[1].start_field, 10);
        assert_eq!(board.players[3].start_field, 30);
    }

    #[test]
    fn test_put_figure() {
        let mut board = board(2, 40);
        assert_eq!(board.put_figure(1).unwrap(), Outcome::Placed { figure: 1 });

        let figures = board.figures(1);
        assert_eq!(figures.on_board, vec![1]);
        assert_eq!(figures.in_pit, vec![2, 3, 4]);
        assert_eq!(board.occupant(20), Some((1, 1)));
    }

    #[test]
    fn test_put_blocked_by_own_figure() {
        let mut board = board(2, 40);
        board.put_figure(0).unwrap();
        assert_eq!(
            board.put_figure(0).unwrap_err(),
            RuleViolation::BlockedByOwnFigure(0)
        );
        assert_eq!(board.figures(0).on_board, vec![1]);
    }

    #[test]
    fn test_move_figure_wraps_around() {
        let mut board = board(2, 40);
        board.put_figure(1).unwrap();
        board.move_figure(1, 1, 6).unwrap();
        board.move_figure(1, 1, 6).unwrap();
        board.move_figure(1, 1, 6).unwrap();
        assert_eq!(
            board.move_figure(1, 1, 5).unwrap(),
            Outcome::Moved { figure: 1, field: 3 }
        );
    }

    #[test]
    fn test_move_requires_board_figure() {
        let mut board = board(2, 40);
        assert_eq!(
            board.move_figure(0, 1, 3).unwrap_err(),
            RuleViolation::NotOnBoard(1)
        );
        assert_eq!(
            board.move_figure(0, 9, 3).unwrap_err(),
            RuleViolation::NotOnBoard(9)
        );
    }

    #[test]
    fn test_capture_sends_figure_back_to_pit() {
        let mut board = board(2, 40);
        board.put_figure(0).unwrap();
        board.move_figure(0, 1, 6).unwrap();
        board.move_figure(0, 1, 6).unwrap();
        board.move_figure(0, 1, 6).unwrap();
        board.move_figure(0, 1, 2).unwrap();
        assert_eq!(board.occupant(20), Some((0, 1)));

        // player 1 enters on field 20 and captures
        board.put_figure(1).unwrap();
        assert_eq!(board.occupant(20), Some((1, 1)));
        assert_eq!(board.figures(0).in_pit, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_finish_and_win() {
        let mut board = board(2, 4);
        for slot in 0..4u8 {
            board.put_figure(0).unwrap();
            let figure = board.figures(0).on_board[0];
            assert_eq!(
                board.move_figure(0, figure, 4 + slot).unwrap(),
                Outcome::Finished {
                    figure,
                    slot: usize::from(slot)
                }
            );
        }
        assert!(board.has_won(0));
        assert!(!board.has_won(1));
        assert_eq!(board.figures(0).finished, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_overshoot_and_taken_slot() {
        let mut board = board(2, 4);
        board.put_figure(0).unwrap();
        board.move_figure(0, 1, 4).unwrap();
        board.put_figure(0).unwrap();
        assert_eq!(
            board.move_figure(0, 2, 4).unwrap_err(),
            RuleViolation::Overshoot { figure: 2, roll: 4 }
        );

        let mut long = board_with_figure_travelled(40, 38);
        assert_eq!(
            long.move_figure(0, 1, 6).unwrap_err(),
            RuleViolation::Overshoot { figure: 1, roll: 6 }
        );
    }

    fn board_with_figure_travelled(fields: usize, travelled: usize) -> Board {
        let mut board = board(2, fields);
        board.players[0].set(
            1,
            Position::Board {
                field: travelled % fields,
                travelled,
            },
        );
        board
    }

    #[test]
    fn test_status_and_board_view() {
        let mut board = board(2, 6);
        board.put_figure(0).unwrap();
        board.move_figure(0, 1, 2).unwrap();

        assert_eq!(board.board_view(), "Board: /S0/0/01/S1/0/0/");
        let status = board.status(0);
        assert!(status.contains("figure 1 on field 2 (4 fields to go)"));
        assert!(status.contains("in start pit: 2 3 4"));
        assert!(status.contains("finished: none"));
    }

    #[test]
    fn test_seeded_dice_are_reproducible() {
        let mut a = RandomDice::new(Some(7));
        let mut b = RandomDice::new(Some(7));
        for _ in 0..20 {
            let roll = a.roll();
            assert!((1..=6).contains(&roll));
            assert_eq!(roll, b.roll());
        }
    }
}
