//! Text menus and the interactive command loop

use crate::error::ClientError;
use crate::game::RollResult;
use crate::network::Client;
use log::{debug, info};
use shared::PAD_CHAR;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::time::{timeout, Duration};

pub const MENU_TEXT: &str = "Options:\n\
    1 GET_ROOMS      list rooms\n\
    2 GET_USER_INFO  show your info\n\
    3 START          start the game in your room\n\
    4 HELP           show this menu\n\
    5 EXIT           leave the server";

pub const GAME_MENU_TEXT: &str = "Choose an action:\n\
    1 MOVE FIGURE\n\
    2 PLACE FIGURE\n\
    0 EXIT";

/// Lobby menu entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    GetRooms,
    GetUserInfo,
    Start,
    Help,
    Exit,
}

/// In-game choices after a roll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameChoice {
    Move,
    Place,
    Exit,
}

/// Accepts the menu number or the command name, in any case
pub fn parse_menu(line: &str) -> Option<MenuCommand> {
    match line.trim().to_uppercase().as_str() {
        "1" | "GET_ROOMS" => Some(MenuCommand::GetRooms),
        "2" | "GET_USER_INFO" => Some(MenuCommand::GetUserInfo),
        "3" | "START" => Some(MenuCommand::Start),
        "4" | "HELP" | "INFO" => Some(MenuCommand::Help),
        "5" | "EXIT" => Some(MenuCommand::Exit),
        _ => None,
    }
}

pub fn parse_game_choice(line: &str) -> Option<GameChoice> {
    match line.trim() {
        "1" => Some(GameChoice::Move),
        "2" => Some(GameChoice::Place),
        "0" => Some(GameChoice::Exit),
        _ => None,
    }
}

pub fn parse_room(line: &str) -> Option<u32> {
    line.trim().parse::<u32>().ok().filter(|room| *room > 0)
}

/// Figures are offered as a numbered list; returns the chosen figure id
pub fn parse_figure_choice(line: &str, figures: &[u8]) -> Option<u8> {
    let index = line.trim().parse::<usize>().ok()?;
    figures.get(index.checked_sub(1)?).copied()
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

/// How a step of the command loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Runs the whole interactive session: nickname, room, lobby menu and the
/// game. Returns when the user exits, the input ends or the game is over.
pub async fn run<I>(client: &mut Client, input: I) -> Result<(), ClientError>
where
    I: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    if choose_nickname(client, &mut lines).await? == Flow::Exit {
        return Ok(());
    }
    if choose_room(client, &mut lines).await? == Flow::Exit {
        return Ok(());
    }
    println!("{}", MENU_TEXT);

    loop {
        if client.is_cancelled() {
            return Err(ClientError::ConnectionLost);
        }
        if client.state().read().await.game_started {
            return play_game(client, &mut lines).await;
        }

        // poll so a game started by another player is noticed
        let line = match timeout(Duration::from_secs(1), lines.next_line()).await {
            Err(_) => continue,
            Ok(line) => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            prompt("Press enter to refresh: ");
            continue;
        }

        match parse_menu(&line) {
            Some(MenuCommand::GetRooms) => client.get_rooms().await?,
            Some(MenuCommand::GetUserInfo) => client.get_user_info().await?,
            Some(MenuCommand::Start) => client.start_game().await?,
            Some(MenuCommand::Help) => println!("{}", MENU_TEXT),
            Some(MenuCommand::Exit) => return Ok(()),
            None => println!("Unknown option {:?}", line.trim()),
        }
    }
}

async fn choose_nickname<I>(client: &mut Client, lines: &mut Lines<I>) -> Result<Flow, ClientError>
where
    I: AsyncBufRead + Unpin,
{
    loop {
        prompt("Your nickname: ");
        let Some(line) = lines.next_line().await? else {
            return Ok(Flow::Exit);
        };
        let nickname = line.trim();
        if nickname.is_empty() {
            continue;
        }
        if nickname.contains(PAD_CHAR) {
            println!("Nickname must not contain {:?}", PAD_CHAR);
            continue;
        }

        let accepted = client.set_nickname(nickname).await?;
        println!("{}", client.current_text().unwrap_or_default());
        if accepted {
            return Ok(Flow::Continue);
        }
    }
}

async fn choose_room<I>(client: &mut Client, lines: &mut Lines<I>) -> Result<Flow, ClientError>
where
    I: AsyncBufRead + Unpin,
{
    loop {
        prompt("Create or select existing room\n> ");
        let Some(line) = lines.next_line().await? else {
            return Ok(Flow::Exit);
        };
        let Some(room) = parse_room(&line) else {
            println!("Room must be a positive number");
            continue;
        };

        let joined = client.join_room(room).await?;
        println!("Server answer: {}", client.current_text().unwrap_or_default());
        if joined {
            debug!("Joined room {}", room);
            return Ok(Flow::Continue);
        }
    }
}

async fn play_game<I>(client: &mut Client, lines: &mut Lines<I>) -> Result<(), ClientError>
where
    I: AsyncBufRead + Unpin,
{
    loop {
        let my_turn = match client.wait_for_turn().await {
            Ok(my_turn) => my_turn,
            Err(ClientError::ConnectionLost) => {
                if client.state().read().await.finished.is_some() {
                    info!("Game over, server closed the connection");
                    return Ok(());
                }
                return Err(ClientError::ConnectionLost);
            }
            Err(e) => return Err(e),
        };

        if my_turn && take_turn(client, lines).await? == Flow::Exit {
            return Ok(());
        }
    }
}

async fn take_turn<I>(client: &mut Client, lines: &mut Lines<I>) -> Result<Flow, ClientError>
where
    I: AsyncBufRead + Unpin,
{
    prompt("Your turn! Press enter to roll a dice");
    if lines.next_line().await?.is_none() {
        return Ok(Flow::Exit);
    }

    let roll = client.roll_dice().await?;
    println!("You rolled {}", roll.roll);
    if roll.skip {
        println!("No figure can move, skipping turn");
        return Ok(Flow::Continue);
    }

    loop {
        println!("{}", GAME_MENU_TEXT);
        prompt(">> ");
        let Some(line) = lines.next_line().await? else {
            return Ok(Flow::Exit);
        };

        match parse_game_choice(&line) {
            Some(GameChoice::Exit) => return Ok(Flow::Exit),
            Some(GameChoice::Place) if roll.can_put() => {
                client.place_figure().await?;
                return Ok(Flow::Continue);
            }
            Some(GameChoice::Move) if roll.can_move() => {
                if let Some(figure) = choose_figure(&roll, lines).await? {
                    client.move_figure(figure).await?;
                    return Ok(Flow::Continue);
                }
                return Ok(Flow::Exit);
            }
            Some(_) => println!("You cannot do that!"),
            None => println!("Input {:?} is invalid", line.trim()),
        }
    }
}

/// `None` means the user left
async fn choose_figure<I>(
    roll: &RollResult,
    lines: &mut Lines<I>,
) -> Result<Option<u8>, ClientError>
where
    I: AsyncBufRead + Unpin,
{
    loop {
        println!("Choose a figure (0 to exit):");
        for (i, figure) in roll.moves.iter().enumerate() {
            println!("  {} figure {}", i + 1, figure);
        }
        prompt(">> ");

        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        if line.trim() == "0" {
            return Ok(None);
        }
        match parse_figure_choice(&line, &roll.moves) {
            Some(figure) => return Ok(Some(figure)),
            None => println!("Input {:?} is invalid", line.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_menu() {
        assert_eq!(parse_menu("1"), Some(MenuCommand::GetRooms));
        assert_eq!(parse_menu(" get_rooms "), Some(MenuCommand::GetRooms));
        assert_eq!(parse_menu("GET_USER_INFO"), Some(MenuCommand::GetUserInfo));
        assert_eq!(parse_menu("3"), Some(MenuCommand::Start));
        assert_eq!(parse_menu("info"), Some(MenuCommand::Help));
        assert_eq!(parse_menu("5"), Some(MenuCommand::Exit));
        assert_eq!(parse_menu("6"), None);
        assert_eq!(parse_menu(""), None);
    }

    #[test]
    fn test_parse_game_choice() {
        assert_eq!(parse_game_choice("1"), Some(GameChoice::Move));
        assert_eq!(parse_game_choice("2 "), Some(GameChoice::Place));
        assert_eq!(parse_game_choice("0"), Some(GameChoice::Exit));
        assert_eq!(parse_game_choice("3"), None);
    }

    #[test]
    fn test_parse_room() {
        assert_eq!(parse_room("3"), Some(3));
        assert_eq!(parse_room(" 12\n"), Some(12));
        assert_eq!(parse_room("0"), None);
        assert_eq!(parse_room("-1"), None);
        assert_eq!(parse_room("abc"), None);
    }

    #[test]
    fn test_parse_figure_choice() {
        let figures = [2, 4];
        assert_eq!(parse_figure_choice("1", &figures), Some(2));
        assert_eq!(parse_figure_choice("2", &figures), Some(4));
        assert_eq!(parse_figure_choice("0", &figures), None);
        assert_eq!(parse_figure_choice("3", &figures), None);
        assert_eq!(parse_figure_choice("x", &figures), None);
    }
}
