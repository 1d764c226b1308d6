//! Connection to the game server and the request/response API
//!
//! Requests that expect an acknowledgement send a frame and then pop exactly
//! one message from the pipeline. They take `&mut self`, so only one such
//! request can be outstanding at a time.

use crate::error::ClientError;
use crate::game::{ClientState, RollResult, SharedState};
use crate::pipeline::Pipeline;
use log::{debug, info, warn};
use futures::SinkExt;
use shared::{message_writer, Message, MessageWriter, Tag, EMPTY_VALUE};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// How long `wait_for_turn` blocks before giving the caller a chance to
/// check for cancellation
pub const TURN_POLL_INTERVAL: Duration = Duration::from_secs(1);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct Client {
    writer: MessageWriter<BoxedWriter>,
    pipeline: Pipeline,
    state: SharedState,
    current: Option<Message>,
    reader_task: JoinHandle<()>,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        info!("Connecting to {}", addr);
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self::new(read_half, write_half, true))
    }

    /// Builds a client over any stream halves. `echo` prints server
    /// notifications to stdout.
    pub fn new<R, W>(reader: R, writer: W, echo: bool) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let state = ClientState::shared();
        let (pipeline, reader_task) = Pipeline::spawn(reader, Arc::clone(&state), echo);
        let writer: BoxedWriter = Box::new(writer);
        Self {
            writer: message_writer(writer),
            pipeline,
            state,
            current: None,
            reader_task,
        }
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// The last acknowledgement received
    pub fn current(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    /// Text of the last acknowledgement, whether OK or FAIL
    pub fn current_text(&self) -> Option<&str> {
        let msg = self.current.as_ref()?;
        msg.get(Tag::Ok).or_else(|| msg.get(Tag::Fail))
    }

    pub fn is_cancelled(&self) -> bool {
        self.pipeline.is_cancelled()
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        self.writer
            .send(message)
            .await
            .map_err(ClientError::from_codec)
    }

    /// Pops the reply to the last request: OK is `true`, FAIL is `false`.
    /// Anything else in its place is a protocol violation.
    pub async fn wait_for_ack(&mut self) -> Result<bool, ClientError> {
        let message = self.pipeline.pop().await.ok_or(ClientError::ConnectionLost)?;

        let ok = if message.contains(Tag::Ok) {
            true
        } else if message.contains(Tag::Fail) {
            false
        } else {
            return Err(ClientError::ProtocolViolation(format!(
                "expected OK or FAIL, got {:?}",
                message.tags()
            )));
        };
        debug!("Acknowledgement: {}", if ok { "OK" } else { "FAIL" });
        self.current = Some(message);
        Ok(ok)
    }

    /// Sends `message` and waits for its acknowledgement
    pub async fn request(&mut self, message: &Message) -> Result<bool, ClientError> {
        self.send(message).await?;
        self.wait_for_ack().await
    }

    pub async fn set_nickname(&mut self, nickname: &str) -> Result<bool, ClientError> {
        let accepted = self
            .request(&Message::single(Tag::Nickname, nickname))
            .await?;
        if accepted {
            self.state.write().await.nickname = nickname.to_string();
            info!("My nickname is {}", nickname);
        }
        Ok(accepted)
    }

    pub async fn join_room(&mut self, room: u32) -> Result<bool, ClientError> {
        self.request(&Message::single(Tag::Room, room.to_string()))
            .await
    }

    /// The reply arrives as INFO and is handled by the reader task
    pub async fn get_rooms(&mut self) -> Result<(), ClientError> {
        self.send(&Message::single(Tag::GetRooms, EMPTY_VALUE)).await
    }

    pub async fn get_user_info(&mut self) -> Result<(), ClientError> {
        self.send(&Message::single(Tag::GetUserInfo, EMPTY_VALUE))
            .await
    }

    /// Success shows up as a STARTED notification, failure as INFO
    pub async fn start_game(&mut self) -> Result<(), ClientError> {
        self.send(&Message::single(Tag::Start, EMPTY_VALUE)).await
    }

    /// Asks the server to roll and returns the roll with the offered options
    pub async fn roll_dice(&mut self) -> Result<RollResult, ClientError> {
        let nickname = self.state.read().await.nickname.clone();
        if !self.request(&Message::single(Tag::RollDice, nickname)).await? {
            let reason = self.current_text().unwrap_or_default().to_string();
            return Err(ClientError::ProtocolViolation(format!(
                "roll request refused: {}",
                reason
            )));
        }

        let ack = self.current.as_ref().ok_or(ClientError::ConnectionLost)?;
        let result = RollResult::from_ack(ack)?;
        self.state.write().await.last_roll = Some(result.roll);
        Ok(result)
    }

    pub async fn place_figure(&mut self) -> Result<(), ClientError> {
        self.send(&Message::single(Tag::PlaceFigure, "0")).await
    }

    pub async fn move_figure(&mut self, figure: u8) -> Result<(), ClientError> {
        self.send(&Message::single(Tag::MoveFigure, figure.to_string()))
            .await
    }

    /// Waits up to [`TURN_POLL_INTERVAL`] for a NEWTURN notification.
    /// Returns `true` only when it names this client.
    pub async fn wait_for_turn(&mut self) -> Result<bool, ClientError> {
        let message = match self.pipeline.pop_timeout(TURN_POLL_INTERVAL).await {
            Err(_) => return Ok(false),
            Ok(None) => return Err(ClientError::ConnectionLost),
            Ok(Some(message)) => message,
        };

        match message.get(Tag::NewTurn) {
            Some(player) => {
                if self.state.read().await.is_my_turn(player) {
                    Ok(true)
                } else {
                    println!("Player {} turn", player);
                    Ok(false)
                }
            }
            None => {
                warn!("Unexpected {:?} while waiting for a turn", message.tags());
                Ok(false)
            }
        }
    }

    /// Closes the socket and stops the reader task
    pub async fn close(mut self) {
        if let Err(e) = SinkExt::<&Message>::close(&mut self.writer).await {
            debug!("Error while closing connection: {}", e);
        }
        self.reader_task.abort();
    }
}
