//! Reader task and the bounded queue feeding the foreground
//!
//! The reader task is the only place that reads the socket. Replies the
//! foreground is waiting for (OK/FAIL acknowledgements and NEWTURN) go onto a
//! 50 slot queue; everything else is applied to the shared `ClientState`
//! right away. When the queue is full the reader waits, which stops it from
//! reading the socket.

use crate::game::SharedState;
use log::{debug, error, info};
use shared::{message_reader, read_message, Message, MessageReader, Tag, PIPELINE_CAPACITY};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tokio::time::timeout;

/// True for messages a foreground call site is waiting for
pub fn is_correlated(message: &Message) -> bool {
    message.is_ack() || message.contains(Tag::NewTurn)
}

/// Foreground end of the pipeline
pub struct Pipeline {
    rx: mpsc::Receiver<Message>,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    /// Spawns the reader task over `reader`. With `echo` set, text meant for
    /// the user is printed to stdout as it arrives.
    pub fn spawn<R>(reader: R, state: SharedState, echo: bool) -> (Self, JoinHandle<()>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(PIPELINE_CAPACITY);
        let cancelled = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(read_loop(
            message_reader(reader),
            tx,
            state,
            Arc::clone(&cancelled),
            echo,
        ));

        (Self { rx, cancelled }, handle)
    }

    /// Next correlated message, `None` once the reader has stopped and the
    /// queue is drained
    pub async fn pop(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Like `pop` but gives up after `limit`; `Ok(None)` means the reader stopped
    pub async fn pop_timeout(&mut self, limit: Duration) -> Result<Option<Message>, Elapsed> {
        timeout(limit, self.rx.recv()).await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: MessageReader<R>,
    tx: mpsc::Sender<Message>,
    state: SharedState,
    cancelled: Arc<AtomicBool>,
    echo: bool,
) {
    loop {
        match read_message(&mut reader).await {
            Ok(message) if is_correlated(&message) => {
                debug!("Queueing {:?}", message.tags());
                if tx.send(message).await.is_err() {
                    debug!("Foreground is gone, stopping reader");
                    break;
                }
            }
            Ok(message) => {
                let lines = state.write().await.apply(&message);
                if echo {
                    for line in lines {
                        println!("\n{}", line);
                    }
                }
            }
            Err(e) => {
                if e.is_closed() {
                    info!("Server closed the connection");
                } else {
                    error!("Error while reading from server: {}", e);
                }
                cancelled.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
    // dropping `tx` wakes a foreground blocked in `pop`
}
